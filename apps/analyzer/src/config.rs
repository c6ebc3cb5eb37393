use thiserror::Error;
use tracing::warn;

const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Required environment variable '{0}' is not set")]
    Missing(&'static str),

    #[error("Environment variable '{key}' is malformed: {reason}")]
    Malformed { key: &'static str, reason: String },
}

/// Object storage settings for stored resume files (MinIO locally, S3 in production).
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Application configuration loaded from environment variables.
/// Startup aborts if the provider credential or the store connection string is unusable.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub groq_api_key: String,
    pub llm_base_url: String,
    pub s3: Option<S3Settings>,
    pub run_migrations: bool,
    pub audit_failed_analyses: bool,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so parsing can be tested
    /// without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let groq_api_key = require("GROQ_API_KEY")?;
        validate_api_key(&groq_api_key)?;

        let database_url = require("DATABASE_URL")?;
        if !(database_url.starts_with("postgres://") || database_url.starts_with("postgresql://"))
        {
            return Err(ConfigError::Malformed {
                key: "DATABASE_URL",
                reason: "expected a postgres:// or postgresql:// connection string".to_string(),
            });
        }

        let s3 = match lookup("S3_BUCKET").filter(|v| !v.trim().is_empty()) {
            Some(bucket) => Some(S3Settings {
                bucket,
                endpoint: require("S3_ENDPOINT")?,
                access_key_id: require("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
            }),
            None => None,
        };

        Ok(Config {
            database_url,
            groq_api_key,
            llm_base_url: lookup("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            s3,
            run_migrations: parse_flag(&lookup, "RUN_MIGRATIONS", true)?,
            audit_failed_analyses: parse_flag(&lookup, "AUDIT_FAILED_ANALYSES", false)?,
            port: match lookup("PORT") {
                Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Malformed {
                    key: "PORT",
                    reason: format!("'{raw}' is not a valid port number"),
                })?,
                None => 8080,
            },
        })
    }
}

fn validate_api_key(key: &str) -> Result<(), ConfigError> {
    if key.chars().any(char::is_whitespace) {
        return Err(ConfigError::Malformed {
            key: "GROQ_API_KEY",
            reason: "credential contains whitespace".to_string(),
        });
    }
    if !key.starts_with("gsk_") {
        warn!(
            "GROQ_API_KEY ({}) does not carry the gsk_ prefix; continuing",
            mask_secret(key)
        );
    }
    Ok(())
}

fn parse_flag<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("no") => Ok(false),
        Some(other) => Err(ConfigError::Malformed {
            key,
            reason: format!("'{other}' is not a boolean"),
        }),
    }
}

/// Masks a credential for logs: `gsk_12…abcd`.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 10 {
        return "…".to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
