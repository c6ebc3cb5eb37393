//! Reply validation: turns a free-form model reply into a `ParsedResult`.
//!
//! Never fails: an unusable reply becomes a `needs_review` result carrying the raw
//! text, so a human (or a later re-analysis) can still consult it.

use serde_json::{json, Map, Value};

use crate::extraction::profile::{EducationEntry, ExperienceEntry, Field, ResumeProfile};
use crate::models::resume::AnalysisStatus;

/// Values models use to say "not present".
const PLACEHOLDERS: &[&str] = &[
    "unknown",
    "not found",
    "not provided",
    "not available",
    "not specified",
    "n/a",
    "na",
    "none",
    "null",
    "-",
];

#[derive(Debug, Clone)]
pub struct ParsedResult {
    pub status: AnalysisStatus,
    /// `None` when no JSON object could be recovered from the reply.
    pub profile: Option<ResumeProfile>,
    pub raw_response: String,
    pub caveats: Vec<String>,
}

impl ParsedResult {
    /// The value stored in `resume_analysis_history.extracted`.
    pub fn extracted_json(&self) -> Value {
        self.profile
            .as_ref()
            .and_then(|p| serde_json::to_value(p).ok())
            .unwrap_or_else(|| json!({}))
    }
}

pub fn parse_reply(raw: &str) -> ParsedResult {
    let Some((slice, object)) = locate_json_object(raw) else {
        return ParsedResult {
            status: AnalysisStatus::NeedsReview,
            profile: None,
            raw_response: raw.to_string(),
            caveats: vec!["reply contained no parseable JSON object".to_string()],
        };
    };

    let mut caveats = Vec::new();
    if slice.len() != raw.trim().len() {
        caveats.push("JSON was wrapped in surrounding text".to_string());
    }

    let profile = profile_from_object(&object, &mut caveats);
    for field in profile.missing_fields() {
        caveats.push(format!("missing field: {field}"));
    }

    let status = if profile.has_required_fields() {
        AnalysisStatus::Completed
    } else {
        AnalysisStatus::NeedsReview
    };

    ParsedResult {
        status,
        profile: Some(profile),
        raw_response: raw.to_string(),
        caveats,
    }
}

/// Finds the first balanced `{...}` span that parses as a JSON object. Candidates
/// are tried left to right; each candidate is the outermost object starting there.
pub fn locate_json_object(text: &str) -> Option<(&str, Map<String, Value>)> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(len) = balanced_len(&text[start..]) {
            let candidate = &text[start..start + len];
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
                return Some((candidate, map));
            }
        }
        search_from = start + 1;
    }
    None
}

/// Byte length of the brace-balanced prefix of `text` (which starts with `{`),
/// ignoring braces inside string literals.
fn balanced_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn profile_from_object(object: &Map<String, Value>, caveats: &mut Vec<String>) -> ResumeProfile {
    let email = scalar(object, &["email", "email_address"]).and_then(|email| {
        if email.contains('@') {
            Some(email)
        } else {
            caveats.push(format!("email '{email}' is not an address"));
            None
        }
    });

    ResumeProfile {
        name: scalar(object, &["name", "full_name"]).into(),
        email: email.into(),
        phone: scalar(object, &["phone", "phone_number"]).into(),
        skills: field(object, "skills", string_list),
        experience: field(object, "experience", |v| entries(v, experience_entry)),
        education: field(object, "education", |v| entries(v, education_entry)),
    }
}

fn field<T>(object: &Map<String, Value>, key: &str, convert: impl Fn(&Value) -> Option<T>) -> Field<T> {
    object.get(key).and_then(convert).into()
}

fn scalar(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| object.get(*key).and_then(clean_scalar))
}

fn clean_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_text(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn clean_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed.to_lowercase().as_str()) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Skills arrive as an array, a comma-separated string, or grouped by category.
fn string_list(value: &Value) -> Option<Vec<String>> {
    let mut items: Vec<String> = Vec::new();
    match value {
        Value::Array(values) => {
            for v in values {
                if let Some(s) = clean_scalar(v) {
                    items.push(s);
                }
            }
        }
        Value::String(s) => items.extend(s.split(',').filter_map(clean_text)),
        Value::Object(groups) => {
            for group in groups.values() {
                items.extend(string_list(group).unwrap_or_default());
            }
        }
        _ => return None,
    }

    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.to_lowercase()));
    Some(items)
}

fn entries<T>(value: &Value, convert: fn(&Value) -> Option<T>) -> Option<Vec<T>> {
    match value {
        Value::Array(values) => Some(values.iter().filter_map(convert).collect()),
        _ => None,
    }
}

fn experience_entry(value: &Value) -> Option<ExperienceEntry> {
    match value {
        Value::String(s) => clean_text(s).map(|company| ExperienceEntry {
            company: Some(company),
            role: None,
            period: None,
        }),
        Value::Object(obj) => {
            let entry = ExperienceEntry {
                company: scalar(obj, &["company", "employer", "organization"]),
                role: scalar(obj, &["role", "title", "position"]),
                period: period(obj),
            };
            (entry.company.is_some() || entry.role.is_some()).then_some(entry)
        }
        _ => None,
    }
}

fn education_entry(value: &Value) -> Option<EducationEntry> {
    match value {
        Value::String(s) => clean_text(s).map(|degree| EducationEntry {
            degree: Some(degree),
            institution: None,
            period: None,
        }),
        Value::Object(obj) => {
            let entry = EducationEntry {
                degree: scalar(obj, &["degree", "qualification"]),
                institution: scalar(obj, &["institution", "school", "university"]),
                period: period(obj),
            };
            (entry.degree.is_some() || entry.institution.is_some()).then_some(entry)
        }
        _ => None,
    }
}

fn period(obj: &Map<String, Value>) -> Option<String> {
    if let Some(p) = scalar(obj, &["period", "dates", "years", "duration"]) {
        return Some(p);
    }
    match (
        scalar(obj, &["start", "start_date"]),
        scalar(obj, &["end", "end_date"]),
    ) {
        (Some(start), Some(end)) => Some(format!("{start} - {end}")),
        (Some(start), None) => Some(format!("{start} - present")),
        (None, Some(end)) => Some(end),
        (None, None) => None,
    }
}
