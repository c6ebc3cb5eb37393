// Resume extraction: deterministic prompt construction and tolerant reply validation.
// Neither step performs I/O; the provider call itself goes through llm_client.

pub mod profile;
pub mod prompts;
pub mod request;
pub mod validate;

pub use profile::{Field, ResumeProfile};
pub use request::build_prompt;
pub use validate::{parse_reply, ParsedResult};
