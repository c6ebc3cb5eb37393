use crate::extraction::prompts::{RESUME_EXTRACTION_PROMPT, RESUME_EXTRACTION_SYSTEM};
use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, NO_GUESSING_INSTRUCTION};
use crate::llm_client::PromptSpec;

const TEMPERATURE: f32 = 0.1;
const MAX_TOKENS: u32 = 1024;
/// Resume text beyond this many characters is cut before prompting.
pub const MAX_RESUME_CHARS: usize = 24_000;

/// Builds the extraction prompt for a resume. Pure: the same text always
/// yields the same prompt.
pub fn build_prompt(resume_text: &str) -> PromptSpec {
    let text = normalize_text(resume_text);

    // Template placeholders are filled before the resume text goes in, so text
    // that happens to contain a placeholder is left alone.
    let user = RESUME_EXTRACTION_PROMPT
        .replace("{no_guessing}", NO_GUESSING_INSTRUCTION)
        .replace("{resume_text}", &text);

    PromptSpec {
        system: format!("{RESUME_EXTRACTION_SYSTEM} {JSON_ONLY_SYSTEM}"),
        user,
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
    }
}

fn normalize_text(resume_text: &str) -> String {
    let text = resume_text.replace("\r\n", "\n");
    let text = text.trim();
    match text.char_indices().nth(MAX_RESUME_CHARS) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
