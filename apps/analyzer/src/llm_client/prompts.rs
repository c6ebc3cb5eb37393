// Cross-cutting prompt fragments. Task-specific prompts live next to the code that
// sends them (see extraction/prompts.rs).

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You extract structured data from documents. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction against inventing values the source does not contain.
pub const NO_GUESSING_INSTRUCTION: &str = "\
    Only report values that appear in the text. \
    If a value is not present, use null for single values and [] for lists. \
    Never invent names, contact details, employers, or degrees.";
