// Resume extraction prompt templates.

pub const RESUME_EXTRACTION_SYSTEM: &str = "\
You are a precise resume data extractor. \
Read the resume and report the candidate's details as structured JSON.";

pub const RESUME_EXTRACTION_PROMPT: &str = r#"Extract structured information from this resume.

RESUME:
{resume_text}

OUTPUT SCHEMA (return exactly this structure):
{
  "name": "string | null",
  "email": "string | null",
  "phone": "string | null",
  "skills": ["string"],
  "experience": [
    {"company": "string", "role": "string | null", "period": "string | null"}
  ],
  "education": [
    {"degree": "string", "institution": "string | null", "period": "string | null"}
  ]
}

RULES:
1. List skills, experience, and education in the order they appear in the resume.
2. {no_guessing}
3. Return ONLY the JSON object: no prose, no code fences."#;
