// Identity resolution prompt templates.

/// Sentinel the model returns when no name can be found.
pub const UNKNOWN_NAME: &str = "unknown";

pub const NAME_EXTRACTION_SYSTEM: &str = "\
You extract candidate names from resumes. \
You answer with a person's full name and nothing else.";

/// Replace `{resume_text}` before sending.
pub const NAME_EXTRACTION_PROMPT: &str = r#"Extract the full name of the person this resume belongs to.

Return ONLY the full name in the format "First Name Last Name".
If the name cannot be determined, return exactly: unknown

RESUME TEXT:
{resume_text}"#;
