// Shared prompt fragments.
// Each stage that needs LLM calls defines its own prompts.rs alongside it.

/// Appended to prompts whose answer is parsed as a single plain-text value.
pub const PLAIN_TEXT_ONLY: &str = "Respond with the answer only. \
    Do NOT add explanations, labels, quotes or markdown.";

/// Instruction that keeps recommendations tied to the supplied resume excerpts.
pub const GROUNDING_INSTRUCTION: &str = "\
    Use ONLY the candidate excerpts provided below. Do NOT invent candidates, skills, \
    years of experience or certifications. If the excerpts do not contain enough \
    information to fill a role, say so explicitly instead of guessing.";
