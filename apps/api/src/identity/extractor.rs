use std::sync::Arc;

use async_trait::async_trait;

use crate::identity::prompts::{NAME_EXTRACTION_PROMPT, NAME_EXTRACTION_SYSTEM, UNKNOWN_NAME};
use crate::identity::IdentityError;
use crate::llm_client::prompts::PLAIN_TEXT_ONLY;
use crate::llm_client::LanguageModel;

/// Only the head of a resume is sent to the model; names sit at the top.
const NAME_CONTEXT_CHARS: usize = 4000;

/// Pulls a person's name out of resume-like text.
///
/// Implementations return the raw name as written, or `"unknown"` when no
/// name can be determined. Canonicalisation happens in the resolver.
#[async_trait]
pub trait NameExtractor: Send + Sync {
    async fn extract_name(&self, document_text: &str) -> Result<String, IdentityError>;
}

/// `NameExtractor` backed by the language model.
pub struct LlmNameExtractor {
    llm: Arc<dyn LanguageModel>,
}

impl LlmNameExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl NameExtractor for LlmNameExtractor {
    async fn extract_name(&self, document_text: &str) -> Result<String, IdentityError> {
        let head: String = document_text.chars().take(NAME_CONTEXT_CHARS).collect();
        if head.trim().is_empty() {
            return Ok(UNKNOWN_NAME.to_string());
        }

        let prompt = format!(
            "{}\n\n{PLAIN_TEXT_ONLY}",
            NAME_EXTRACTION_PROMPT.replace("{resume_text}", &head)
        );
        let answer = self.llm.complete(&prompt, NAME_EXTRACTION_SYSTEM).await?;

        // Models occasionally answer on several lines; the name is the first.
        Ok(answer
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or(UNKNOWN_NAME)
            .to_string())
    }
}
