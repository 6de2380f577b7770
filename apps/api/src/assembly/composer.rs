use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::assembly::prompts::{team_assembly_prompt, TEAM_ASSEMBLY_SYSTEM};
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::{LanguageModel, LlmError};
use crate::models::chunk::{ScoredChunk, SourceRef};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("language model failed: {0}")]
    Llm(#[from] LlmError),

    #[error("language model timed out after {0:?}")]
    Timeout(Duration),
}

impl From<GenerationError> for crate::errors::AppError {
    fn from(e: GenerationError) -> Self {
        crate::errors::AppError::Generation(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub recommendation_text: String,
    /// One entry per retrieved chunk, in retrieval order.
    pub sources: Vec<SourceRef>,
}

/// Result of composing over a retrieval result.
#[derive(Debug, Clone, PartialEq)]
pub enum Composition {
    /// Nothing was retrieved, so generation was not attempted.
    NoCandidates,
    Recommended(Recommendation),
}

pub struct RecommendationComposer {
    llm: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl RecommendationComposer {
    pub fn new(llm: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// One model call per request. `query` is what the user asked for, not
    /// the rewritten retrieval query.
    pub async fn compose(
        &self,
        query: &str,
        retrieved: &[ScoredChunk],
    ) -> Result<Composition, GenerationError> {
        if retrieved.is_empty() {
            return Ok(Composition::NoCandidates);
        }

        let prompt = build_prompt(query, retrieved);
        let system = format!("{TEAM_ASSEMBLY_SYSTEM}\n\n{GROUNDING_INSTRUCTION}");
        let recommendation_text =
            tokio::time::timeout(self.timeout, self.llm.complete(&prompt, &system))
                .await
                .map_err(|_| GenerationError::Timeout(self.timeout))??;

        Ok(Composition::Recommended(Recommendation {
            recommendation_text,
            sources: retrieved.iter().map(|hit| SourceRef::from(&hit.chunk)).collect(),
        }))
    }
}

/// Context block: every chunk prefixed by the file it came from.
pub fn build_context(retrieved: &[ScoredChunk]) -> String {
    retrieved
        .iter()
        .map(|hit| {
            format!(
                "Candidate from {}:\n{}\n",
                hit.chunk.metadata.file_name, hit.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_prompt(query: &str, retrieved: &[ScoredChunk]) -> String {
    team_assembly_prompt(query, &build_context(retrieved))
}
