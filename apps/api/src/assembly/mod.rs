//! Team assembly: optional rewrite → retrieval → recommendation.

pub mod composer;
pub mod handlers;
pub mod prompts;
pub mod rewriter;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assembly::composer::{Composition, RecommendationComposer};
use crate::assembly::rewriter::QueryRewriter;
use crate::errors::AppError;
use crate::models::chunk::SourceRef;
use crate::retrieval::{RetrievalMode, Retriever};
use crate::state::AppState;

/// Upper bound on a caller-supplied retrieval limit.
pub const MAX_RETRIEVAL_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct TeamRequest {
    pub project_requirements: String,
    #[serde(default)]
    pub rewrite: bool,
    pub mode: Option<RetrievalMode>,
    pub limit: Option<usize>,
    pub file_filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStatus {
    Ok,
    NoCandidatesFound,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub project_requirements: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,
    pub team_recommendation: Option<String>,
    pub sources: Vec<SourceRef>,
    pub status: AssemblyStatus,
    pub retrieval_mode: RetrievalMode,
}

pub struct TeamAssembler {
    retriever: Retriever,
    rewriter: QueryRewriter,
    composer: RecommendationComposer,
    default_limit: usize,
    default_mode: RetrievalMode,
}

impl TeamAssembler {
    pub fn from_state(state: &AppState) -> Self {
        let timeout = state.config.external_timeout();
        Self {
            retriever: state.retriever(),
            rewriter: QueryRewriter::new(state.llm.clone(), timeout),
            composer: RecommendationComposer::new(state.llm.clone(), timeout),
            default_limit: state.config.retrieval_limit,
            default_mode: state.config.retrieval_mode,
        }
    }

    pub async fn assemble(&self, req: &TeamRequest) -> Result<TeamResponse, AppError> {
        let requirements = req.project_requirements.trim();
        if requirements.is_empty() {
            return Err(AppError::Validation(
                "project_requirements is required".to_string(),
            ));
        }
        let limit = resolve_limit(req.limit, self.default_limit)?;
        let mode = req.mode.unwrap_or(self.default_mode);

        let (search_query, rewritten_query) = if req.rewrite {
            let rewrite = self.rewriter.rewrite(requirements).await;
            let reported = rewrite.rewritten.then(|| rewrite.query.clone());
            (rewrite.query, reported)
        } else {
            (requirements.to_string(), None)
        };

        let retrieved = self
            .retriever
            .retrieve(&search_query, limit, mode, req.file_filter.as_deref())
            .await?;

        let response = match self.composer.compose(requirements, &retrieved).await? {
            Composition::NoCandidates => {
                info!("No candidates found for '{search_query}' ({mode})");
                TeamResponse {
                    project_requirements: requirements.to_string(),
                    rewritten_query,
                    team_recommendation: None,
                    sources: Vec::new(),
                    status: AssemblyStatus::NoCandidatesFound,
                    retrieval_mode: mode,
                }
            }
            Composition::Recommended(rec) => TeamResponse {
                project_requirements: requirements.to_string(),
                rewritten_query,
                team_recommendation: Some(rec.recommendation_text),
                sources: rec.sources,
                status: AssemblyStatus::Ok,
                retrieval_mode: mode,
            },
        };
        Ok(response)
    }
}

/// Caller limit, or the configured default, bounded to `1..=MAX_RETRIEVAL_LIMIT`.
pub fn resolve_limit(requested: Option<usize>, default_limit: usize) -> Result<usize, AppError> {
    match requested {
        None => Ok(default_limit),
        Some(limit) if (1..=MAX_RETRIEVAL_LIMIT).contains(&limit) => Ok(limit),
        Some(limit) => Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_RETRIEVAL_LIMIT}, got {limit}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::models::chunk::{ChunkMetadata, NewChunk, RESUME_SOURCE_TAG};
    use crate::store::ChunkStore;
    use crate::test_support::{test_state, ScriptedModel};

    async fn seed(state: &AppState, file: &str, text: &str, talent_id: Option<i64>) {
        let embedding = state.embedder.embed(text).await.unwrap();
        state
            .store
            .insert_document(vec![NewChunk {
                text: text.to_string(),
                metadata: ChunkMetadata {
                    file_name: file.to_string(),
                    page_number: Some(1),
                    chunk_number: 1,
                    talent_id,
                    total_pages: 1,
                    source_tag: RESUME_SOURCE_TAG.to_string(),
                },
                embedding,
            }])
            .await
            .unwrap();
    }

    fn request(requirements: &str, rewrite: bool) -> TeamRequest {
        TeamRequest {
            project_requirements: requirements.to_string(),
            rewrite,
            mode: None,
            limit: None,
            file_filter: None,
        }
    }

    #[test]
    fn test_resolve_limit() {
        assert_eq!(resolve_limit(None, 5).unwrap(), 5);
        assert_eq!(resolve_limit(Some(3), 5).unwrap(), 3);
        assert!(resolve_limit(Some(0), 5).is_err());
        assert!(resolve_limit(Some(MAX_RETRIEVAL_LIMIT + 1), 5).is_err());
    }

    #[tokio::test]
    async fn test_empty_store_reports_no_candidates_without_generation() {
        let state = test_state(ScriptedModel::replying("never"));
        let assembler = TeamAssembler::from_state(&state);

        let response = assembler
            .assemble(&request("Python backend engineer", false))
            .await
            .unwrap();
        assert_eq!(response.status, AssemblyStatus::NoCandidatesFound);
        assert!(response.team_recommendation.is_none());
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn test_assembles_with_sources() {
        let state = test_state(ScriptedModel::replying("1. Alice Smith - Backend"));
        seed(&state, "alice.pdf", "5 years of Python and FastAPI experience", Some(1)).await;
        seed(&state, "design.pdf", "graphic design portfolio", None).await;

        let assembler = TeamAssembler::from_state(&state);
        let response = assembler
            .assemble(&request("Python backend engineer", false))
            .await
            .unwrap();

        assert_eq!(response.status, AssemblyStatus::Ok);
        assert_eq!(
            response.team_recommendation.as_deref(),
            Some("1. Alice Smith - Backend")
        );
        assert_eq!(response.sources[0].file_name, "alice.pdf");
        assert_eq!(response.sources[0].talent_id, Some(1));
        assert_eq!(response.retrieval_mode, RetrievalMode::Vector);
        assert!(response.rewritten_query.is_none());
    }

    #[tokio::test]
    async fn test_rewrite_drives_retrieval_but_not_prompt() {
        let model = ScriptedModel::new(|prompt, _| {
            if prompt.contains("Rewrite the following query") {
                Ok("Python FastAPI ** alternative".to_string())
            } else {
                assert!(prompt.contains("Project Requirements:\nWe need an API person"));
                Ok("team".to_string())
            }
        });
        let state = test_state(model);
        seed(&state, "alice.pdf", "5 years of Python and FastAPI experience", None).await;

        let mut req = request("We need an API person", true);
        req.mode = Some(RetrievalMode::Lexical);
        let response = TeamAssembler::from_state(&state)
            .assemble(&req)
            .await
            .unwrap();

        assert_eq!(response.rewritten_query.as_deref(), Some("Python FastAPI"));
        assert_eq!(response.status, AssemblyStatus::Ok);
        assert_eq!(response.retrieval_mode, RetrievalMode::Lexical);
    }

    #[tokio::test]
    async fn test_generation_failure_fails_request() {
        let state = test_state(ScriptedModel::failing());
        seed(&state, "alice.pdf", "Python", None).await;

        let err = TeamAssembler::from_state(&state)
            .assemble(&request("Python", false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
    }

    #[tokio::test]
    async fn test_blank_requirements_rejected() {
        let state = test_state(ScriptedModel::replying("team"));
        let err = TeamAssembler::from_state(&state)
            .assemble(&request("   ", false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
