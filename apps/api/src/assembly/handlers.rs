//! Axum route handlers for team assembly and raw search.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::assembly::{resolve_limit, TeamAssembler, TeamRequest, TeamResponse};
use crate::errors::AppError;
use crate::retrieval::RetrievalMode;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub mode: Option<RetrievalMode>,
    pub limit: Option<usize>,
    pub file_filter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub file_name: String,
    pub page_number: Option<i32>,
    pub chunk_number: i32,
    pub talent_id: Option<i64>,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: RetrievalMode,
    pub results: Vec<SearchHit>,
}

/// POST /api/v1/team/assemble
pub async fn handle_assemble_team(
    State(state): State<AppState>,
    Json(req): Json<TeamRequest>,
) -> Result<Json<TeamResponse>, AppError> {
    let response = TeamAssembler::from_state(&state).assemble(&req).await?;
    Ok(Json(response))
}

/// GET /api/v1/search
pub async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(AppError::Validation("q is required".to_string()));
    }
    let limit = resolve_limit(params.limit, state.config.retrieval_limit)?;
    let mode = params.mode.unwrap_or(state.config.retrieval_mode);

    let results = state
        .retriever()
        .retrieve(query, limit, mode, params.file_filter.as_deref())
        .await?
        .into_iter()
        .map(|hit| SearchHit {
            file_name: hit.chunk.metadata.file_name,
            page_number: hit.chunk.metadata.page_number,
            chunk_number: hit.chunk.metadata.chunk_number,
            talent_id: hit.chunk.metadata.talent_id,
            text: hit.chunk.text,
            score: hit.score,
        })
        .collect();

    Ok(Json(SearchResponse {
        query: query.to_string(),
        mode,
        results,
    }))
}
