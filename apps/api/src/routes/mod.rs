pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::assembly::handlers as assembly;
use crate::ingestion::handlers as ingestion;
use crate::state::AppState;

/// Uploaded resumes may exceed axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Ingestion
        .route("/api/v1/ingest/local", post(ingestion::handle_ingest_local))
        .route("/api/v1/ingest/remote", post(ingestion::handle_ingest_remote))
        .route(
            "/api/v1/ingest/upload",
            post(ingestion::handle_ingest_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/v1/ingest/jobs", post(ingestion::handle_start_job))
        .route(
            "/api/v1/ingest/jobs/:id",
            get(ingestion::handle_get_job).delete(ingestion::handle_cancel_job),
        )
        // Resume store
        .route("/api/v1/resumes", delete(ingestion::handle_reset_store))
        .route("/api/v1/resumes/status", get(ingestion::handle_store_status))
        .route(
            "/api/v1/resumes/:file_name/chunks",
            get(ingestion::handle_file_chunks),
        )
        // Team assembly
        .route("/api/v1/team/assemble", post(assembly::handle_assemble_team))
        .route("/api/v1/search", get(assembly::handle_search))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::embedding::Embedder;
    use crate::models::chunk::{ChunkMetadata, NewChunk, RESUME_SOURCE_TAG};
    use crate::store::ChunkStore;
    use crate::test_support::{build_pdf, test_config, test_state, test_state_with, ScriptedModel};
    use std::path::Path;
    use std::sync::Arc;

    /// State whose resume folder is `root`.
    fn rooted_state(root: &Path, llm: ScriptedModel) -> AppState {
        let mut config = test_config();
        config.resume_folder = root.to_string_lossy().into_owned();
        test_state_with(config, Arc::new(llm))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn seed(state: &AppState, file: &str, chunk_number: i32, text: &str) {
        let embedding = state.embedder.embed(text).await.unwrap();
        state
            .store
            .insert_document(vec![NewChunk {
                text: text.to_string(),
                metadata: ChunkMetadata {
                    file_name: file.to_string(),
                    page_number: Some(1),
                    chunk_number,
                    talent_id: None,
                    total_pages: 1,
                    source_tag: RESUME_SOURCE_TAG.to_string(),
                },
                embedding,
            }])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state(ScriptedModel::replying("x")));
        let (status, body) = send(app, empty_request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "talent-rag");
    }

    #[tokio::test]
    async fn test_status_counts_chunks_and_files() {
        let state = test_state(ScriptedModel::replying("x"));
        seed(&state, "a.pdf", 1, "rust").await;
        seed(&state, "a.pdf", 2, "go").await;
        seed(&state, "b.pdf", 1, "java").await;

        let (status, body) = send(
            build_router(state),
            empty_request("GET", "/api/v1/resumes/status"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_documents"], 3);
        assert_eq!(body["unique_resumes"], 2);
        assert_eq!(body["unique_source_files"], 2);
        assert_eq!(body["status"], "active");
    }

    #[tokio::test]
    async fn test_file_chunks_listed_in_order() {
        let state = test_state(ScriptedModel::replying("x"));
        seed(&state, "a.pdf", 2, "second").await;
        seed(&state, "a.pdf", 1, "first").await;
        let app = build_router(state);

        let (status, body) = send(
            app.clone(),
            empty_request("GET", "/api/v1/resumes/a.pdf/chunks"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chunks"][0]["text"], "first");
        assert_eq!(body["chunks"][1]["metadata"]["chunk_number"], 2);

        let (status, _) = send(app, empty_request("GET", "/api/v1/resumes/zzz.pdf/chunks")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_then_status_is_empty() {
        let state = test_state(ScriptedModel::replying("x"));
        seed(&state, "a.pdf", 1, "rust").await;
        seed(&state, "b.pdf", 1, "go").await;
        let app = build_router(state);

        let (status, body) = send(app.clone(), empty_request("DELETE", "/api/v1/resumes")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["documents_deleted"], 2);

        let (_, body) = send(app, empty_request("GET", "/api/v1/resumes/status")).await;
        assert_eq!(body["total_documents"], 0);
    }

    #[tokio::test]
    async fn test_ingest_local_reports_partial_failure_as_ok() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("alice.pdf"),
            build_pdf(&["Alice Smith Python engineer", "FastAPI and PostgreSQL"]),
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.pdf"), b"garbage").unwrap();

        let app = build_router(rooted_state(dir.path(), ScriptedModel::replying("Alice Smith")));
        let (status, body) = send(app, json_request("POST", "/api/v1/ingest/local", json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_files_processed"], 2);
        assert_eq!(body["successful_files"], json!(["alice.pdf"]));
        assert_eq!(body["failed_files"][0]["filename"], "bad.pdf");
        assert!(body["total_pages_processed"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_ingest_missing_folder_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(rooted_state(dir.path(), ScriptedModel::replying("x")));
        let (status, body) = send(
            app,
            json_request("POST", "/api/v1/ingest/local", json!({ "folder": "missing" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_ingest_folder_outside_resume_folder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(rooted_state(dir.path(), ScriptedModel::replying("x")));

        for folder in ["/etc", "../", "cv/../../etc"] {
            let (status, body) = send(
                app.clone(),
                json_request("POST", "/api/v1/ingest/local", json!({ "folder": folder })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{folder}");
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

            let (status, _) = send(
                app.clone(),
                json_request(
                    "POST",
                    "/api/v1/ingest/jobs",
                    json!({ "source": "local", "folder": folder }),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{folder}");
        }
    }

    #[tokio::test]
    async fn test_concurrent_ingestion_conflicts() {
        let state = test_state(ScriptedModel::replying("x"));
        let _running = state.jobs.try_begin().unwrap();
        let (status, _) = send(
            build_router(state.clone()),
            json_request("POST", "/api/v1/ingest/local", json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            build_router(state),
            empty_request("DELETE", "/api/v1/resumes"),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_remote_ingestion_requires_configuration() {
        let app = build_router(test_state(ScriptedModel::replying("x")));
        let (status, _) = send(
            app,
            json_request("POST", "/api/v1/ingest/remote", json!({ "prefix": "cv" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_single_pdf() {
        let boundary = "X-RESUME-BOUNDARY";
        let pdf = build_pdf(&["Bob Jones Kotlin developer"]);
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"bob.pdf\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(&pdf);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/ingest/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let state = test_state(ScriptedModel::replying("Bob Jones"));
        let (status, body) = send(build_router(state.clone()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["successful_files"], json!(["bob.pdf"]));
        assert!(state.store.has_file("bob.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_background_job_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("2024")).unwrap();
        std::fs::write(
            dir.path().join("2024").join("alice.pdf"),
            build_pdf(&["Alice Smith Python engineer"]),
        )
        .unwrap();
        let app = build_router(rooted_state(dir.path(), ScriptedModel::replying("Alice Smith")));

        let (status, body) = send(
            app.clone(),
            json_request(
                "POST",
                "/api/v1/ingest/jobs",
                json!({ "source": "local", "folder": "2024" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let uri = format!("/api/v1/ingest/jobs/{job_id}");
        let mut last = Value::Null;
        for _ in 0..400 {
            let (status, body) = send(app.clone(), empty_request("GET", &uri)).await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] != "running" {
                last = body;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(last["status"], "completed");
        assert_eq!(last["summary"]["successful_files"], json!(["alice.pdf"]));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let app = build_router(test_state(ScriptedModel::replying("x")));
        let uri = format!("/api/v1/ingest/jobs/{}", uuid::Uuid::new_v4());
        let (status, _) = send(app.clone(), empty_request("GET", &uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_assemble_with_empty_store_is_ok() {
        let app = build_router(test_state(ScriptedModel::replying("never")));
        let (status, body) = send(
            app,
            json_request(
                "POST",
                "/api/v1/team/assemble",
                json!({ "project_requirements": "Python backend engineer" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "no_candidates_found");
        assert_eq!(body["team_recommendation"], Value::Null);
        assert_eq!(body["sources"], json!([]));
    }

    #[tokio::test]
    async fn test_assemble_generation_failure_is_bad_gateway() {
        let state = test_state(ScriptedModel::failing());
        seed(&state, "alice.pdf", 1, "Python and FastAPI").await;
        let (status, body) = send(
            build_router(state),
            json_request(
                "POST",
                "/api/v1/team/assemble",
                json!({ "project_requirements": "Python", "mode": "lexical" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["message"], "Recommendation unavailable");
    }

    #[tokio::test]
    async fn test_search_returns_ranked_chunks() {
        let state = test_state(ScriptedModel::replying("x"));
        seed(&state, "design.pdf", 1, "graphic design portfolio").await;
        seed(&state, "alice.pdf", 1, "5 years of Python and FastAPI experience").await;

        let (status, body) = send(
            build_router(state),
            empty_request("GET", "/api/v1/search?q=Python%20backend%20engineer&mode=lexical"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "lexical");
        assert_eq!(body["results"][0]["file_name"], "alice.pdf");
        assert_eq!(body["results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let app = build_router(test_state(ScriptedModel::replying("x")));
        let (status, _) = send(app, empty_request("GET", "/api/v1/search?q=%20")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
