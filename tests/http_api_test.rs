//! HTTP 接口集成测试：tower::ServiceExt::oneshot 直接驱动路由

#![cfg(feature = "web")]

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use study_assistant::agent::assemble_agent;
    use study_assistant::config::{AppConfig, ServerSection};
    use study_assistant::llm::{HashingEmbedder, LlmError, MockLlmClient};
    use study_assistant::memory::{
        ArtifactStore, ChunkingConfig, InMemoryCheckpointer, InMemoryVectorStore, Message,
        RetrievalStore,
    };
    use study_assistant::server::{router, AppState};
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-STUDY-BOUNDARY";

    struct Fixture {
        app: Router,
        mock: Arc<MockLlmClient>,
        retrieval: Arc<RetrievalStore>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockLlmClient::new());
        let retrieval = Arc::new(RetrievalStore::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(InMemoryVectorStore::new()),
        ));
        let parts = assemble_agent(
            &AppConfig::default(),
            mock.clone(),
            retrieval.clone(),
            ArtifactStore::new(dir.path()),
            Arc::new(InMemoryCheckpointer::new()),
        );
        let state = Arc::new(AppState::from_components(parts, ChunkingConfig::default()));
        Fixture {
            app: router(state, &ServerSection::default()),
            mock,
            retrieval,
            _dir: dir,
        }
    }

    fn uninitialized() -> Router {
        let state = Arc::new(AppState::new(None, None, ChunkingConfig::default()));
        router(state, &ServerSection::default())
    }

    fn search_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/search")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_request(session_id: Option<&str>, files: &[(&str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, content) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(sid) = session_id {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\n{sid}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_search_generates_session_and_answers() {
        let f = fixture();
        f.mock.push_reply(Message::ai("Photosynthesis makes glucose."));
        let resp = f
            .app
            .oneshot(search_request(json!({"query": "What does photosynthesis make?"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["answer"], "Photosynthesis makes glucose.");
        assert!(!body["session_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_resumes_session() {
        let f = fixture();
        let first = f
            .app
            .clone()
            .oneshot(search_request(json!({"query": "remember 42", "session_id": "abc"})))
            .await
            .unwrap();
        assert_eq!(json_body(first).await["session_id"], "abc");
        f.app
            .oneshot(search_request(json!({"query": "what number?", "session_id": "abc"})))
            .await
            .unwrap();
        let second = &f.mock.calls()[1].messages;
        assert!(second.iter().any(|m| m.content() == "remember 42"));
    }

    #[tokio::test]
    async fn test_search_errors() {
        let resp = uninitialized()
            .oneshot(search_request(json!({"query": "hi"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(resp).await["detail"], "Agent Executor not initialized.");

        let f = fixture();
        let resp = f
            .app
            .clone()
            .oneshot(search_request(json!({"query": "   "})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        f.mock.push_error(LlmError::Http {
            status: 500,
            body: "upstream down".into(),
        });
        let resp = f
            .app
            .oneshot(search_request(json!({"query": "hi"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = json_body(resp).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("An error occurred while processing the query"));
    }

    #[tokio::test]
    async fn test_upload_mixed_files() {
        let f = fixture();
        let notes: &[u8] = b"Photosynthesis converts light energy into chemical energy.";
        let image: &[u8] = b"\x89PNG\r\n";
        let resp = f
            .app
            .oneshot(multipart_request(
                Some("abc"),
                &[("notes.txt", notes), ("image.png", image)],
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["message"], "Successfully processed 2 file(s)");
        assert_eq!(body["total_chunks"], 1);
        assert_eq!(body["files"][0], json!({"filename": "notes.txt", "status": "success", "chunks": 1}));
        assert_eq!(body["files"][1]["status"], "error");
        assert_eq!(body["files"][1]["error"], "Unsupported file type: .png");

        let hits = f.retrieval.query("photosynthesis light energy", 1).await.unwrap();
        assert_eq!(hits[0].metadata.get("session_id").map(String::as_str), Some("abc"));
        assert_eq!(hits[0].metadata.get("source_file").map(String::as_str), Some("notes.txt"));
    }

    #[tokio::test]
    async fn test_upload_without_valid_documents() {
        let f = fixture();
        let resp = f
            .app
            .clone()
            .oneshot(multipart_request(Some("abc"), &[("slides.pptx", &b"binary"[..])]))
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["message"], "No valid documents to process");
        assert_eq!(body["total_chunks"], 0);

        let resp = f
            .app
            .oneshot(multipart_request(None, &[("notes.txt", &b"text"[..])]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_and_tools() {
        let resp = uninitialized()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(resp).await, json!({"status": "ok", "agent_ready": false}));

        let f = fixture();
        let resp = f
            .app
            .oneshot(Request::get("/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let tools = json_body(resp).await;
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 6);
        assert_eq!(names[0], "course_knowledge_search");
    }
}
