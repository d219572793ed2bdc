//! HTTP 处理函数：/search、/upload、/health、/tools

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::ingest::{self, IngestError};
use crate::memory::Chunk;
use crate::server::{AppState, ServiceError};
use crate::tools::ToolManifestEntry;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// 缺省时生成新的会话 ID
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub answer: String,
    pub session_id: String,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<SearchResponse>, ServiceError> {
    let agent = state
        .agent
        .clone()
        .ok_or_else(|| ServiceError::Unavailable("Agent Executor not initialized.".into()))?;
    let query = req.query.trim();
    if query.is_empty() {
        return Err(ServiceError::BadRequest("query is required".into()));
    }
    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let turn = agent
        .invoke(&session_id, vec![("user", query).into()])
        .await
        .map_err(|e| {
            ServiceError::Internal(format!("An error occurred while processing the query: {e}"))
        })?;

    let tools_used: Vec<&str> = turn
        .messages
        .iter()
        .flat_map(|m| m.tool_calls().iter().map(|c| c.name.as_str()))
        .collect();
    tracing::info!(
        session_id = %session_id,
        messages = turn.messages.len(),
        iterations = turn.iterations,
        tools_used = ?tools_used,
        "query answered"
    );

    Ok(Json(SearchResponse {
        answer: turn.answer,
        session_id,
    }))
}

/// 单个上传文件的处理结果
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UploadFileResult {
    pub filename: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadFileResult {
    fn success(filename: String, chunks: usize) -> Self {
        Self {
            filename,
            status: "success",
            chunks: Some(chunks),
            error: None,
        }
    }

    fn failure(filename: String, error: String) -> Self {
        Self {
            filename,
            status: "error",
            chunks: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<UploadFileResult>,
    pub total_chunks: usize,
}

async fn load_upload(filename: String, bytes: Vec<u8>) -> Result<Vec<Chunk>, IngestError> {
    tokio::task::spawn_blocking(move || ingest::load_bytes(&filename, &bytes))
        .await
        .map_err(|e| IngestError::Io(std::io::Error::other(e.to_string())))?
}

/// multipart：重复的 `files` 字段 + `session_id`；逐文件加载，汇总后切分入库
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServiceError> {
    let retrieval = state
        .retrieval
        .clone()
        .ok_or_else(|| ServiceError::Unavailable("Vector store not initialized.".into()))?;

    let mut session_id: Option<String> = None;
    let mut uploads: Vec<(String, Vec<u8>)> = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::BadRequest(format!("failed to read {filename}: {e}")))?;
                uploads.push((filename, bytes.to_vec()));
            }
            "session_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServiceError::BadRequest(format!("invalid session_id: {e}")))?;
                session_id = Some(text);
            }
            other => tracing::debug!(field = other, "ignoring multipart field"),
        }
    }
    let session_id = session_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ServiceError::BadRequest("session_id is required".into()))?;
    if uploads.is_empty() {
        return Err(ServiceError::BadRequest("at least one file is required".into()));
    }

    let mut processed = Vec::with_capacity(uploads.len());
    let mut documents = Vec::new();
    for (filename, bytes) in uploads {
        tracing::info!(filename = %filename, size = bytes.len(), "processing upload");
        match load_upload(filename.clone(), bytes).await {
            Ok(docs) => {
                let count = docs.len();
                documents.extend(docs.into_iter().map(|d| {
                    d.with_metadata("session_id", session_id.clone())
                        .with_metadata("source_file", filename.clone())
                }));
                processed.push(UploadFileResult::success(filename, count));
            }
            Err(e) => {
                tracing::warn!(filename = %filename, error = %e, "upload rejected");
                processed.push(UploadFileResult::failure(filename, e.to_string()));
            }
        }
    }

    if documents.is_empty() {
        return Ok(Json(UploadResponse {
            message: "No valid documents to process".into(),
            files: processed,
            total_chunks: 0,
        }));
    }

    let chunking = state.chunking;
    let chunks = ingest::split(&documents, chunking.chunk_size, chunking.chunk_overlap)
        .map_err(|e| ServiceError::Internal(format!("Error processing files: {e}")))?;
    let total_chunks = chunks.len();
    ingest::index(&retrieval, chunks)
        .await
        .map_err(|e| ServiceError::Internal(format!("Error processing files: {e}")))?;
    tracing::info!(session_id = %session_id, total_chunks, "upload indexed");

    Ok(Json(UploadResponse {
        message: format!("Successfully processed {} file(s)", processed.len()),
        files: processed,
        total_chunks,
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub agent_ready: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        agent_ready: state.agent.is_some(),
    })
}

pub async fn tools(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ToolManifestEntry>>, ServiceError> {
    let agent = state
        .agent
        .as_ref()
        .ok_or_else(|| ServiceError::Unavailable("Agent Executor not initialized.".into()))?;
    Ok(Json(agent.executor().registry().manifest()))
}
