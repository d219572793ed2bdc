//! 文档摄取管线：加载 → 切分 → 嵌入入库
//!
//! 上传接口与 `study-ingest` 命令行共用这里的函数。

pub mod loader;

use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::memory::{Chunk, Chunker, ChunkingConfig, ChunkingError, RetrievalStore, StoreError};

pub use loader::{extension_of, load_bytes, load_path, load_url, SourceKind};

/// 网页抓取默认超时（秒）
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{0}")]
    UnsupportedSource(String),

    #[error("invalid split parameters: {0}")]
    InvalidSplit(#[from] ChunkingError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse PDF: {0}")]
    Pdf(String),

    #[error("failed to parse Word document: {0}")]
    Docx(String),

    #[error("failed to fetch web page: {0}")]
    Http(String),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),
}

/// 加载本地文件或 http(s) 网页
pub async fn load(path_or_url: &str) -> Result<Vec<Chunk>, IngestError> {
    match SourceKind::detect(path_or_url) {
        Some(SourceKind::Web) => load_url(path_or_url.trim(), DEFAULT_FETCH_TIMEOUT_SECS).await,
        Some(_) => load_path(Path::new(path_or_url)).await,
        None => Err(IngestError::UnsupportedSource(format!(
            "Unsupported file type or URL: {path_or_url}"
        ))),
    }
}

/// 字符滑动窗口切分；chunk_overlap ≥ chunk_size 返回 InvalidSplit
pub fn split(
    chunks: &[Chunk],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, IngestError> {
    let chunker = Chunker::new(ChunkingConfig {
        chunk_size,
        chunk_overlap,
    })?;
    Ok(chunker.split_all(chunks))
}

/// 嵌入并写入检索库，返回写入块数
pub async fn index(store: &RetrievalStore, chunks: Vec<Chunk>) -> Result<usize, IngestError> {
    Ok(store.index(chunks).await?)
}

/// 目录摄取结果
#[derive(Debug, Default, Clone)]
pub struct IngestReport {
    pub files_loaded: usize,
    pub files_skipped: Vec<(PathBuf, String)>,
    pub chunks_indexed: usize,
}

fn is_hidden_or_backup(name: &str) -> bool {
    name.starts_with('.') || name.ends_with('~')
}

/// 递归遍历目录：跳过隐藏 / 备份文件；不支持或损坏的文件记录后跳过；最后统一切分入库
pub async fn ingest_directory(
    dir: &Path,
    store: &RetrievalStore,
    config: ChunkingConfig,
) -> Result<IngestReport, IngestError> {
    if !dir.is_dir() {
        return Err(IngestError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Source directory not found: {}", dir.display()),
        )));
    }
    let chunker = Chunker::new(config)?;
    let mut report = IngestReport::default();
    let mut documents = Vec::new();

    let entries = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_or_backup(&e.file_name().to_string_lossy()))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file());

    for entry in entries {
        let path = entry.path();
        match load_path(path).await {
            Ok(docs) => {
                tracing::info!(path = %path.display(), documents = docs.len(), "loaded");
                report.files_loaded += 1;
                documents.extend(docs);
            }
            Err(IngestError::UnsupportedSource(reason)) => {
                tracing::info!(path = %path.display(), %reason, "skipping file");
                report.files_skipped.push((path.to_path_buf(), reason));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "error loading file");
                report.files_skipped.push((path.to_path_buf(), e.to_string()));
            }
        }
    }

    let chunks = chunker.split_all(&documents);
    tracing::info!(documents = documents.len(), chunks = chunks.len(), "split documents");
    report.chunks_indexed = index(store, chunks).await?;
    Ok(report)
}
