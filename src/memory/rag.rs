//! RAG 检索库
//!
//! 提供文档分块（字符滑动窗口）、向量存储（内存 / SQLite）与检索。
//! 课程知识检索工具只依赖 `RetrievalStore::query`。

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{EmbeddingProvider, LlmError};

/// 文档块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// 块 ID
    pub id: String,
    /// 原始文本
    pub text: String,
    /// 来源（文件路径或 URL）
    pub source_id: String,
    /// 在原文档中的位置（字符偏移）
    pub offset: usize,
    /// 元数据：source / session_id / source_file / chunk_index / page ...
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>, source_id: impl Into<String>) -> Self {
        let source_id = source_id.into();
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), source_id.clone());
        Self {
            id: id.into(),
            text: text.into(),
            source_id,
            offset: 0,
            metadata,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 分块参数非法
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("chunk_size must be positive")]
    ZeroSize,
    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
}

/// 分块策略（字符数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// 文档分块器：字符滑动窗口，窗口间重叠 chunk_overlap 个字符，无缝覆盖全文
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self, ChunkingError> {
        if config.chunk_size == 0 {
            return Err(ChunkingError::ZeroSize);
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                size: config.chunk_size,
                overlap: config.chunk_overlap,
            });
        }
        Ok(Self { config })
    }

    /// 窗口边界（字符下标，左闭右开）
    pub fn windows(&self, total_chars: usize) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        if total_chars == 0 {
            return out;
        }
        let mut start = 0;
        loop {
            let end = (start + self.config.chunk_size).min(total_chars);
            out.push((start, end));
            if end >= total_chars {
                break;
            }
            start = end - self.config.chunk_overlap;
        }
        out
    }

    /// 切分一个块；子块继承元数据，并带 chunk_index 与 offset（相对父块偏移累加）
    pub fn split(&self, chunk: &Chunk) -> Vec<Chunk> {
        let chars: Vec<char> = chunk.text.chars().collect();
        self.windows(chars.len())
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| {
                let text: String = chars[start..end].iter().collect();
                let offset = chunk.offset + start;
                let mut child = Chunk {
                    id: format!("{}_{}", chunk.id, i),
                    text,
                    source_id: chunk.source_id.clone(),
                    offset,
                    metadata: chunk.metadata.clone(),
                };
                child.metadata.insert("chunk_index".into(), i.to_string());
                child.metadata.insert("offset".into(), offset.to_string());
                child
            })
            .collect()
    }

    pub fn split_all(&self, chunks: &[Chunk]) -> Vec<Chunk> {
        chunks.iter().flat_map(|c| self.split(c)).collect()
    }
}

/// 检索结果
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// 检索到的块
    pub chunk: Chunk,
    /// 相似度分数
    pub score: f32,
}

/// 向量库错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] LlmError),
    #[error("vector store backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// 向量存储能力：追加（块, 向量）并按余弦相似度检索 top-k
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, entries: Vec<(Chunk, Vec<f32>)>) -> Result<usize, StoreError>;

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

/// 内存向量库
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<(Chunk, Vec<f32>)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(&self, entries: Vec<(Chunk, Vec<f32>)>) -> Result<usize, StoreError> {
        let n = entries.len();
        self.entries
            .write()
            .map_err(|_| StoreError::Backend("vector store lock poisoned".into()))?
            .extend(entries);
        Ok(n)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::Backend("vector store lock poisoned".into()))?;
        Ok(top_k(
            entries.iter().map(|(c, e)| (c.clone(), cosine_similarity(query, e))),
            k,
        ))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| StoreError::Backend("vector store lock poisoned".into()))?
            .len())
    }
}

/// SQLite 持久化向量库：向量以 little-endian f32 BLOB 存储，检索为全表余弦扫描
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS chunks (
                id        TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                text      TEXT NOT NULL,
                char_offset INTEGER NOT NULL,
                metadata  TEXT NOT NULL,
                embedding BLOB NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("sqlite connection poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?
    }
}

fn encode_vec(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add(&self, entries: Vec<(Chunk, Vec<f32>)>) -> Result<usize, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO chunks (id, source_id, text, char_offset, metadata, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (chunk, emb) in &entries {
                    let metadata = serde_json::to_string(&chunk.metadata)
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    stmt.execute(params![
                        chunk.id,
                        chunk.source_id,
                        chunk.text,
                        chunk.offset as i64,
                        metadata,
                        encode_vec(emb)
                    ])?;
                }
            }
            tx.commit()?;
            Ok(entries.len())
        })
        .await
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>, StoreError> {
        let query = query.to_vec();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id, source_id, text, char_offset, metadata, embedding FROM chunks")?;
            let rows = stmt.query_map([], |row| {
                let metadata: String = row.get(4)?;
                let embedding: Vec<u8> = row.get(5)?;
                let offset: i64 = row.get(3)?;
                Ok((
                    Chunk {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        text: row.get(2)?,
                        offset: offset.max(0) as usize,
                        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                    },
                    decode_vec(&embedding),
                ))
            })?;
            let mut scored = Vec::new();
            for row in rows {
                let (chunk, emb) = row?;
                let score = cosine_similarity(&query, &emb);
                scored.push((chunk, score));
            }
            Ok(top_k(scored.into_iter(), k))
        })
        .await
    }

    async fn len(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
            Ok(n.max(0) as usize)
        })
        .await
    }
}

fn top_k(scored: impl Iterator<Item = (Chunk, f32)>, k: usize) -> Vec<RetrievalResult> {
    let mut results: Vec<RetrievalResult> = scored
        .map(|(chunk, score)| RetrievalResult { chunk, score })
        .collect();
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(k);
    results
}

/// 余弦相似度
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// 检索库：嵌入提供方 + 向量存储
/// 单次嵌入请求的最大块数
pub const EMBED_BATCH_SIZE: usize = 64;

pub struct RetrievalStore {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
}

impl RetrievalStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            batch_size: EMBED_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// 按 batch_size 分批嵌入并追加；返回写入块数
    pub async fn index(&self, chunks: Vec<Chunk>) -> Result<usize, StoreError> {
        let total = chunks.len();
        let mut written = 0;
        let mut pending = chunks.into_iter().peekable();
        while pending.peek().is_some() {
            let batch: Vec<Chunk> = pending.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(StoreError::Backend(format!(
                    "embedder {} returned {} vectors for {} chunks",
                    self.embedder.name(),
                    embeddings.len(),
                    batch.len()
                )));
            }
            written += self
                .store
                .add(batch.into_iter().zip(embeddings).collect())
                .await?;
            tracing::debug!(written, total, "indexed embedding batch");
        }
        if total > 0 {
            tracing::info!(chunks = written, embedder = self.embedder.name(), "indexed chunks");
        }
        Ok(written)
    }

    /// 最近邻检索，带分数
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>, StoreError> {
        let q = self.embedder.embed_one(query).await?;
        self.store.search(&q, k).await
    }

    /// 最近邻检索，仅返回块
    pub async fn query(&self, query: &str, k: usize) -> Result<Vec<Chunk>, StoreError> {
        Ok(self
            .retrieve(query, k)
            .await?
            .into_iter()
            .map(|r| r.chunk)
            .collect())
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.store.len().await
    }
}
