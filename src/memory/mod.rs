//! 记忆层：对话消息与强制转换、会话检查点、RAG 检索库、产物持久化

pub mod artifacts;
pub mod checkpoint;
pub mod conversation;
pub mod rag;

pub use artifacts::{default_artifacts_root, ArtifactStore};
pub use checkpoint::{
    open_checkpointer, Checkpointer, InMemoryCheckpointer, NoopCheckpointer, SqliteCheckpointer,
};
pub use conversation::{
    coerce_message, coerce_messages, with_system_prompt, CoercionError, Message, RawMessage,
    ToolCallRequest,
};
pub use rag::{
    Chunk, Chunker, ChunkingConfig, ChunkingError, InMemoryVectorStore, RetrievalResult,
    RetrievalStore, SqliteVectorStore, StoreError, VectorStore,
};
