//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）与嵌入

pub mod embedding;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod traits;

pub use embedding::{
    create_embedder_from_config, EmbeddingProvider, HashingEmbedder, OpenAiEmbedder,
};
pub use gemini::{create_gemini_client, gemini_api_key, GEMINI_BASE_URL, GEMINI_FLASH};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{extract_json, LlmClient, LlmError, ToolSpec};
