//! 嵌入 API：供检索库（RAG）使用
//!
//! - OpenAiEmbedder：async-openai 调用 OpenAI 兼容的 /embeddings 端点（批量）
//! - HashingEmbedder：本地特征哈希向量，无需网络，用于离线部署与测试

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::LlmError;

/// 嵌入提供方：一次编码一批文本，返回与输入等长、同序的向量
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    /// 编码单条查询
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut out = self.embed(&[text.to_string()]).await?;
        out.pop().ok_or(LlmError::EmptyResponse)
    }

    fn name(&self) -> &str;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()
            .map_err(|e| LlmError::Unsupported(e.to_string()))?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let mut data = response.data;
        data.sort_by_key(|e| e.index);
        if data.len() != texts.len() {
            return Err(LlmError::Decode(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// 特征哈希嵌入：小写词元经 FNV-1a 映射到固定维度，带符号累加后 L2 归一化
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(&token.to_lowercase());
            let idx = (h % self.dims as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in s.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// 按配置创建嵌入提供方：provider = "hashing" 或缺少 API key 时使用本地哈希嵌入
pub fn create_embedder_from_config(
    provider: &str,
    base_url: Option<&str>,
    model: &str,
    api_key: Option<&str>,
    dims: usize,
) -> Arc<dyn EmbeddingProvider> {
    if provider.eq_ignore_ascii_case("hashing") {
        return Arc::new(HashingEmbedder::new(dims));
    }
    let key = api_key
        .map(String::from)
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()));
    match key {
        Some(key) => Arc::new(OpenAiEmbedder::new(base_url, model, &key)),
        None => {
            tracing::warn!("no embedding API key; falling back to local hashing embedder");
            Arc::new(HashingEmbedder::new(dims))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let out = e
            .embed(&["Rust ownership".to_string(), "rust OWNERSHIP".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], out[1]);
        let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hashing_embedder_similarity_orders_by_overlap() {
        let e = HashingEmbedder::new(512);
        let q = e.embed_text("photosynthesis in plants");
        let near = e.embed_text("plants perform photosynthesis using light");
        let far = e.embed_text("the french revolution began in 1789");
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[test]
    fn test_factory_hashing_provider() {
        let e = create_embedder_from_config("hashing", None, "unused", None, 32);
        assert_eq!(e.name(), "hashing");
    }
}
