//! Gemini 客户端（OpenAI 兼容端点）
//!
//! Google 为 Gemini 提供 OpenAI 兼容的 Chat Completions / Embeddings 接口。
//! - Base URL: https://generativelanguage.googleapis.com/v1beta/openai
//! - 模型: gemini-2.5-flash（默认）, gemini-2.5-pro

use crate::llm::{LlmError, OpenAiClient};

/// Gemini API 常量
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const GEMINI_FLASH: &str = "gemini-2.5-flash";
pub const GEMINI_PRO: &str = "gemini-2.5-pro";

/// 读取 Gemini API key：`GOOGLE_API_KEY`，其次 `GEMINI_API_KEY`
pub fn gemini_api_key() -> Option<String> {
    std::env::var("GOOGLE_API_KEY")
        .ok()
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
}

/// 创建 Gemini 客户端
///
/// - api_key 为 None 时读取环境变量；都没有则返回 `LlmError::MissingApiKey`
/// - 模型可通过 `model` 参数或 `GEMINI_MODEL` 环境变量指定
pub fn create_gemini_client(
    model: Option<&str>,
    api_key: Option<&str>,
    timeout_secs: u64,
) -> Result<OpenAiClient, LlmError> {
    let api_key = api_key
        .map(String::from)
        .filter(|k| !k.trim().is_empty())
        .or_else(gemini_api_key)
        .ok_or_else(|| LlmError::MissingApiKey("gemini".into()))?;

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("GEMINI_MODEL").ok())
        .unwrap_or_else(|| GEMINI_FLASH.to_string());

    Ok(OpenAiClient::new(
        Some(GEMINI_BASE_URL),
        &model,
        &api_key,
        timeout_secs,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_key_and_model() {
        let client = create_gemini_client(Some(GEMINI_PRO), Some("k"), 30).unwrap();
        assert_eq!(client.model(), GEMINI_PRO);
    }
}
