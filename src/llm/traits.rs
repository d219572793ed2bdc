//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Gemini 兼容端点 / Mock）实现 LlmClient：
//! chat（可带工具描述，返回一条 AI 消息）、complete（纯文本）、complete_json（结构化输出）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Missing API key for provider {0}")]
    MissingApiKey(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Model returned no choices")]
    EmptyResponse,

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// 供模型选择的工具描述：名称、使用说明、参数 JSON Schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 对话补全：tools 非空时模型可返回带 tool_calls 的 AI 消息
    async fn chat(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message, LlmError>;

    /// 纯文本补全（不绑定工具）
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let reply = self.chat(messages, &[]).await?;
        Ok(reply.content().to_string())
    }

    /// 结构化输出：要求模型只输出符合 schema 的 JSON，并解析为 Value。
    /// 默认实现把 schema 拼进 system 指令，再从回复中提取 JSON 对象
    async fn complete_json(
        &self,
        messages: &[Message],
        schema_name: &str,
        schema: &Value,
    ) -> Result<Value, LlmError> {
        let mut prompt = Vec::with_capacity(messages.len() + 1);
        prompt.push(Message::system(json_instruction(schema_name, schema)));
        prompt.extend_from_slice(messages);
        let text = self.complete(&prompt).await?;
        extract_json(&text)
    }

    /// 是否支持原生工具调用；不支持时绑定失败，Agent 以无工具模型继续
    fn supports_tools(&self) -> bool {
        true
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 结构化输出的 system 指令
pub fn json_instruction(schema_name: &str, schema: &Value) -> String {
    format!(
        "Respond with a single JSON object and nothing else. The object MUST strictly adhere to the {} JSON schema below.\n\n{}",
        schema_name,
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
    )
}

/// 从模型文本中提取 JSON 对象（```json ... ``` 或首个 '{' 到最后一个 '}'）
pub fn extract_json(output: &str) -> Result<Value, LlmError> {
    let trimmed = output.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end < start {
            return Err(LlmError::Decode(format!("no JSON object in: {trimmed}")));
        }
        &trimmed[start..=end]
    } else {
        return Err(LlmError::Decode(format!("no JSON object in: {trimmed}")));
    };
    serde_json::from_str(json_str).map_err(|e| LlmError::Decode(format!("{e}: {json_str}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fence() {
        let v = extract_json("sure:\n```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_extract_json_from_prose() {
        let v = extract_json("Here you go {\"quiz_title\": \"T\"} bye").unwrap();
        assert_eq!(v["quiz_title"], "T");
    }

    #[test]
    fn test_extract_json_rejects_plain_text() {
        assert!(matches!(extract_json("no json"), Err(LlmError::Decode(_))));
    }
}
