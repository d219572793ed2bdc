//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本依次返回预置的 AI 消息 / JSON 结构化输出，并记录每次调用收到的消息与工具列表；
//! 脚本耗尽后回显最后一条 Human 消息。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{LlmClient, LlmError, ToolSpec};
use crate::memory::Message;

/// 一次 chat 调用的记录
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
}

/// Mock 客户端：脚本化回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<Message, LlmError>>>,
    json_replies: Mutex<VecDeque<Result<Value, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    no_tools: bool,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定 AI 消息
    pub fn scripted(replies: Vec<Message>) -> Self {
        let mock = Self::default();
        for r in replies {
            mock.push_reply(r);
        }
        mock
    }

    /// 模拟不支持工具调用的提供方
    pub fn without_tool_support(mut self) -> Self {
        self.no_tools = true;
        self
    }

    pub fn push_reply(&self, reply: Message) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply));
        }
    }

    pub fn push_error(&self, err: LlmError) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(err));
        }
    }

    pub fn push_json(&self, value: Value) {
        if let Ok(mut q) = self.json_replies.lock() {
            q.push_back(Ok(value));
        }
    }

    pub fn push_json_error(&self, err: LlmError) {
        if let Ok(mut q) = self.json_replies.lock() {
            q.push_back(Err(err));
        }
    }

    /// 已发生的 chat 调用
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }
        let scripted = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(reply) = scripted {
            return reply;
        }
        let last_human = messages
            .iter()
            .rev()
            .find(|m| matches!(m, Message::Human { .. }))
            .map(|m| m.content())
            .unwrap_or("(no input)");
        Ok(Message::ai(format!("Echo from Mock: {}", last_human)))
    }

    async fn complete_json(
        &self,
        _messages: &[Message],
        schema_name: &str,
        _schema: &Value,
    ) -> Result<Value, LlmError> {
        self.json_replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| {
                Err(LlmError::Unsupported(format!(
                    "no scripted JSON reply for {}",
                    schema_name
                )))
            })
    }

    fn supports_tools(&self) -> bool {
        !self.no_tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_echo() {
        let mock = MockLlmClient::scripted(vec![Message::ai("first")]);
        let a = mock.chat(&[Message::human("hi")], &[]).await.unwrap();
        assert_eq!(a.content(), "first");
        let b = mock.chat(&[Message::human("hi")], &[]).await.unwrap();
        assert_eq!(b.content(), "Echo from Mock: hi");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_json_queue_exhausted_is_error() {
        let mock = MockLlmClient::new();
        mock.push_json(serde_json::json!({"a": 1}));
        let schema = serde_json::json!({});
        assert!(mock.complete_json(&[], "X", &schema).await.is_ok());
        assert!(mock.complete_json(&[], "X", &schema).await.is_err());
    }
}
