//! 模型绑定与 LLM 步骤
//!
//! bind_tools 把注册表的 (name, description, parameters) 绑定到模型；提供方不支持工具调用或工具名
//! 不合法时记录警告并以无工具模型继续。call_model 负责调用前检查与 system prompt 前置。

use std::sync::Arc;

use regex::Regex;

use crate::core::AgentError;
use crate::llm::{LlmClient, ToolSpec};
use crate::memory::{with_system_prompt, Message};

/// 绑定了工具描述的模型句柄
#[derive(Clone)]
pub struct BoundModel {
    client: Arc<dyn LlmClient>,
    tools: Vec<ToolSpec>,
}

impl BoundModel {
    /// 不绑定任何工具
    pub fn unbound(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            tools: Vec::new(),
        }
    }

    pub fn is_bound(&self) -> bool {
        !self.tools.is_empty()
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn client(&self) -> &Arc<dyn LlmClient> {
        &self.client
    }

    pub async fn invoke(&self, messages: &[Message]) -> Result<Message, AgentError> {
        Ok(self.client.chat(messages, &self.tools).await?)
    }
}

/// 函数名约束：1-64 个字母、数字、下划线或连字符
fn invalid_tool_names(tools: &[ToolSpec]) -> Vec<String> {
    let valid = Regex::new(r"^[A-Za-z0-9_-]{1,64}$");
    tools
        .iter()
        .filter(|t| match &valid {
            Ok(re) => !re.is_match(&t.name),
            Err(_) => false,
        })
        .map(|t| t.name.clone())
        .collect()
}

/// 绑定工具；失败时返回未绑定模型
pub fn bind_tools(client: Arc<dyn LlmClient>, tools: Vec<ToolSpec>) -> BoundModel {
    if tools.is_empty() {
        return BoundModel::unbound(client);
    }
    if !client.supports_tools() {
        tracing::warn!("model provider does not support tool calling; continuing without tools");
        return BoundModel::unbound(client);
    }
    let invalid = invalid_tool_names(&tools);
    if !invalid.is_empty() {
        tracing::warn!(invalid = ?invalid, "tool binding failed: invalid function names; continuing without tools");
        return BoundModel::unbound(client);
    }
    tracing::info!(tools = tools.len(), "tools bound to model");
    BoundModel { client, tools }
}

/// LLM 步骤：空状态拒绝调用；模型未初始化报错；没有 System 消息时前置 system prompt；返回一条 AI 消息
pub async fn call_model(
    model: Option<&BoundModel>,
    state: &[Message],
    system_prompt: &str,
) -> Result<Message, AgentError> {
    if state.is_empty() {
        return Err(AgentError::EmptyConversation);
    }
    let model = model.ok_or(AgentError::UninitializedModel)?;
    let input = with_system_prompt(state.to_vec(), system_prompt);
    let reply = model.invoke(&input).await?;
    match reply {
        Message::Ai { .. } => Ok(reply),
        other => {
            tracing::warn!(role = other.role_name(), "model returned a non-AI message; wrapping as AI");
            Ok(Message::ai(other.content()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    fn spec(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.into(),
            description: "d".into(),
            parameters: json!({"type": "object"}),
        }
    }

    #[test]
    fn test_bind_valid_tools() {
        let m = bind_tools(Arc::new(MockLlmClient::new()), vec![spec("python_interpreter")]);
        assert!(m.is_bound());
    }

    #[test]
    fn test_binding_failure_falls_back_to_unbound() {
        let invalid = bind_tools(Arc::new(MockLlmClient::new()), vec![spec("bad name!")]);
        assert!(!invalid.is_bound());
        let unsupported = bind_tools(
            Arc::new(MockLlmClient::new().without_tool_support()),
            vec![spec("ok_name")],
        );
        assert!(!unsupported.is_bound());
    }

    #[tokio::test]
    async fn test_empty_state_never_invokes_model() {
        let mock = Arc::new(MockLlmClient::new());
        let model = BoundModel::unbound(mock.clone());
        let err = call_model(Some(&model), &[], "sys").await.unwrap_err();
        assert!(matches!(err, AgentError::EmptyConversation));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_uninitialized_model() {
        let err = call_model(None, &[Message::human("hi")], "sys").await.unwrap_err();
        assert!(matches!(err, AgentError::UninitializedModel));
    }

    #[tokio::test]
    async fn test_exactly_one_leading_system_message() {
        let mock = Arc::new(MockLlmClient::new());
        let model = BoundModel::unbound(mock.clone());
        call_model(Some(&model), &[Message::human("hi")], "behave").await.unwrap();
        call_model(
            Some(&model),
            &[Message::system("custom"), Message::human("hi")],
            "behave",
        )
        .await
        .unwrap();
        let calls = mock.calls();
        for call in &calls {
            assert_eq!(call.messages.iter().filter(|m| m.is_system()).count(), 1);
            assert!(call.messages[0].is_system());
        }
        assert_eq!(calls[0].messages[0].content(), "behave");
        assert_eq!(calls[1].messages[0].content(), "custom");
    }
}
