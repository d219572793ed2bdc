//! OpenAI 兼容 Chat Completions 客户端
//!
//! 基于 async-openai 调用 `{base_url}/chat/completions`（非流式），支持 tools / tool_calls 与
//! response_format=json_object；OpenAI、Gemini 的 OpenAI 兼容端点、自建代理均可使用。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionResponseMessage, ChatCompletionTool,
    ChatCompletionTools, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    CreateChatCompletionResponse, FunctionCall, FunctionObjectArgs, ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;

use crate::llm::traits::{extract_json, json_instruction};
use crate::llm::{LlmClient, LlmError, ToolSpec};
use crate::memory::{Message, ToolCallRequest};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

impl From<OpenAIError> for LlmError {
    fn from(e: OpenAIError) -> Self {
        match e {
            OpenAIError::ApiError(api) => LlmError::Api(api.to_string()),
            OpenAIError::JSONDeserialize(err, _) => LlmError::Decode(err.to_string()),
            OpenAIError::InvalidArgument(msg) => LlmError::Unsupported(msg),
            other => LlmError::Transport(other.to_string()),
        }
    }
}

/// 带超时的 HTTP 客户端；构建失败时退回默认客户端并告警
pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    match reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(
                error = %e,
                timeout_secs,
                "Failed to build HTTP client with timeout, falling back to default client"
            );
            reqwest::Client::new()
        }
    }
}

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 async-openai 客户端、模型名与温度
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str, timeout_secs: u64) -> Self {
        let base_url = base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/');
        let config = OpenAIConfig::new()
            .with_api_base(base_url)
            .with_api_key(api_key);
        Self {
            client: Client::with_config(config).with_http_client(http_client(timeout_secs)),
            model: model.to_string(),
            temperature: None,
            usage: TokenUsage::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        json_mode: bool,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(to_openai_messages(messages)?);
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        if !tools.is_empty() {
            args.tools(to_openai_tools(tools)?);
        }
        if json_mode {
            args.response_format(ResponseFormat::JsonObject);
        }
        Ok(args.build()?)
    }

    async fn send(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, LlmError> {
        let response = self.client.chat().create(request).await?;
        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }
        Ok(response)
    }
}

/// 内部 Message 转 async-openai 请求消息
fn to_openai_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    let mut out = Vec::with_capacity(messages.len());
    for m in messages {
        let msg: ChatCompletionRequestMessage = match m {
            Message::System { content } => ChatCompletionRequestSystemMessageArgs::default()
                .content(content.as_str())
                .build()?
                .into(),
            Message::Human { content } => ChatCompletionRequestUserMessageArgs::default()
                .content(content.as_str())
                .build()?
                .into(),
            Message::Ai {
                content,
                tool_calls,
            } => {
                let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                if !content.is_empty() {
                    args.content(content.as_str());
                }
                if !tool_calls.is_empty() {
                    let calls: Vec<ChatCompletionMessageToolCalls> = tool_calls
                        .iter()
                        .map(|tc| {
                            let arguments = match &tc.args {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                                id: tc.id.clone(),
                                function: FunctionCall {
                                    name: tc.name.clone(),
                                    arguments,
                                },
                            })
                        })
                        .collect();
                    args.tool_calls(calls);
                }
                args.build()?.into()
            }
            Message::Tool {
                content,
                tool_call_id,
                ..
            } => ChatCompletionRequestToolMessageArgs::default()
                .content(content.as_str())
                .tool_call_id(tool_call_id.as_str())
                .build()?
                .into(),
        };
        out.push(msg);
    }
    Ok(out)
}

fn to_openai_tools(tools: &[ToolSpec]) -> Result<Vec<ChatCompletionTools>, LlmError> {
    tools
        .iter()
        .map(|t| {
            let function = FunctionObjectArgs::default()
                .name(t.name.as_str())
                .description(t.description.as_str())
                .parameters(t.parameters.clone())
                .build()?;
            Ok(ChatCompletionTools::Function(ChatCompletionTool { function }))
        })
        .collect()
}

/// 回复消息转 AI 消息；arguments 不是合法 JSON 时按原字符串保留
fn from_response_message(msg: ChatCompletionResponseMessage) -> Message {
    let tool_calls = msg
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .filter_map(|tc| match tc {
            ChatCompletionMessageToolCalls::Function(call) => Some(call),
            ChatCompletionMessageToolCalls::Custom(_) => {
                tracing::warn!("Ignoring custom tool call in model reply");
                None
            }
        })
        .map(|call| {
            let args = serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::String(call.function.arguments.clone()));
            let req = ToolCallRequest::new(call.function.name, args);
            if call.id.is_empty() {
                req
            } else {
                req.with_id(call.id)
            }
        })
        .collect();
    Message::ai_with_tool_calls(msg.content.unwrap_or_default(), tool_calls)
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message, LlmError> {
        let request = self.build_request(messages, tools, false)?;
        let response = self.send(request).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;
        Ok(from_response_message(choice.message))
    }

    async fn complete_json(
        &self,
        messages: &[Message],
        schema_name: &str,
        schema: &Value,
    ) -> Result<Value, LlmError> {
        let mut prompt = Vec::with_capacity(messages.len() + 1);
        prompt.push(Message::system(json_instruction(schema_name, schema)));
        prompt.extend_from_slice(messages);
        let request = self.build_request(&prompt, &[], true)?;
        let response = self.send(request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)?;
        extract_json(&content)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}
