//! Agent 错误类型
//!
//! 分层错误：AgentError（循环与初始化）、DispatchError（工具分派，局部恢复）、
//! IngestError 位于 ingest 模块，LlmError 位于 llm 模块，ServiceError 位于 server 模块。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误（初始化、空对话、模型未初始化、LLM、检查点）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 启动时模型 / 工具表 / 存储不可用，阻止服务
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Conversation is empty; refusing to invoke the model without input")]
    EmptyConversation,

    #[error("Model client is not initialized")]
    UninitializedModel,

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Config error: {0}")]
    Config(String),
}

/// 工具分派失败：名称解析或调用失败。只在分派内部使用，最终转为工具输出文本，不会中止本轮
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Ambiguous tool name '{name}', candidates: {candidates:?}")]
    AmbiguousTool { name: String, candidates: Vec<String> },

    #[error("Tool timeout: {0}")]
    Timeout(String),

    #[error("Tool panicked: {0}")]
    Panicked(String),
}
