//! Study Assistant - Rust 学习助手智能体
//!
//! 模块划分：
//! - **agent**: 从配置构建 Agent（LLM、检索库、工具表、检查点）
//! - **config**: 应用配置加载（TOML + 环境变量 + .env）
//! - **core**: 错误类型
//! - **ingest**: 文档加载、切分与入库
//! - **llm**: LLM 与嵌入客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）
//! - **memory**: 消息模型、会话检查点、检索库、生成物目录
//! - **react**: 状态机、模型绑定、Agent 主循环
//! - **server**: HTTP 接口（/search、/upload）
//! - **tools**: 工具箱（检索、Python、结构化输出、搜索、学习追踪、解答校验）与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompts;
pub mod react;
#[cfg(feature = "web")]
pub mod server;
pub mod tools;

pub use agent::{create_agent, AgentComponents};
pub use react::{Agent, TurnResult};
