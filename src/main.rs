//! Study Assistant HTTP 服务
//!
//! 入口：初始化日志、加载配置、构建 Agent，并启动 /search 与 /upload 服务。
//! Agent 构建失败（缺少 API key、向量库打不开等）直接退出，不带病启动。
//!
//! 启动: cargo run（默认 web feature），监听 [server] host:port（默认 0.0.0.0:8000）

use std::sync::Arc;

use anyhow::Context;
use study_assistant::{
    agent::create_agent,
    config::load_config,
    memory::ChunkingConfig,
    observability,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let components = create_agent(&cfg).context("Failed to initialize server")?;
    tracing::info!("Agent Executor loaded successfully. Server ready to process requests.");

    let chunking = ChunkingConfig {
        chunk_size: cfg.ingest.chunk_size,
        chunk_overlap: cfg.ingest.chunk_overlap,
    };
    let state = Arc::new(AppState::from_components(components, chunking));
    server::serve(state, &cfg.server)
        .await
        .context("Server stopped with an error")?;

    tracing::info!("Shutting down...");
    Ok(())
}
