//! Headless Agent 运行时
//!
//! 从 AppConfig 构建完整 Agent：LLM 客户端、嵌入与向量库、生成物目录、六个工具（固定顺序）、
//! 工具执行器、工具绑定与会话检查点。HTTP 服务与 ingest CLI 共用这里的构建函数。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{
    create_embedder_from_config, create_gemini_client, LlmClient, MockLlmClient, OpenAiClient,
};
use crate::memory::{
    open_checkpointer, ArtifactStore, Checkpointer, InMemoryVectorStore, NoopCheckpointer,
    RetrievalStore, SqliteVectorStore, VectorStore,
};
use crate::prompts::load_system_prompt;
use crate::react::{bind_tools, Agent};
use crate::tools::{
    CourseKnowledgeSearchTool, GoogleSearchTool, LearningTrackerTool, PythonInterpreterTool,
    PythonSandbox, SearchCredentials, SolutionValidatorTool, StructuredFormatterTool,
    ToolExecutor, ToolRegistry,
};

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// 预构建的 Agent 组件：Agent 本体与 /upload 需要的检索库、生成物目录
pub struct AgentComponents {
    pub agent: Agent,
    pub retrieval: Arc<RetrievalStore>,
    pub artifacts: ArtifactStore,
}

/// 按 [llm] 段创建聊天模型：gemini / openai / mock；缺少凭证视为初始化失败
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let llm = &cfg.llm;
    match llm.provider.to_lowercase().as_str() {
        "gemini" | "google" => {
            let client = create_gemini_client(
                llm.model.as_deref(),
                llm.api_key.as_deref(),
                llm.timeout_secs,
            )
            .map_err(|e| AgentError::Initialization(e.to_string()))?
            .with_temperature(llm.temperature);
            tracing::info!(model = client.model(), "Using Gemini LLM");
            Ok(Arc::new(client))
        }
        "openai" => {
            let key = llm
                .api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()))
                .ok_or_else(|| AgentError::Initialization("OPENAI_API_KEY is not set".into()))?;
            let model = llm.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
            let client = OpenAiClient::new(llm.base_url.as_deref(), model, &key, llm.timeout_secs)
                .with_temperature(llm.temperature);
            tracing::info!(model, "Using OpenAI-compatible LLM");
            Ok(Arc::new(client))
        }
        "mock" => {
            tracing::warn!("Using Mock LLM");
            Ok(Arc::new(MockLlmClient::new()))
        }
        other => Err(AgentError::Config(format!("unknown llm provider: {other}"))),
    }
}

/// 按 [embedding] / [ingest] 段创建检索库
pub fn create_retrieval_store(cfg: &AppConfig) -> Result<Arc<RetrievalStore>, AgentError> {
    let emb = &cfg.embedding;
    let embedder = create_embedder_from_config(
        &emb.provider,
        emb.base_url.as_deref(),
        &emb.model,
        emb.api_key.as_deref(),
        emb.dims,
    );
    let store: Arc<dyn VectorStore> = match cfg.ingest.vector_store.to_lowercase().as_str() {
        "memory" => Arc::new(InMemoryVectorStore::new()),
        "sqlite" => {
            let path = &cfg.ingest.vector_store_path;
            let store = SqliteVectorStore::open(path)
                .map_err(|e| AgentError::Initialization(format!("vector store {}: {e}", path.display())))?;
            tracing::info!(path = %path.display(), "sqlite vector store opened");
            Arc::new(store)
        }
        other => return Err(AgentError::Config(format!("unknown vector store: {other}"))),
    };
    tracing::info!(embedder = embedder.name(), "retrieval store ready");
    Ok(Arc::new(RetrievalStore::new(embedder, store)))
}

/// 按 [memory] 段创建检查点；关闭或打不开时为 Noop
pub fn create_checkpointer(cfg: &AppConfig) -> Arc<dyn Checkpointer> {
    if cfg.memory.enabled {
        open_checkpointer(Some(&cfg.memory.checkpoint_path))
    } else {
        tracing::info!("conversation memory disabled by config");
        Arc::new(NoopCheckpointer)
    }
}

/// 工具表（固定顺序）：检索、代码执行、结构化输出、实时搜索、学习追踪、解答校验
pub fn create_tool_registry(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    retrieval: Option<Arc<RetrievalStore>>,
    artifacts: &ArtifactStore,
) -> ToolRegistry {
    let sandbox = PythonSandbox::new(cfg.tools.code.interpreter.clone(), cfg.tools.code.timeout_secs);
    let search = &cfg.tools.search;

    let mut tools = ToolRegistry::new();
    tools.register(CourseKnowledgeSearchTool::new(
        retrieval,
        llm.clone(),
        cfg.tools.rag.top_k,
    ));
    tools.register(PythonInterpreterTool::new(sandbox.clone()));
    tools.register(StructuredFormatterTool::new(llm.clone(), artifacts.clone()));
    tools.register(GoogleSearchTool::new(
        SearchCredentials::from_env(),
        search.timeout_secs,
        search.num_results,
        search.max_result_chars,
    ));
    tools.register(LearningTrackerTool::new(Some(llm.clone()), artifacts.clone()));
    tools.register(SolutionValidatorTool::new(sandbox, Some(llm), artifacts.clone()));
    tools
}

/// 用给定 LLM 与检索库组装 Agent（测试可注入 Mock 与内存后端）
pub fn assemble_agent(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    retrieval: Arc<RetrievalStore>,
    artifacts: ArtifactStore,
    checkpointer: Arc<dyn Checkpointer>,
) -> AgentComponents {
    let registry = Arc::new(create_tool_registry(
        cfg,
        llm.clone(),
        Some(retrieval.clone()),
        &artifacts,
    ));
    let model = bind_tools(llm, registry.tool_specs());
    let executor = ToolExecutor::new(registry.clone(), cfg.tools.tool_timeout_secs);
    let system_prompt = load_system_prompt(cfg.agent.system_prompt_path.as_deref());
    let agent = Agent::new(Some(model), executor, checkpointer, system_prompt)
        .with_max_iterations(cfg.agent.max_iterations);
    tracing::info!(
        tools = ?registry.tool_names(),
        max_iterations = agent.max_iterations(),
        memory = agent.memory_enabled(),
        "agent assembled"
    );
    AgentComponents {
        agent,
        retrieval,
        artifacts,
    }
}

/// 从配置创建 Agent；模型或存储不可用时返回 Initialization 错误
pub fn create_agent(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    let llm = create_llm_from_config(cfg)?;
    let retrieval = create_retrieval_store(cfg)?;
    let artifacts = ArtifactStore::new(cfg.artifacts.root_dir());
    tracing::info!(root = %artifacts.root().display(), "artifacts directory");
    let checkpointer = create_checkpointer(cfg);
    Ok(assemble_agent(cfg, llm, retrieval, artifacts, checkpointer))
}
