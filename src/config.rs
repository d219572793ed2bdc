//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 `.env`（dotenvy），再读 TOML 文件，最后用环境变量 `STUDY__*` 覆盖
//! （双下划线表示嵌套，如 `STUDY__LLM__PROVIDER=openai`、`STUDY__SERVER__PORT=9000`）。
//! 凭证不写进配置文件：LLM 读 `GOOGLE_API_KEY` / `OPENAI_API_KEY`，搜索读 `CUSTOM_SEARCH_API_KEY` 等。

use std::path::PathBuf;

use serde::Deserialize;

use crate::memory::default_artifacts_root;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub artifacts: ArtifactsSection,
    pub ingest: IngestSection,
    pub memory: MemorySection,
    pub server: ServerSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "StudyAssistant".into(),
        }
    }
}

/// [llm] 段：后端选择（gemini / openai）、模型、超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: String,
    /// 未设置时：gemini 用 gemini-2.5-flash，openai 用 gpt-4o-mini
    pub model: Option<String>,
    /// OpenAI 兼容端点；gemini 时忽略
    pub base_url: Option<String>,
    /// 一般留空，从环境变量读取
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "gemini".into(),
            model: None,
            base_url: None,
            api_key: None,
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

/// [embedding] 段：openai（OpenAI 兼容 embeddings 端点）或 hashing（本地，无需 key）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// hashing 嵌入维度
    pub dims: usize,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "text-embedding-3-small".into(),
            base_url: None,
            api_key: None,
            dims: 256,
        }
    }
}

/// [agent] 段：循环上限与 system prompt 覆盖
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: usize,
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: crate::react::DEFAULT_MAX_ITERATIONS,
            system_prompt_path: None,
        }
    }
}

/// [tools] 段：全局工具超时与各工具参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub code: CodeSection,
    pub search: SearchSection,
    pub rag: RagSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 60,
            code: CodeSection::default(),
            search: SearchSection::default(),
            rag: RagSection::default(),
        }
    }
}

/// [tools.code] 段：Python 沙箱
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodeSection {
    pub interpreter: String,
    pub timeout_secs: u64,
}

impl Default for CodeSection {
    fn default() -> Self {
        Self {
            interpreter: "python3".into(),
            timeout_secs: 5,
        }
    }
}

/// [tools.search] 段：Google Custom Search
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub timeout_secs: u64,
    pub num_results: u8,
    pub max_result_chars: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            num_results: 5,
            max_result_chars: 8000,
        }
    }
}

/// [tools.rag] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagSection {
    pub top_k: usize,
}

impl Default for RagSection {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

/// [artifacts] 段：生成物根目录，未设置时为 ~/Downloads/StudyAssistant
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ArtifactsSection {
    pub root: Option<PathBuf>,
}

impl ArtifactsSection {
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(default_artifacts_root)
    }
}

/// [ingest] 段：切分参数与向量库后端（memory / sqlite）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub vector_store: String,
    pub vector_store_path: PathBuf,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            vector_store: "sqlite".into(),
            vector_store_path: PathBuf::from("vector_store/chunks.db"),
        }
    }
}

/// [memory] 段：会话检查点；enabled = false 时使用 Noop
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub enabled: bool,
    pub checkpoint_path: PathBuf,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            enabled: true,
            checkpoint_path: PathBuf::from("chat_memory.db"),
        }
    }
}

/// [server] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// 上传请求体上限（MB）
    pub max_upload_mb: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".into()],
            max_upload_mb: 50,
        }
    }
}

/// 从 config 目录加载配置，环境变量 STUDY__* 可覆盖
///
/// 1. 读取当前目录的 `.env`（不存在则忽略）
/// 2. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 3. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 4. 最后叠加环境变量 STUDY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!(error = %e, "failed to read .env");
        }
    }

    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found; ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STUDY")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("server.cors_origins")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.agent.max_iterations, 10);
        assert_eq!(cfg.tools.code.timeout_secs, 5);
        assert_eq!(cfg.tools.rag.top_k, 4);
        assert_eq!(cfg.ingest.chunk_size, 1000);
        assert_eq!(cfg.ingest.chunk_overlap, 200);
        assert_eq!(cfg.server.cors_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[llm]\nprovider = \"openai\"\nmodel = \"gpt-4o\"\n\n[tools.code]\ntimeout_secs = 9\n\n[memory]\nenabled = false\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.model.as_deref(), Some("gpt-4o"));
        assert_eq!(cfg.tools.code.timeout_secs, 9);
        assert_eq!(cfg.tools.code.interpreter, "python3");
        assert!(!cfg.memory.enabled);
        assert_eq!(cfg.tools.search.num_results, 5);
    }

    #[test]
    fn test_artifacts_root_override() {
        let section = ArtifactsSection {
            root: Some(PathBuf::from("/tmp/study")),
        };
        assert_eq!(section.root_dir(), PathBuf::from("/tmp/study"));
    }
}
