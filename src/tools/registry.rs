//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry
//! 按注册顺序保存，构建完成后只读；ToolExecutor 在调用时解析名称、归一化参数、加超时。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::DispatchError;
use crate::llm::ToolSpec;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（输入为文本）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型 tool_call 中的 name）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认是单个字符串字段 `input`
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": {"type": "string", "description": "Input text for the tool"}
            },
            "required": ["input"]
        })
    }

    /// 参数为对象时，除 inp / input / query / text 外本工具优先取用的字段（如 `code`）
    fn argument_keys(&self) -> &[&'static str] {
        &[]
    }

    /// 执行工具；Err 由执行器包装为 "Tool execution error: ..."
    async fn execute(&self, input: &str) -> Result<String, String>;
}

/// 工具清单条目（GET /tools）
#[derive(Debug, Clone, Serialize)]
pub struct ToolManifestEntry {
    pub name: String,
    pub description: String,
}

/// 工具注册表：按注册顺序存储 Arc<dyn Tool>，名称唯一
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具被替换（保持原位置）
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        if let Some(slot) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            tracing::warn!(tool = %tool.name(), "duplicate tool name; replacing earlier registration");
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// 名称解析：精确匹配 → 唯一子串匹配（请求名是注册名的子串）→ 唯一注册工具
    pub fn resolve(&self, requested: &str) -> Result<Arc<dyn Tool>, DispatchError> {
        if let Some(tool) = self.get(requested) {
            return Ok(tool);
        }

        if !requested.is_empty() {
            let candidates: Vec<&Arc<dyn Tool>> = self
                .tools
                .iter()
                .filter(|t| t.name().contains(requested))
                .collect();
            match candidates.as_slice() {
                [only] => {
                    tracing::warn!(requested, resolved = %only.name(), "tool resolved by substring match");
                    return Ok(Arc::clone(only));
                }
                [] => {}
                many => {
                    let names: Vec<String> = many.iter().map(|t| t.name().to_string()).collect();
                    tracing::warn!(requested, candidates = ?names, "ambiguous tool name; not resolved");
                    return Err(DispatchError::AmbiguousTool {
                        name: requested.to_string(),
                        candidates: names,
                    });
                }
            }
        }

        if let [sole] = self.tools.as_slice() {
            tracing::warn!(requested, resolved = %sole.name(), "unknown tool name; using the only registered tool");
            return Ok(Arc::clone(sole));
        }

        Err(DispatchError::UnknownTool(requested.to_string()))
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 供模型绑定的 (name, description, parameters) 列表
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn manifest(&self) -> Vec<ToolManifestEntry> {
        self.tools
            .iter()
            .map(|t| ToolManifestEntry {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }
}
