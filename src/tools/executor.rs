//! 工具执行器
//!
//! 持有只读 ToolRegistry 与全局超时。dispatch(tool_calls) 按顺序为每个调用请求：
//! 解析名称 → 参数归一化为文本 → 在失败边界内执行（超时 / panic 得到空输出，工具 Err 转为
//! "Tool execution error: ..."）→ 包装为 Tool 消息。每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::DispatchError;
use crate::memory::{Message, ToolCallRequest};
use crate::tools::{Tool, ToolRegistry};

/// 参数为对象时依次尝试的通用字段
pub const COMMON_INPUT_KEYS: [&str; 4] = ["inp", "input", "query", "text"];

/// 工具执行器：名称解析、参数归一化、超时与 panic 边界、审计日志
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 依次执行全部请求，每个请求产生一条 Tool 消息；无请求时返回空列表
    pub async fn dispatch(&self, calls: &[ToolCallRequest]) -> Vec<Message> {
        let mut out = Vec::with_capacity(calls.len());
        for call in calls {
            out.push(self.execute(call).await);
        }
        out
    }

    /// 执行单个请求；任何失败都转为工具输出文本，不向上传播
    pub async fn execute(&self, call: &ToolCallRequest) -> Message {
        let tool = match self.registry.resolve(&call.name) {
            Ok(tool) => tool,
            Err(e) => {
                audit(&call.name, "unresolved", 0, &call.args);
                let content = match &e {
                    DispatchError::AmbiguousTool { name, candidates } => format!(
                        "Unknown tool: {} (ambiguous, candidates: {})",
                        name,
                        candidates.join(", ")
                    ),
                    other => other.to_string(),
                };
                return Message::tool(content, call.id.clone(), call.name.clone());
            }
        };

        let input = normalize_args(&call.args, tool.argument_keys());
        let start = Instant::now();
        let result = self.invoke(Arc::clone(&tool), input).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (outcome, content) = match result {
            Ok(Ok(text)) => ("ok", text),
            Ok(Err(e)) => ("error", format!("Tool execution error: {}", e)),
            Err(DispatchError::Timeout(name)) => {
                tracing::warn!(tool = %name, timeout_secs = self.timeout.as_secs(), "tool timed out");
                ("timeout", String::new())
            }
            Err(e) => {
                tracing::error!(tool = %tool.name(), error = %e, "tool failed outside its own error handling");
                ("panic", String::new())
            }
        };
        audit(tool.name(), outcome, duration_ms, &call.args);
        Message::tool(content, call.id.clone(), tool.name().to_string())
    }

    /// 在独立任务中执行工具，外层超时；panic 由 JoinError 捕获
    async fn invoke(
        &self,
        tool: Arc<dyn Tool>,
        input: String,
    ) -> Result<Result<String, String>, DispatchError> {
        let name = tool.name().to_string();
        let handle = tokio::spawn(async move { tool.execute(&input).await });
        let abort = handle.abort_handle();
        match timeout(self.timeout, handle).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(join_err)) => Err(DispatchError::Panicked(format!("{}: {}", name, join_err))),
            Err(_) => {
                abort.abort();
                Err(DispatchError::Timeout(name))
            }
        }
    }
}

/// 参数归一化为文本：字符串原样；对象取首个存在的 inp/input/query/text 或工具偏好字段，
/// 否则整体序列化为 JSON；其他值转字符串
pub fn normalize_args(args: &Value, tool_keys: &[&str]) -> String {
    match args {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Object(map) => COMMON_INPUT_KEYS
            .iter()
            .chain(tool_keys.iter())
            .find_map(|k| map.get(*k))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| args.to_string()),
        other => other.to_string(),
    }
}

fn audit(tool: &str, outcome: &str, duration_ms: u64, args: &Value) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "ok": outcome == "ok",
        "outcome": outcome,
        "duration_ms": duration_ms,
        "args_preview": args_preview(args),
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo_tool"
        }
        fn description(&self) -> &str {
            "echoes"
        }
        async fn execute(&self, input: &str) -> Result<String, String> {
            Ok(format!("echo:{}", input))
        }
    }

    struct Failing;

    #[async_trait]
    impl Tool for Failing {
        fn name(&self) -> &str {
            "failing_tool"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _input: &str) -> Result<String, String> {
            Err("boom".into())
        }
    }

    struct Panicking;

    #[async_trait]
    impl Tool for Panicking {
        fn name(&self) -> &str {
            "panicking_tool"
        }
        fn description(&self) -> &str {
            "panics"
        }
        async fn execute(&self, _input: &str) -> Result<String, String> {
            panic!("tool bug")
        }
    }

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow_tool"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        async fn execute(&self, _input: &str) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late".into())
        }
    }

    struct CodeTool;

    #[async_trait]
    impl Tool for CodeTool {
        fn name(&self) -> &str {
            "code_runner"
        }
        fn description(&self) -> &str {
            "runs code"
        }
        fn argument_keys(&self) -> &[&'static str] {
            &["code"]
        }
        async fn execute(&self, input: &str) -> Result<String, String> {
            Ok(input.to_string())
        }
    }

    fn executor() -> ToolExecutor {
        let mut r = ToolRegistry::new();
        r.register(Echo);
        r.register(Failing);
        r.register(Panicking);
        r.register(Slow);
        r.register(CodeTool);
        ToolExecutor::new(Arc::new(r), 1)
    }

    #[test]
    fn test_normalize_args() {
        assert_eq!(normalize_args(&json!("plain"), &[]), "plain");
        assert_eq!(normalize_args(&json!({"inp": "a", "query": "b"}), &[]), "a");
        assert_eq!(normalize_args(&json!({"query": "q"}), &[]), "q");
        assert_eq!(normalize_args(&json!({"code": "print(1)"}), &["code"]), "print(1)");
        assert_eq!(normalize_args(&json!({"x": 1}), &[]), "{\"x\":1}");
        assert_eq!(normalize_args(&json!(42), &[]), "42");
    }

    #[tokio::test]
    async fn test_dispatch_in_order_with_ids() {
        let calls = vec![
            ToolCallRequest::new("echo_tool", json!({"input": "one"})).with_id("1"),
            ToolCallRequest::new("code_runner", json!({"code": "x=1"})).with_id("2"),
        ];
        let out = executor().dispatch(&calls).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content(), "echo:one");
        assert_eq!(out[1].content(), "x=1");
        match &out[1] {
            Message::Tool { tool_call_id, name, .. } => {
                assert_eq!(tool_call_id, "2");
                assert_eq!(name, "code_runner");
            }
            other => panic!("expected tool message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_dispatch() {
        assert!(executor().dispatch(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_failures_stay_inside_boundary() {
        let exec = executor();
        let err = exec
            .execute(&ToolCallRequest::new("failing_tool", json!("x")))
            .await;
        assert_eq!(err.content(), "Tool execution error: boom");

        let panicked = exec
            .execute(&ToolCallRequest::new("panicking_tool", json!("x")))
            .await;
        assert_eq!(panicked.content(), "");

        let unknown = exec
            .execute(&ToolCallRequest::new("nonexistent", json!("x")))
            .await;
        assert_eq!(unknown.content(), "Unknown tool: nonexistent");
    }

    #[tokio::test]
    async fn test_timeout_gives_empty_output() {
        let out = executor()
            .execute(&ToolCallRequest::new("slow_tool", json!("x")))
            .await;
        assert_eq!(out.content(), "");
    }

    #[tokio::test]
    async fn test_ambiguous_name_produces_error_text() {
        let out = executor()
            .execute(&ToolCallRequest::new("_tool", json!("x")))
            .await;
        assert!(out.content().starts_with("Unknown tool: _tool (ambiguous"));
    }
}
