//! 对话消息模型与归一化
//!
//! Message 是 System / Human / Ai / Tool 四种变体的标签联合；RawMessage 描述 Agent 入口可接受的
//! 异构输入（已类型化消息、(role, content) 二元组、纯字符串、带 content 字段的映射、无法识别的值），
//! coerce_messages 是把后者转换为前者的全函数。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 模型请求的一次工具调用：id + 工具名 + 参数（字符串或 JSON 对象）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// 单条消息（与 LLM API 角色一致）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Ai {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        content: String,
        tool_call_id: String,
        name: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::Human {
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::Ai {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn ai_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::Ai {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool(
        content: impl Into<String>,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            name: name.into(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::Human { content }
            | Self::Ai { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }

    /// AI 消息上的工具调用请求；其它变体返回空切片
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::Ai { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System { .. })
    }

    pub fn is_ai(&self) -> bool {
        matches!(self, Self::Ai { .. })
    }

    pub fn role_name(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::Human { .. } => "human",
            Self::Ai { .. } => "ai",
            Self::Tool { .. } => "tool",
        }
    }
}

/// Agent 入口接受的原始消息形态。反序列化时按顺序尝试（untagged）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMessage {
    /// 已类型化的消息（JSON 中带 role 标签且字段齐全）
    Typed(Message),
    /// ("user", "text") 形式的二元组；content 可能不是字符串
    RolePair(String, Value),
    /// 纯文本，视为 Human
    Text(String),
    /// 带 content 字段的映射（可选 role 字段）
    Mapping(serde_json::Map<String, Value>),
    /// 其它无法识别的形态：字符串化后作为 Human，并记录日志
    Unrecognized(Value),
}

impl RawMessage {
    /// 输入的文本化表示（用于归一化失败后的整体拼接回退）
    pub fn render(&self) -> String {
        match self {
            Self::Typed(m) => m.content().to_string(),
            Self::RolePair(_, content) => value_to_text(content),
            Self::Text(s) => s.clone(),
            Self::Mapping(map) => map
                .get("content")
                .map(value_to_text)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            Self::Unrecognized(Value::Null) => String::new(),
            Self::Unrecognized(v) => value_to_text(v),
        }
    }
}

impl From<Message> for RawMessage {
    fn from(m: Message) -> Self {
        Self::Typed(m)
    }
}

impl From<&str> for RawMessage {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RawMessage {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<(&str, &str)> for RawMessage {
    fn from((role, content): (&str, &str)) -> Self {
        Self::RolePair(role.to_string(), Value::String(content.to_string()))
    }
}

/// 单条消息归一化失败（内容既不是文本也不是文本片段列表）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot coerce {shape} message: {reason}")]
pub struct CoercionError {
    pub shape: &'static str,
    pub reason: String,
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 把 content 值转为文本：字符串直接使用；片段列表取每段的 text / content 后以换行拼接
fn content_text(shape: &'static str, v: &Value) -> Result<String, CoercionError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Number(_) | Value::Bool(_) => Ok(v.to_string()),
        Value::Array(parts) => {
            let mut texts = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    Value::String(s) => texts.push(s.clone()),
                    Value::Object(obj) => {
                        let text = obj
                            .get("text")
                            .or_else(|| obj.get("content"))
                            .and_then(|t| t.as_str())
                            .ok_or_else(|| CoercionError {
                                shape,
                                reason: "content part without text".to_string(),
                            })?;
                        texts.push(text.to_string());
                    }
                    other => texts.push(other.to_string()),
                }
            }
            Ok(texts.join("\n"))
        }
        Value::Null => Err(CoercionError {
            shape,
            reason: "content is null".to_string(),
        }),
        Value::Object(_) => Err(CoercionError {
            shape,
            reason: "content is an object".to_string(),
        }),
    }
}

fn message_for_role(role: &str, content: String) -> Message {
    match role.to_lowercase().as_str() {
        "user" | "human" => Message::human(content),
        "assistant" | "ai" => Message::ai(content),
        "system" | "sys" => Message::system(content),
        _ => Message::human(content),
    }
}

/// 归一化单条原始消息；None 表示应跳过（如 null）
pub fn coerce_message(raw: &RawMessage) -> Result<Option<Message>, CoercionError> {
    match raw {
        RawMessage::Typed(m) => Ok(Some(m.clone())),
        RawMessage::RolePair(role, content) => {
            let text = content_text("role-pair", content)?;
            Ok(Some(message_for_role(role, text)))
        }
        RawMessage::Text(s) => Ok(Some(Message::human(s.clone()))),
        RawMessage::Mapping(map) => match map.get("content") {
            Some(content) => {
                let text = content_text("mapping", content)?;
                let role = map.get("role").and_then(|r| r.as_str()).unwrap_or("user");
                Ok(Some(message_for_role(role, text)))
            }
            None => {
                tracing::warn!("mapping message without content field; stringifying");
                Ok(Some(Message::human(Value::Object(map.clone()).to_string())))
            }
        },
        RawMessage::Unrecognized(Value::Null) => Ok(None),
        RawMessage::Unrecognized(v) => {
            tracing::warn!(value = %v, "unrecognized message shape; stringifying as human");
            Ok(Some(Message::human(value_to_text(v))))
        }
    }
}

/// 全函数归一化：任一条失败时回退为一条拼接全部输入文本的 Human 消息。
/// 非空输入保证产生非空输出。
pub fn coerce_messages(raw: &[RawMessage]) -> Vec<Message> {
    let coerced: Result<Vec<Option<Message>>, CoercionError> =
        raw.iter().map(coerce_message).collect();
    let coerced: Vec<Message> = match coerced {
        Ok(list) => list.into_iter().flatten().collect(),
        Err(e) => {
            tracing::warn!(error = %e, "message coercion failed; falling back to concatenation");
            return vec![concat_fallback(raw)];
        }
    };
    if coerced.is_empty() && !raw.is_empty() {
        return vec![concat_fallback(raw)];
    }
    coerced
}

fn concat_fallback(raw: &[RawMessage]) -> Message {
    let text: String = raw.iter().map(RawMessage::render).collect();
    Message::human(text)
}

/// 保证发送给模型的消息列表只有一条前置 System 消息：已有 System 时原样返回，否则在头部插入
pub fn with_system_prompt(mut messages: Vec<Message>, system_prompt: &str) -> Vec<Message> {
    if !messages.iter().any(Message::is_system) {
        messages.insert(0, Message::system(system_prompt));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_pairs_map_to_variants() {
        let raw: Vec<RawMessage> = vec![
            ("user", "hi").into(),
            ("AI", "hello").into(),
            ("sys", "rules").into(),
            ("narrator", "?").into(),
        ];
        let out = coerce_messages(&raw);
        assert_eq!(out[0], Message::human("hi"));
        assert_eq!(out[1], Message::ai("hello"));
        assert_eq!(out[2], Message::system("rules"));
        assert_eq!(out[3], Message::human("?"));
    }

    #[test]
    fn test_mapping_and_text_coerce_to_human() {
        let mut map = serde_json::Map::new();
        map.insert("content".into(), json!("from dict"));
        let raw = vec![RawMessage::Mapping(map), RawMessage::Text("plain".into())];
        let out = coerce_messages(&raw);
        assert_eq!(out, vec![Message::human("from dict"), Message::human("plain")]);
    }

    #[test]
    fn test_unrecognized_is_stringified_and_null_skipped() {
        let raw = vec![
            RawMessage::Unrecognized(json!(42)),
            RawMessage::Unrecognized(Value::Null),
        ];
        let out = coerce_messages(&raw);
        assert_eq!(out, vec![Message::human("42")]);
    }

    #[test]
    fn test_coercion_failure_falls_back_to_single_human() {
        let raw = vec![
            RawMessage::Text("a".into()),
            RawMessage::RolePair("user".into(), json!({"nested": true})),
        ];
        let out = coerce_messages(&raw);
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Message::Human { content } if content.starts_with('a')));
    }

    #[test]
    fn test_non_empty_input_never_yields_empty_output() {
        let raw = vec![RawMessage::Unrecognized(Value::Null)];
        assert_eq!(coerce_messages(&raw).len(), 1);
        assert!(coerce_messages(&[]).is_empty());
    }

    #[test]
    fn test_content_parts_are_joined() {
        let raw = vec![RawMessage::RolePair(
            "assistant".into(),
            json!([{"type": "text", "text": "one"}, "two"]),
        )];
        assert_eq!(coerce_messages(&raw), vec![Message::ai("one\ntwo")]);
    }

    #[test]
    fn test_system_prompt_inserted_once() {
        let once = with_system_prompt(vec![Message::human("q")], "SYS");
        let twice = with_system_prompt(once.clone(), "SYS");
        assert_eq!(twice.iter().filter(|m| m.is_system()).count(), 1);
        assert_eq!(once, twice);
        assert_eq!(twice[0], Message::system("SYS"));
    }

    #[test]
    fn test_raw_message_deserializes_untagged() {
        let raw: Vec<RawMessage> = serde_json::from_value(json!([
            {"role": "human", "content": "typed"},
            ["user", "pair"],
            "text",
            {"content": "mapped"},
            7
        ]))
        .unwrap();
        assert!(matches!(raw[0], RawMessage::Typed(_)));
        assert!(matches!(raw[1], RawMessage::RolePair(_, _)));
        assert!(matches!(raw[2], RawMessage::Text(_)));
        assert!(matches!(raw[3], RawMessage::Mapping(_)));
        assert!(matches!(raw[4], RawMessage::Unrecognized(_)));
    }

    #[test]
    fn test_message_serde_round_trip_keeps_tool_calls() {
        let m = Message::ai_with_tool_calls(
            "",
            vec![ToolCallRequest::new("python_interpreter", json!({"code": "print(1)"})).with_id("c1")],
        );
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["role"], "ai");
        let back: Message = serde_json::from_value(v).unwrap();
        assert_eq!(back.tool_calls()[0].id, "c1");
    }
}
