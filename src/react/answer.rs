//! 从本轮新增消息中提取最终回答

use crate::memory::Message;

/// 结构化输出工具名；模型没有给出文本回答时，直接返回该工具的输出
pub const STRUCTURED_TOOL_NAME: &str = "structured_formatter";

/// 优先最后一条内容非空的 AI 消息；否则结构化输出工具的最后结果；否则最后一条消息内容
pub fn extract_answer(turn: &[Message]) -> String {
    if let Some(ai) = turn
        .iter()
        .rev()
        .find(|m| m.is_ai() && !m.content().trim().is_empty())
    {
        return ai.content().to_string();
    }
    if let Some(structured) = turn.iter().rev().find(|m| {
        matches!(m, Message::Tool { name, content, .. } if name == STRUCTURED_TOOL_NAME && !content.is_empty())
    }) {
        return structured.content().to_string();
    }
    turn.last()
        .map(|m| m.content().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCallRequest;
    use serde_json::json;

    #[test]
    fn test_prefers_last_non_empty_ai() {
        let turn = vec![
            Message::human("q"),
            Message::ai("first"),
            Message::ai_with_tool_calls("", vec![ToolCallRequest::new("t", json!("x"))]),
        ];
        assert_eq!(extract_answer(&turn), "first");
    }

    #[test]
    fn test_falls_back_to_structured_output() {
        let turn = vec![
            Message::human("make a quiz"),
            Message::ai_with_tool_calls("", vec![ToolCallRequest::new(STRUCTURED_TOOL_NAME, json!("quiz"))]),
            Message::tool("✅ Quiz Generated!", "id", STRUCTURED_TOOL_NAME),
            Message::ai(""),
        ];
        assert_eq!(extract_answer(&turn), "✅ Quiz Generated!");
    }

    #[test]
    fn test_last_message_otherwise() {
        let turn = vec![Message::human("q"), Message::tool("raw", "id", "other")];
        assert_eq!(extract_answer(&turn), "raw");
        assert_eq!(extract_answer(&[]), "");
    }
}
