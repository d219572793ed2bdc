//! 状态机节点：Llm（初始）→ 条件分支 → Tools → Llm → … → End

use crate::memory::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Llm,
    Tools,
    End,
}

/// Llm 节点之后的分支：最近一条 AI 消息带工具调用请求则进入 Tools，否则结束
pub fn should_continue(messages: &[Message]) -> Node {
    match messages.iter().rev().find(|m| m.is_ai()) {
        Some(ai) if !ai.tool_calls().is_empty() => Node::Tools,
        _ => Node::End,
    }
}

impl Node {
    /// 节点执行完成后的下一节点
    pub fn next(self, messages: &[Message]) -> Node {
        match self {
            Node::Llm => should_continue(messages),
            Node::Tools => Node::Llm,
            Node::End => Node::End,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCallRequest;
    use serde_json::json;

    #[test]
    fn test_tool_calls_route_to_tools() {
        let msgs = vec![
            Message::human("2+2?"),
            Message::ai_with_tool_calls(
                "",
                vec![ToolCallRequest::new("python_interpreter", json!("print(2+2)"))],
            ),
        ];
        assert_eq!(should_continue(&msgs), Node::Tools);
        assert_eq!(Node::Llm.next(&msgs), Node::Tools);
        assert_eq!(Node::Tools.next(&msgs), Node::Llm);
    }

    #[test]
    fn test_plain_answer_ends() {
        let msgs = vec![Message::human("hi"), Message::ai("hello")];
        assert_eq!(should_continue(&msgs), Node::End);
        assert_eq!(should_continue(&[]), Node::End);
    }

    #[test]
    fn test_only_most_recent_ai_counts() {
        let msgs = vec![
            Message::ai_with_tool_calls("", vec![ToolCallRequest::new("t", json!("x"))]),
            Message::tool("out", "id", "t"),
            Message::ai("done"),
        ];
        assert_eq!(should_continue(&msgs), Node::End);
    }
}
