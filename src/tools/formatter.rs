//! structured_formatter 工具：按关键字选择产物 Schema，强制模型输出符合 Schema 的 JSON，
//! 校验后写入 `generated_outputs/{prefix}_{ts}.json`，返回文件路径与内容预览。

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{ArtifactStore, Message};
use crate::tools::schema::ArtifactKind;
use crate::tools::Tool;

pub const GENERATED_OUTPUTS_DIR: &str = "generated_outputs";
const PREVIEW_CHARS: usize = 2000;

pub struct StructuredFormatterTool {
    llm: Arc<dyn LlmClient>,
    artifacts: ArtifactStore,
}

impl StructuredFormatterTool {
    pub fn new(llm: Arc<dyn LlmClient>, artifacts: ArtifactStore) -> Self {
        Self { llm, artifacts }
    }
}

#[async_trait]
impl Tool for StructuredFormatterTool {
    fn name(&self) -> &str {
        "structured_formatter"
    }

    fn description(&self) -> &str {
        "Generates reliable structured data by forcing the model to output a JSON object that conforms to a fixed schema \
(quiz, flashcard deck, to-do list, schedule or email draft) and AUTOMATICALLY SAVES it to a timestamped JSON file under \
Downloads/StudyAssistant/generated_outputs. The input MUST be a concise natural language request naming the content and \
the target format (e.g. 'Generate a 5-item to-do list for final exam week' or 'Create a flashcard deck on Chapter 2 terms'). \
Use it EXCLUSIVELY when the user asks for a quiz, test, flashcards, to-do list, study schedule or email draft. \
Returns the saved file path and a preview of the content. Do not use it for general questions, retrieval or code execution."
    }

    async fn execute(&self, input: &str) -> Result<String, String> {
        let Some(kind) = ArtifactKind::classify(input) else {
            return Ok(format!(
                "Error: Could not identify a target structured format (Quiz, Flashcard, To-Do List, Schedule, Email) from the request: '{}'.",
                input
            ));
        };
        tracing::info!(kind = kind.prefix(), "structured formatter");

        let messages = [
            Message::system(format!(
                "Generate the requested structured object based on the user's prompt. The output MUST strictly adhere to the {} schema.",
                kind.schema_name()
            )),
            Message::human(input),
        ];
        let value = self
            .llm
            .complete_json(&messages, kind.schema_name(), &kind.schema())
            .await
            .map_err(|e| format!("structured generation failed: {}", e))?;
        let value = kind
            .validate(value)
            .map_err(|e| format!("output does not match {}: {}", kind.schema_name(), e))?;

        let path = self
            .artifacts
            .write_timestamped(GENERATED_OUTPUTS_DIR, kind.prefix(), &value)
            .map_err(|e| e.to_string())?;

        let pretty = serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?;
        let mut display = format!(
            "✅ **{} Generated!**\n\n📁 Saved to: `{}`\n\n📋 **Content:**\n```json\n",
            kind.title(),
            path.display()
        );
        display.extend(pretty.chars().take(PREVIEW_CHARS));
        if pretty.chars().count() > PREVIEW_CHARS {
            display.push_str("\n...(truncated for display)");
        }
        display.push_str("\n```");
        Ok(display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    #[tokio::test]
    async fn test_quiz_saved_with_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        llm.push_json(json!({
            "quiz_title": "Cells",
            "questions": [{
                "question_text": "Powerhouse of the cell?",
                "options": ["Nucleus", "Mitochondria"],
                "correct_answer": "Mitochondria",
                "explanation": "It produces ATP."
            }]
        }));
        let tool = StructuredFormatterTool::new(llm, ArtifactStore::new(dir.path()));
        let out = tool.execute("Make a 1-question quiz on cells").await.unwrap();
        assert!(out.contains("Quiz Generated!"));

        let files: Vec<_> = std::fs::read_dir(dir.path().join(GENERATED_OUTPUTS_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("quiz_"));
        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(GENERATED_OUTPUTS_DIR).join(&files[0])).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["questions"][0]["correct_answer"], "Mitochondria");
    }

    #[tokio::test]
    async fn test_unclassifiable_request() {
        let dir = tempfile::tempdir().unwrap();
        let tool = StructuredFormatterTool::new(Arc::new(MockLlmClient::new()), ArtifactStore::new(dir.path()));
        let out = tool.execute("hello there").await.unwrap();
        assert!(out.starts_with("Error: Could not identify a target structured format"));
        assert!(!dir.path().join(GENERATED_OUTPUTS_DIR).exists());
    }

    #[tokio::test]
    async fn test_invalid_model_output_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        llm.push_json(json!({"subject": "missing fields"}));
        let tool = StructuredFormatterTool::new(llm, ArtifactStore::new(dir.path()));
        let err = tool.execute("draft an email to my professor").await.unwrap_err();
        assert!(err.contains("EmailDraftModel"));
    }
}
