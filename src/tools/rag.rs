//! course_knowledge_search 工具：检索已上传文档并基于上下文作答
//!
//! 返回 JSON `{answer, context}`；检索库缺失或 LLM 失败时返回 `{answer, context: null, error}`，
//! answer 为致歉文本。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::llm::LlmClient;
use crate::memory::{Message, RetrievalStore};
use crate::tools::Tool;

const RAG_PROMPT_TEMPLATE: &str = "You are an AI study assistant that helps students learn effectively. Use the provided context to answer the user's query.
If the context and retrieved data sources are insufficient to answer the question, do not make up an answer and inform the user that you don't have enough information.
Context:
{context}
Question: {question}
Answer in a clear manner, suitable for a student's understanding.";

#[derive(Debug, Serialize)]
struct SearchOutput {
    answer: String,
    context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub struct CourseKnowledgeSearchTool {
    store: Option<Arc<RetrievalStore>>,
    llm: Arc<dyn LlmClient>,
    top_k: usize,
}

impl CourseKnowledgeSearchTool {
    pub fn new(store: Option<Arc<RetrievalStore>>, llm: Arc<dyn LlmClient>, top_k: usize) -> Self {
        Self {
            store,
            llm,
            top_k: top_k.max(1),
        }
    }

    async fn answer(&self, question: &str) -> Result<(String, String), String> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| "document store is not available".to_string())?;
        let chunks = store
            .query(question, self.top_k)
            .await
            .map_err(|e| e.to_string())?;
        tracing::debug!(hits = chunks.len(), "course knowledge retrieval");
        let context = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = RAG_PROMPT_TEMPLATE
            .replace("{context}", &context)
            .replace("{question}", question);
        let answer = self
            .llm
            .complete(&[Message::human(prompt)])
            .await
            .map_err(|e| e.to_string())?;
        Ok((answer, context))
    }
}

#[async_trait]
impl Tool for CourseKnowledgeSearchTool {
    fn name(&self) -> &str {
        "course_knowledge_search"
    }

    fn description(&self) -> &str {
        "Searches and retrieves relevant information from the user's uploaded documents, study materials, course notes and personal knowledge base. \
The input MUST be the complete user question or topic (e.g. 'What does the syllabus say about late submissions?'). \
Returns an answer grounded in the retrieved document chunks together with the context used. \
USE THIS TOOL FIRST for any question about course content, policies, syllabi, assignments, lecture notes, slides or previously uploaded files, \
even if the user asks for 'updates' or 'the latest' information. \
Do not use it for real-time web data (weather, news, prices) or code execution."
    }

    async fn execute(&self, input: &str) -> Result<String, String> {
        let output = match self.answer(input).await {
            Ok((answer, context)) => SearchOutput {
                answer,
                context: Some(context),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "course knowledge search failed");
                SearchOutput {
                    answer: format!(
                        "Sorry, I encountered an error while searching your documents: {}",
                        e
                    ),
                    context: None,
                    error: Some(e),
                }
            }
        };
        serde_json::to_string(&output).map_err(|e| e.to_string())
    }
}
