//! learning_tracker 工具：持久化学习目标与进度
//!
//! 状态保存在 `{artifacts}/learning_state.json`；每次更新可选地让模型把用户描述归类为
//! LearningProgressUpdate（失败只记日志），合并新完成的主题（去重），追加历史，并写出
//! `learning_progress/current_learning_progress.json` 与带时间戳的 `progress_{ts}.json`。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::LlmClient;
use crate::memory::{ArtifactStore, Message};
use crate::tools::schema::{schema_value, LearningProgressUpdate};
use crate::tools::Tool;

pub const LEARNING_STATE_FILE: &str = "learning_state.json";
pub const LEARNING_PROGRESS_DIR: &str = "learning_progress";
pub const CURRENT_PROGRESS_FILE: &str = "learning_progress/current_learning_progress.json";

/// 一次进度更新记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub timestamp: String,
    pub update: String,
    #[serde(default)]
    pub completed_topics: Vec<String>,
}

/// 持久学习状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    pub original_goal: String,
    pub start_date: String,
    #[serde(default)]
    pub completed_topics: Vec<String>,
    #[serde(default)]
    pub progress_history: Vec<ProgressEntry>,
    pub current_status: String,
}

impl LearningState {
    pub fn start(goal: &str) -> Self {
        Self {
            original_goal: goal.to_string(),
            start_date: chrono::Local::now().to_rfc3339(),
            completed_topics: Vec::new(),
            progress_history: Vec::new(),
            current_status: "Just Started".to_string(),
        }
    }

    /// 合并新完成主题，保持首次出现顺序，不重复
    pub fn merge_topics(&mut self, topics: &[String]) {
        for topic in topics {
            if !self.completed_topics.contains(topic) {
                self.completed_topics.push(topic.clone());
            }
        }
    }
}

/// 写出的进度报告
#[derive(Debug, Clone, Serialize)]
struct ProgressReport<'a> {
    timestamp: &'a str,
    original_goal: &'a str,
    session_update: &'a str,
    completed_topics: &'a [String],
    current_status: &'a str,
    progress_notes: &'a str,
    next_steps: &'a str,
    progress_history: &'a [ProgressEntry],
    last_updated: &'a str,
}

pub struct LearningTrackerTool {
    llm: Option<Arc<dyn LlmClient>>,
    artifacts: ArtifactStore,
}

impl LearningTrackerTool {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, artifacts: ArtifactStore) -> Self {
        Self { llm, artifacts }
    }

    async fn analyze(&self, state: &LearningState, update: &str) -> Option<LearningProgressUpdate> {
        let llm = self.llm.as_ref()?;
        let completed = if state.completed_topics.is_empty() {
            "Nothing yet".to_string()
        } else {
            state.completed_topics.join(", ")
        };
        let prompt = format!(
            "Analyze this learning progress update:\n\n\
ORIGINAL GOAL: {}\nALREADY COMPLETED: {}\nCURRENT UPDATE: {}\n\n\
Based on the user's update, identify:\n\
1. What new topics have they completed or become familiar with?\n\
2. A brief note about their progress in this session\n\
3. What they should focus on next\n\
4. Overall status toward completing their original goal",
            state.original_goal, completed, update
        );
        let schema = schema_value::<LearningProgressUpdate>();
        let result = llm
            .complete_json(&[Message::human(prompt)], "LearningProgressUpdate", &schema)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::from_value::<LearningProgressUpdate>(v).map_err(|e| e.to_string()));
        match result {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                tracing::warn!(error = %e, "could not analyze learning progress with LLM");
                None
            }
        }
    }

    async fn track(&self, update: &str) -> anyhow::Result<String> {
        let mut state = match self.artifacts.read_json::<LearningState>(LEARNING_STATE_FILE) {
            Ok(Some(state)) => state,
            Ok(None) => LearningState::start(update),
            Err(e) => {
                tracing::warn!(error = %e, "unreadable learning state; starting over");
                LearningState::start(update)
            }
        };

        let analysis = self.analyze(&state, update).await;
        if let Some(a) = &analysis {
            state.merge_topics(&a.completed_topics);
            if !a.overall_status.trim().is_empty() {
                state.current_status = a.overall_status.clone();
            }
        }

        let now = chrono::Local::now().to_rfc3339();
        state.progress_history.push(ProgressEntry {
            timestamp: now.clone(),
            update: update.to_string(),
            completed_topics: analysis
                .as_ref()
                .map(|a| a.completed_topics.clone())
                .unwrap_or_default(),
        });
        self.artifacts.write_fixed(LEARNING_STATE_FILE, &state)?;

        let progress_notes = analysis
            .as_ref()
            .map(|a| a.progress_notes.as_str())
            .unwrap_or("Progress tracked");
        let next_steps = analysis
            .as_ref()
            .map(|a| a.next_steps.as_str())
            .unwrap_or("Continue working on your goal");
        let report = ProgressReport {
            timestamp: &now,
            original_goal: &state.original_goal,
            session_update: update,
            completed_topics: &state.completed_topics,
            current_status: &state.current_status,
            progress_notes,
            next_steps,
            progress_history: &state.progress_history,
            last_updated: &now,
        };
        let current = self.artifacts.write_fixed(CURRENT_PROGRESS_FILE, &report)?;
        self.artifacts
            .write_timestamped(LEARNING_PROGRESS_DIR, "progress", &report)?;

        let mut summary = format!(
            "✅ **Learning Progress Updated!**\n\n📁 Saved to: `{}`\n\n🎯 **Original Goal:** {}\n\n",
            current.display(),
            state.original_goal
        );
        if state.completed_topics.is_empty() {
            summary.push_str("✔️ **Completed Topics:** None yet\n\n");
        } else {
            summary.push_str("✔️ **Completed Topics:**\n");
            for topic in &state.completed_topics {
                summary.push_str(&format!("   • {}\n", topic));
            }
            summary.push('\n');
        }
        summary.push_str(&format!("📊 **Status:** {}\n\n", state.current_status));
        if let Some(a) = &analysis {
            summary.push_str(&format!(
                "📝 **This Session:**\n{}\n\n➡️ **Next Steps:**\n{}",
                a.progress_notes, a.next_steps
            ));
        }
        Ok(summary)
    }
}

#[async_trait]
impl Tool for LearningTrackerTool {
    fn name(&self) -> &str {
        "learning_tracker"
    }

    fn description(&self) -> &str {
        "Tracks and monitors the user's learning progress over time and saves progress reports as JSON files under \
Downloads/StudyAssistant/learning_progress. The input should be a learning goal or a progress update \
(e.g. 'Master Python data structures' or 'I finished Chapter 5 exercises'). Use it when the user sets a new learning goal, \
wants to track progress on a topic, asks for a progress check or learning summary, or starts a new study milestone. \
Do not use it for general questions, content retrieval or code execution."
    }

    async fn execute(&self, input: &str) -> Result<String, String> {
        self.track(input.trim())
            .await
            .map_err(|e| format!("Error tracking learning progress: {}", e))
    }
}
