//! 结构化输出 Schema（schemars 自动生成）
//!
//! 结构化产物（测验 / 抽认卡 / 待办 / 日程 / 邮件草稿）以及工具内部使用的结构化分类结果。
//! 字段上的文档注释会进入 JSON Schema 的 description，作为给 LLM 的填写说明。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single multiple-choice or short-answer question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuizQuestion {
    /// The complete question text.
    pub question_text: String,
    /// List of options for a multiple-choice question. Use an empty list for short-answer.
    #[serde(default)]
    pub options: Vec<String>,
    /// The correct answer, matching one of the options or providing the short answer.
    pub correct_answer: String,
    /// Brief explanation of why the answer is correct.
    pub explanation: String,
}

/// A comprehensive quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StructuredQuiz {
    /// A descriptive, academic title for the quiz.
    pub quiz_title: String,
    /// A list of generated questions.
    pub questions: Vec<QuizQuestion>,
}

/// A single flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Flashcard {
    /// The term or concept that goes on the front of the flashcard.
    pub term: String,
    /// The detailed definition, explanation, or answer that goes on the back of the flashcard.
    pub definition: String,
}

/// A set of flashcards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FlashcardDeck {
    /// A descriptive title for the flashcard deck.
    pub deck_title: String,
    /// A list of generated flashcards.
    pub cards: Vec<Flashcard>,
}

/// A single task or action item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToDoItem {
    /// The full description of the task.
    pub task_description: String,
    /// The task's priority (e.g., 'High', 'Medium', 'Low').
    pub priority: String,
    /// The date or time the task should be completed.
    pub due_date: String,
}

/// A comprehensive to-do list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToDoList {
    /// A title for the to-do list (e.g., 'Weekly Study Tasks').
    pub list_title: String,
    /// A list of tasks to be completed.
    pub tasks: Vec<ToDoItem>,
}

/// A single scheduled activity for a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleActivity {
    /// The scheduled time (e.g., '10:00 AM - 11:30 AM').
    pub time_slot: String,
    /// The activity being performed (e.g., 'CS 401 Lecture', 'Review Chapter 5 notes').
    pub activity_description: String,
}

/// A daily or weekly schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Schedule {
    /// A descriptive title for the schedule.
    pub schedule_title: String,
    /// The specific day or date this schedule applies to.
    pub day: String,
    /// A list of scheduled activities for the day.
    pub activities: Vec<ScheduleActivity>,
}

/// A professional email draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EmailDraft {
    /// The recipient's name or email address.
    pub recipient: String,
    /// The subject line of the email.
    pub subject: String,
    /// The full body text of the email.
    pub body: String,
}

/// Structured learning progress extracted from a user's update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LearningProgressUpdate {
    /// Topics or sub-goals the user has just completed.
    #[serde(default)]
    pub completed_topics: Vec<String>,
    /// A short note summarizing the progress described by the user.
    #[serde(default)]
    pub progress_notes: String,
    /// Recommended next steps for the user.
    #[serde(default)]
    pub next_steps: String,
    /// Overall status of the learning goal (e.g., 'Just Started', 'In Progress', 'Almost Done').
    #[serde(default)]
    pub overall_status: String,
}

/// Generated Python test code and the output it should print.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestCaseGeneration {
    /// Python statements that exercise the user's code and print results.
    #[serde(default)]
    pub test_cases_code: String,
    /// The exact output the test statements should print when the code is correct.
    #[serde(default)]
    pub expected_outputs: String,
}

/// 结构化产物类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Quiz,
    Flashcards,
    ToDo,
    Schedule,
    Email,
}

impl ArtifactKind {
    /// 关键字分类（按 quiz → flashcard → to-do → schedule → email 顺序检查，大小写不敏感）
    pub fn classify(request: &str) -> Option<Self> {
        let r = request.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| r.contains(w));
        if has(&["quiz", "question"]) {
            Some(Self::Quiz)
        } else if has(&["flashcard", "term"]) {
            Some(Self::Flashcards)
        } else if has(&["to-do", "todo", "tasks"]) {
            Some(Self::ToDo)
        } else if has(&["schedule", "activities"]) {
            Some(Self::Schedule)
        } else if has(&["email", "draft"]) {
            Some(Self::Email)
        } else {
            None
        }
    }

    /// 文件名前缀
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Quiz => "quiz",
            Self::Flashcards => "flashcards",
            Self::ToDo => "todo",
            Self::Schedule => "schedule",
            Self::Email => "email",
        }
    }

    pub fn schema_name(self) -> &'static str {
        match self {
            Self::Quiz => "StructuredQuizModel",
            Self::Flashcards => "FlashcardDeckModel",
            Self::ToDo => "ToDoListModel",
            Self::Schedule => "ScheduleModel",
            Self::Email => "EmailDraftModel",
        }
    }

    /// 展示标题（"Quiz Generated!" 等）
    pub fn title(self) -> &'static str {
        match self {
            Self::Quiz => "Quiz",
            Self::Flashcards => "Flashcards",
            Self::ToDo => "Todo",
            Self::Schedule => "Schedule",
            Self::Email => "Email",
        }
    }

    pub fn schema(self) -> Value {
        match self {
            Self::Quiz => schema_value::<StructuredQuiz>(),
            Self::Flashcards => schema_value::<FlashcardDeck>(),
            Self::ToDo => schema_value::<ToDoList>(),
            Self::Schedule => schema_value::<Schedule>(),
            Self::Email => schema_value::<EmailDraft>(),
        }
    }

    /// 反序列化为对应类型做校验，返回规范化后的 JSON
    pub fn validate(self, value: Value) -> Result<Value, String> {
        match self {
            Self::Quiz => normalize::<StructuredQuiz>(value),
            Self::Flashcards => normalize::<FlashcardDeck>(value),
            Self::ToDo => normalize::<ToDoList>(value),
            Self::Schedule => normalize::<Schedule>(value),
            Self::Email => normalize::<EmailDraft>(value),
        }
    }
}

/// 类型的 JSON Schema（serde_json::Value）
pub fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null)
}

/// 按类型 T 校验并回写为 JSON
pub fn normalize<T: DeserializeOwned + Serialize>(value: Value) -> Result<Value, String> {
    let typed: T = serde_json::from_value(value).map_err(|e| e.to_string())?;
    serde_json::to_value(typed).map_err(|e| e.to_string())
}
