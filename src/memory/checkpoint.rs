//! 会话检查点
//!
//! 按 session_id 保存/加载完整对话状态，同一 session_id 的后续调用从上次的消息序列继续。
//! 三种后端：SqliteCheckpointer（chat_memory.db）、InMemoryCheckpointer（进程内）、
//! NoopCheckpointer（记忆关闭，仅在单次调用内工作）。

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::Message;

/// 检查点 trait：load 不存在时返回空序列
pub trait Checkpointer: Send + Sync {
    fn load(&self, session_id: &str) -> anyhow::Result<Vec<Message>>;

    fn save(&self, session_id: &str, messages: &[Message]) -> anyhow::Result<()>;

    /// 是否真正持久化（Noop 返回 false）
    fn enabled(&self) -> bool {
        true
    }
}

/// 记忆关闭：load 永远为空，save 丢弃
#[derive(Debug, Clone, Default)]
pub struct NoopCheckpointer;

impl Checkpointer for NoopCheckpointer {
    fn load(&self, _session_id: &str) -> anyhow::Result<Vec<Message>> {
        Ok(Vec::new())
    }

    fn save(&self, _session_id: &str, _messages: &[Message]) -> anyhow::Result<()> {
        Ok(())
    }

    fn enabled(&self) -> bool {
        false
    }
}

/// 进程内检查点（测试与无磁盘部署）
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointer {
    sessions: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Checkpointer for InMemoryCheckpointer {
    fn load(&self, session_id: &str) -> anyhow::Result<Vec<Message>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| anyhow::anyhow!("checkpoint lock poisoned"))?;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    fn save(&self, session_id: &str, messages: &[Message]) -> anyhow::Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow::anyhow!("checkpoint lock poisoned"))?;
        sessions.insert(session_id.to_string(), messages.to_vec());
        Ok(())
    }
}

/// SQLite 检查点：每个会话一行，messages 列为 JSON 数组
pub struct SqliteCheckpointer {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointer {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open checkpoint db {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT PRIMARY KEY,
                messages   TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Checkpointer for SqliteCheckpointer {
    fn load(&self, session_id: &str) -> anyhow::Result<Vec<Message>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint connection poisoned"))?;
        let data: Option<String> = conn
            .query_row(
                "SELECT messages FROM checkpoints WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, session_id: &str, messages: &[Message]) -> anyhow::Result<()> {
        let json = serde_json::to_string(messages)?;
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint connection poisoned"))?;
        conn.execute(
            "INSERT INTO checkpoints (session_id, messages, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET messages = excluded.messages, updated_at = excluded.updated_at",
            params![session_id, json, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// 按配置打开检查点；SQLite 打不开时降级为 Noop（记忆关闭，不视为致命错误）
pub fn open_checkpointer(path: Option<&Path>) -> Arc<dyn Checkpointer> {
    let Some(path) = path else {
        tracing::info!("no checkpoint path configured; conversation memory disabled");
        return Arc::new(NoopCheckpointer);
    };
    match SqliteCheckpointer::open(path) {
        Ok(cp) => {
            tracing::info!(path = %path.display(), "sqlite conversation memory enabled");
            Arc::new(cp)
        }
        Err(e) => {
            tracing::warn!(error = %e, "sqlite checkpointer unavailable; memory disabled");
            Arc::new(NoopCheckpointer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCallRequest;

    #[test]
    fn test_sqlite_round_trip_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let cp = SqliteCheckpointer::open(dir.path().join("chat_memory.db")).unwrap();
        assert!(cp.load("s1").unwrap().is_empty());

        let msgs = vec![
            Message::human("q"),
            Message::ai_with_tool_calls(
                "",
                vec![ToolCallRequest::new("learning_tracker", serde_json::json!("goal"))],
            ),
        ];
        cp.save("s1", &msgs).unwrap();
        assert_eq!(cp.load("s1").unwrap(), msgs);

        cp.save("s1", &msgs[..1]).unwrap();
        assert_eq!(cp.load("s1").unwrap().len(), 1);
        assert!(cp.load("s2").unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mem.db");
        SqliteCheckpointer::open(&path)
            .unwrap()
            .save("s", &[Message::human("persisted")])
            .unwrap();
        let reopened = SqliteCheckpointer::open(&path).unwrap();
        assert_eq!(reopened.load("s").unwrap(), vec![Message::human("persisted")]);
    }

    #[test]
    fn test_noop_forgets() {
        let cp = NoopCheckpointer;
        cp.save("s", &[Message::human("x")]).unwrap();
        assert!(cp.load("s").unwrap().is_empty());
        assert!(!cp.enabled());
    }

    #[test]
    fn test_open_checkpointer_without_path_is_noop() {
        assert!(!open_checkpointer(None).enabled());
    }
}
