//! 产物持久化
//!
//! 工具生成的 JSON 产物写在 artifacts 根目录下：
//! `generated_outputs/`、`learning_progress/`、`validation_reports/` 中的时间戳文件，
//! 以及 `learning_state.json` 等固定文件。父目录不存在时自动创建。

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// 时间戳文件名格式：YYYYmmdd_HHMMSS
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const MAX_NAME_ATTEMPTS: usize = 1000;

pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// artifacts 根目录：`$HOME/Downloads/StudyAssistant`，无 HOME 时退回 `./StudyAssistant`
pub fn default_artifacts_root() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("Downloads").join("StudyAssistant"))
        .unwrap_or_else(|| PathBuf::from("StudyAssistant"))
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 写 `{root}/{subdir}/{prefix}_{ts}.json`，返回文件路径。
    /// 同一秒内重名时依次尝试 `{prefix}_{ts}_1.json`、`_2`…，已有文件不会被覆盖
    pub fn write_timestamped<T: Serialize>(
        &self,
        subdir: &str,
        prefix: &str,
        value: &T,
    ) -> anyhow::Result<PathBuf> {
        let dir = self.root.join(subdir);
        std::fs::create_dir_all(&dir)?;
        let body = serde_json::to_string_pretty(value)?;
        let ts = timestamp();
        for n in 0..MAX_NAME_ATTEMPTS {
            let name = if n == 0 {
                format!("{}_{}.json", prefix, ts)
            } else {
                format!("{}_{}_{}.json", prefix, ts, n)
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(body.as_bytes())?;
                    tracing::debug!(path = %path.display(), "artifact written");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        anyhow::bail!(
            "no free artifact name for {}_{} in {}",
            prefix,
            ts,
            dir.display()
        )
    }

    /// 写固定相对路径（覆盖）
    pub fn write_fixed<T: Serialize>(&self, relative: &str, value: &T) -> anyhow::Result<PathBuf> {
        let path = self.root.join(relative);
        write_pretty(&path, value)?;
        Ok(path)
    }

    /// 读固定相对路径；文件不存在时返回 None
    pub fn read_json<T: DeserializeOwned>(&self, relative: &str) -> anyhow::Result<Option<T>> {
        let path = self.root.join(relative);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }
}

fn write_pretty<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    tracing::debug!(path = %path.display(), "artifact written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamped_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = store
            .write_timestamped("generated_outputs", "quiz", &json!({"quiz_title": "T"}))
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("quiz_"));
        assert!(name.ends_with(".json"));
        // quiz_YYYYmmdd_HHMMSS.json
        assert_eq!(name.len(), "quiz_".len() + 15 + ".json".len());
        assert!(path.parent().unwrap().ends_with("generated_outputs"));
    }

    #[test]
    fn test_same_second_writes_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let first = store
            .write_timestamped("generated_outputs", "quiz", &json!({"n": 1}))
            .unwrap();
        let second = store
            .write_timestamped("generated_outputs", "quiz", &json!({"n": 2}))
            .unwrap();
        assert_ne!(first, second);

        let files = std::fs::read_dir(dir.path().join("generated_outputs"))
            .unwrap()
            .count();
        assert_eq!(files, 2);

        let a: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&first).unwrap()).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&second).unwrap()).unwrap();
        assert_eq!(a["n"], 1);
        assert_eq!(b["n"], 2);
    }

    #[test]
    fn test_fixed_round_trip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store
            .read_json::<serde_json::Value>("learning_state.json")
            .unwrap()
            .is_none());
        store
            .write_fixed("learning_state.json", &json!({"original_goal": "g"}))
            .unwrap();
        let v: serde_json::Value = store.read_json("learning_state.json").unwrap().unwrap();
        assert_eq!(v["original_goal"], "g");
    }
}
