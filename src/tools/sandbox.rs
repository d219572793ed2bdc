//! Python 沙箱：`python3 -c <code>` 子进程，墙钟超时，超时即杀进程（kill_on_drop）
//!
//! 结果统一渲染为文本：成功取 stdout（为空则 stderr）；非零退出、超时、启动失败各有固定前缀。

use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// 沙箱执行失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("ERROR: Python execution timed out")]
    Timeout,

    #[error("ERROR: Exception during python execution: {0}")]
    Spawn(String),

    #[error("ERROR (exit {code}): {stdout}\n{stderr}")]
    NonZeroExit {
        code: i32,
        stdout: String,
        stderr: String,
    },
}

/// Python 子进程执行器
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    interpreter: String,
    timeout: Duration,
}

impl PythonSandbox {
    pub fn new(interpreter: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 执行代码；成功返回 stdout（stdout 为空时返回 stderr）
    pub async fn run(&self, code: &str) -> Result<String, SandboxError> {
        tracing::debug!(interpreter = %self.interpreter, code_len = code.len(), "python sandbox run");
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-c").arg(code).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| SandboxError::Timeout)?
            .map_err(|e| SandboxError::Spawn(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(SandboxError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stdout,
                stderr,
            });
        }
        Ok(if stdout.is_empty() { stderr } else { stdout })
    }

    /// 执行并把任何失败渲染为文本
    pub async fn run_to_text(&self, code: &str) -> String {
        match self.run(code).await {
            Ok(out) => out,
            Err(e) => {
                tracing::debug!(error = %e, "python sandbox failure");
                e.to_string()
            }
        }
    }
}

impl Default for PythonSandbox {
    fn default() -> Self {
        Self::new("python3", 5)
    }
}

/// 测试辅助：本机是否有可用的 python3
#[cfg(test)]
pub(crate) fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stdout_returned() {
        if !python_available() {
            return;
        }
        let out = PythonSandbox::default().run_to_text("print(15 * 7)").await;
        assert_eq!(out.trim(), "105");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_rendered() {
        if !python_available() {
            return;
        }
        let out = PythonSandbox::default()
            .run_to_text("print('partial'); raise SystemExit(3)")
            .await;
        assert!(out.starts_with("ERROR (exit 3): partial"));
    }

    #[tokio::test]
    async fn test_unhandled_exception_includes_traceback() {
        if !python_available() {
            return;
        }
        let out = PythonSandbox::default().run_to_text("1/0").await;
        assert!(out.starts_with("ERROR (exit 1)"));
        assert!(out.contains("Traceback"));
        assert!(out.contains("ZeroDivisionError"));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        if !python_available() {
            return;
        }
        let sandbox = PythonSandbox::new("python3", 1);
        let out = sandbox.run_to_text("while True:\n    pass").await;
        assert_eq!(out, "ERROR: Python execution timed out");
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_spawn_error() {
        let sandbox = PythonSandbox::new("definitely-not-a-python-binary", 1);
        let err = sandbox.run("print(1)").await.unwrap_err();
        assert!(matches!(err, SandboxError::Spawn(_)));
        assert!(err
            .to_string()
            .starts_with("ERROR: Exception during python execution:"));
    }
}
