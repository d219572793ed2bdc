//! python_interpreter 工具：在沙箱中执行模型给出的 Python 代码

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{PythonSandbox, Tool};

pub struct PythonInterpreterTool {
    sandbox: PythonSandbox,
}

impl PythonInterpreterTool {
    pub fn new(sandbox: PythonSandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for PythonInterpreterTool {
    fn name(&self) -> &str {
        "python_interpreter"
    }

    fn description(&self) -> &str {
        "Executes single-line or multi-line Python code and returns what it prints. \
The input MUST be complete, valid, runnable Python code (e.g. 'print(15 * 7)'), never a natural language question. \
Use it for precise calculations, running small self-contained test cases, checking code snippets for errors, \
and manipulating small data structures. Do not use it for general knowledge questions or for searching course documents."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Complete Python source code to execute; use print() to produce output"
                }
            },
            "required": ["code"]
        })
    }

    fn argument_keys(&self) -> &[&'static str] {
        &["code"]
    }

    async fn execute(&self, input: &str) -> Result<String, String> {
        Ok(self.sandbox.run_to_text(input).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::sandbox::python_available;

    #[tokio::test]
    async fn test_runs_code() {
        if !python_available() {
            return;
        }
        let tool = PythonInterpreterTool::new(PythonSandbox::default());
        let out = tool.execute("print(sum(range(5)))").await.unwrap();
        assert_eq!(out.trim(), "10");
    }
}
