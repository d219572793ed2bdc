//! Agent 主循环
//!
//! Llm → (有工具调用) Tools → Llm → … → End。每个节点执行后写检查点；同一 session_id 的并发
//! 调用由会话锁串行化；LLM↔Tools 循环次数受 max_iterations 约束，达到上限时为未执行的请求补上
//! "skipped" 工具消息，保证历史结构完整，并以最后的 AI 内容结束本轮。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::AgentError;
use crate::memory::{coerce_messages, Checkpointer, Message, RawMessage};
use crate::react::answer::extract_answer;
use crate::react::model::{call_model, BoundModel};
use crate::react::node::Node;
use crate::tools::ToolExecutor;

/// 默认 LLM↔Tools 最大循环次数
pub const DEFAULT_MAX_ITERATIONS: usize = 10;
/// 达到循环上限时对未执行工具请求的占位输出
pub const ITERATION_LIMIT_SKIP: &str = "skipped: iteration limit reached";

/// 一轮执行结果：最终回答、本轮新增消息、LLM 调用次数
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub answer: String,
    pub messages: Vec<Message>,
    pub iterations: usize,
    pub hit_iteration_limit: bool,
}

/// Agent 上下文：模型、工具执行器、检查点与 system prompt；由 HTTP 层以 Arc 共享
pub struct Agent {
    model: Option<BoundModel>,
    executor: ToolExecutor,
    checkpointer: Arc<dyn Checkpointer>,
    system_prompt: String,
    max_iterations: usize,
    session_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Agent {
    pub fn new(
        model: Option<BoundModel>,
        executor: ToolExecutor,
        checkpointer: Arc<dyn Checkpointer>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model,
            executor,
            checkpointer,
            system_prompt: system_prompt.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    pub fn model(&self) -> Option<&BoundModel> {
        self.model.as_ref()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn memory_enabled(&self) -> bool {
        self.checkpointer.enabled()
    }

    /// 单条用户问题的便捷入口
    pub async fn ask(&self, session_id: &str, query: &str) -> Result<String, AgentError> {
        let turn = self
            .invoke(session_id, vec![RawMessage::from(query)])
            .await?;
        Ok(turn.answer)
    }

    /// LLM 步骤：对当前状态调用模型，返回一条 AI 消息
    pub async fn llm_step(&self, state: &[Message]) -> Result<Message, AgentError> {
        call_model(self.model.as_ref(), state, &self.system_prompt).await
    }

    /// Tools 步骤：执行最后一条 AI 消息的全部请求；没有请求时返回空列表
    pub async fn tool_step(&self, state: &[Message]) -> Vec<Message> {
        match state.last() {
            Some(last) if last.is_ai() => self.executor.dispatch(last.tool_calls()).await,
            _ => Vec::new(),
        }
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.session_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// 本轮结束后回收会话锁：仅剩表内与当前持有者两份引用时才移除，仍有等待者则保留
    fn release_session(&self, session_id: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = match self.session_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let idle = locks
            .get(session_id)
            .is_some_and(|held| Arc::ptr_eq(held, lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    fn session_lock_count(&self) -> usize {
        match self.session_locks.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// 检查点读写是同步 I/O（SQLite），放到阻塞线程池执行
    async fn load(&self, session_id: &str) -> Vec<Message> {
        let checkpointer = Arc::clone(&self.checkpointer);
        let id = session_id.to_string();
        match tokio::task::spawn_blocking(move || checkpointer.load(&id)).await {
            Ok(Ok(history)) => history,
            Ok(Err(e)) => {
                tracing::warn!(session_id, error = %e, "checkpoint load failed; starting a fresh conversation");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "checkpoint load task failed; starting a fresh conversation");
                Vec::new()
            }
        }
    }

    async fn checkpoint(&self, session_id: &str, state: &[Message]) {
        let checkpointer = Arc::clone(&self.checkpointer);
        let id = session_id.to_string();
        let snapshot = state.to_vec();
        match tokio::task::spawn_blocking(move || checkpointer.save(&id, &snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(session_id, error = %e, "checkpoint save failed"),
            Err(e) => tracing::warn!(session_id, error = %e, "checkpoint save task failed"),
        }
    }

    /// 执行一轮：加载会话 → 追加归一化输入 → 运行状态机 → 提取回答。
    /// 同一 session_id 的调用串行执行
    pub async fn invoke(
        &self,
        session_id: &str,
        input: Vec<RawMessage>,
    ) -> Result<TurnResult, AgentError> {
        let lock = self.session_lock(session_id);
        let result = {
            let _guard = lock.lock().await;
            self.run_turn(session_id, input).await
        };
        self.release_session(session_id, &lock);
        result
    }

    async fn run_turn(
        &self,
        session_id: &str,
        input: Vec<RawMessage>,
    ) -> Result<TurnResult, AgentError> {
        let mut state = self.load(session_id).await;
        let turn_start = state.len();
        state.extend(coerce_messages(&input));
        if state.is_empty() {
            return Err(AgentError::EmptyConversation);
        }
        tracing::info!(session_id, history = turn_start, "agent turn started");

        let mut node = Node::Llm;
        let mut iterations = 0;
        let mut hit_limit = false;
        while node != Node::End {
            match node {
                Node::Llm => {
                    let reply = self.llm_step(&state).await?;
                    iterations += 1;
                    tracing::debug!(
                        session_id,
                        iteration = iterations,
                        tool_calls = reply.tool_calls().len(),
                        "llm step"
                    );
                    state.push(reply);
                    node = node.next(&state);
                    if node == Node::Tools && iterations >= self.max_iterations {
                        tracing::warn!(
                            session_id,
                            max_iterations = self.max_iterations,
                            "iteration limit reached; skipping pending tool calls"
                        );
                        let skipped = skipped_tool_messages(&state);
                        state.extend(skipped);
                        hit_limit = true;
                        node = Node::End;
                    }
                }
                Node::Tools => {
                    let results = self.tool_step(&state).await;
                    state.extend(results);
                    node = node.next(&state);
                }
                Node::End => {}
            }
            self.checkpoint(session_id, &state).await;
        }

        let turn: Vec<Message> = state[turn_start..].to_vec();
        let answer = extract_answer(&turn);
        tracing::info!(session_id, iterations, hit_limit, "agent turn finished");
        Ok(TurnResult {
            answer,
            messages: turn,
            iterations,
            hit_iteration_limit: hit_limit,
        })
    }
}

fn skipped_tool_messages(state: &[Message]) -> Vec<Message> {
    state
        .last()
        .map(|last| {
            last.tool_calls()
                .iter()
                .map(|call| Message::tool(ITERATION_LIMIT_SKIP, call.id.clone(), call.name.clone()))
                .collect()
        })
        .unwrap_or_default()
}
