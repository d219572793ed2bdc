//! 认知层：状态机节点、模型绑定、Agent 主循环、回答提取

pub mod answer;
pub mod loop_;
pub mod model;
pub mod node;

pub use answer::extract_answer;
pub use loop_::{Agent, TurnResult, DEFAULT_MAX_ITERATIONS, ITERATION_LIMIT_SKIP};
pub use model::{bind_tools, call_model, BoundModel};
pub use node::{should_continue, Node};
