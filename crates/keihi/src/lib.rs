pub mod engine;
pub mod error;
pub mod extract;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod ui;

pub use crate::engine::{ExpenseAgent, InteractionTask, TaskState, TurnRequest, TurnUpdate};
pub use crate::error::{AgentError, AgentResult};
pub use crate::storage::{ClaimRecord, ClaimStore, ExpenseDraft};
