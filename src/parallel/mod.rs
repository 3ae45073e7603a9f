//! Parallel batch execution with pause, resume and stop

pub mod control;
pub mod progress;
pub mod scheduler;
pub mod worker;

pub use control::{BatchControl, GateDecision, RunState};
pub use progress::*;
pub use scheduler::{BatchHandle, BatchScheduler, ReorderBuffer};
pub use worker::{RetryPolicy, RetryingWorker};
