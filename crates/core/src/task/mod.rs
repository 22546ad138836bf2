//! Tasks: the durable unit of execution.

mod identity;
mod log;
mod types;

pub use identity::{canonical_identity, normalize_path, IdentityHint};
pub use log::{LogEvent, TaskLog, ENGINE_PREFIX};
pub use types::{FailureKind, Task, TaskFailure, TaskId, TaskState, TriggerOrigin, WorkItem};
