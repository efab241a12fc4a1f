//! Task-kernel constants and state shared across crates.

pub type TaskId = u32;

/// Task ids are forever-increasing and start at 1; 0 never names a task.
pub const INVALID_TASK_ID: TaskId = 0;

/// Upper bound on simultaneously live tasks.
pub const MAX_TASKS: usize = 32;

pub const TASK_NAME_MAX_LEN: usize = 32;

/// Default per-task stack size, kernel and user alike.
pub const TASK_DEFAULT_STACK_SIZE: u64 = 2 * 4096;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    #[default]
    Running = 0,
    Blocked = 1,
}
