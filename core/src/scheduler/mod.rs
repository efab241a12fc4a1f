//! The task kernel: task objects, the round-robin run list, wait queues,
//! task groups, and the context-switch plumbing.

pub mod manager;
pub mod run_list;
pub mod task;

pub use manager::{schedule, task_manager_init};
pub use task::{Task, TaskGroupData};
