#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod exec;
pub mod interrupts;
pub mod scheduler;
pub mod syscall;
pub mod tests;
pub mod time;

pub use scheduler::manager::{
    task_add_kernel_task, task_current_id, task_exit_group_current, task_manager_init,
    task_sleep_current_ms, task_wait_for,
};
pub use time::{timer_tick, uptime_ms};
