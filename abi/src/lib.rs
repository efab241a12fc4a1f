#![no_std]

pub mod addr;
pub mod cpu;
pub mod error;
pub mod fs;
pub mod syscall;
pub mod task;

pub use addr::{PhysAddr, VirtAddr};
pub use cpu::{CpuState, TaskEpilogue};
pub use error::ErrorCode;
pub use fs::{UserDirEntry, UserStat, ST_MODE_DIR, ST_MODE_FILE};
pub use task::{TaskId, TaskState, INVALID_TASK_ID, MAX_TASKS, TASK_NAME_MAX_LEN};
