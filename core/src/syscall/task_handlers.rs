//! Task-lifecycle and clock syscall handlers.

use phobos_abi::cpu::CpuState;
use phobos_abi::error::ErrorCode;
use phobos_abi::syscall::CLOCK_MONOTONIC;
use phobos_lib::klog_debug;

use super::dispatch::SyscallDisposition;
use super::user;
use crate::exec;
use crate::scheduler::manager::{
    current_group, current_cwd, kill_current_task, kill_current_task_group, task_add,
    task_current_id, task_sleep_current_ms, task_wait_for,
};
use crate::scheduler::task::Task;
use crate::time::uptime_ms;

/// Sleep rounded up to milliseconds; zero nanoseconds is a yield.
pub fn sys_nanosleep(nanos: u64, frame: *mut CpuState) -> SyscallDisposition {
    let ms = nanos.div_ceil(1_000_000);
    if ms == 0 {
        return SyscallDisposition::Yield;
    }
    if task_sleep_current_ms(ms) {
        // The result lands in the saved frame now; the task resumes past
        // the trap once the timer re-queues it.
        unsafe { (*frame).rax = 0 };
        SyscallDisposition::Block { restart: false }
    } else {
        SyscallDisposition::Return(0)
    }
}

pub fn sys_exit(code: u64) -> SyscallDisposition {
    klog_debug!("task {} exit({})", task_current_id(), code);
    SyscallDisposition::Terminated(kill_current_task())
}

pub fn sys_exit_group(code: u64) -> SyscallDisposition {
    klog_debug!("task {} exit_group({})", task_current_id(), code);
    SyscallDisposition::Terminated(kill_current_task_group())
}

/// Block until the target terminates. The syscall restarts on wakeup and
/// finds the target gone, which is the success return.
pub fn sys_task_wait(target: u64) -> SyscallDisposition {
    if task_wait_for(target as u32) {
        SyscallDisposition::Block { restart: true }
    } else {
        SyscallDisposition::Return(0)
    }
}

/// Spawn a kernel-mode task sharing the caller's address space.
pub fn sys_task_lightweight_run(entry: u64, arg: u64, name_ptr: u64) -> SyscallDisposition {
    let name = match user::user_cstr(name_ptr) {
        Ok(n) => n,
        Err(ec) => return SyscallDisposition::Return(ec.as_syscall_return()),
    };
    let Some(group) = current_group() else {
        return SyscallDisposition::Return(ErrorCode::EcPerm.as_syscall_return());
    };
    let Some(task) = Task::make_kernel_task(entry, &name, arg, 0, group, current_cwd()) else {
        return SyscallDisposition::Return(ErrorCode::EcNomem.as_syscall_return());
    };
    match task_add(task) {
        Some(tid) => SyscallDisposition::Return(tid as i64),
        None => SyscallDisposition::Return(ErrorCode::EcPerm.as_syscall_return()),
    }
}

/// Load and launch a statically linked ELF64; returns the new task id.
pub fn sys_elf_run(path_ptr: u64, argv_ptr: u64) -> SyscallDisposition {
    let result = user::user_cstr(path_ptr).and_then(|raw_path| {
        let path = phobos_fs::vfs::open_table::vfs_absolute(&current_cwd(), &raw_path);
        let args = user::user_argv(argv_ptr)?;
        exec::elf_run(&path, args).map(|tid| tid as u64)
    });
    SyscallDisposition::Return(phobos_abi::error::syscall_result_to_i64(result))
}

#[repr(C)]
#[derive(Clone, Copy)]
struct UserTimespec {
    tv_sec: u64,
    tv_nsec: u64,
}

pub fn sys_clock_gettime(clock_id: u64, out_ptr: u64) -> SyscallDisposition {
    if clock_id != CLOCK_MONOTONIC {
        return SyscallDisposition::Return(ErrorCode::EcInval.as_syscall_return());
    }
    let ms = uptime_ms();
    let ts = UserTimespec {
        tv_sec: ms / 1000,
        tv_nsec: (ms % 1000) * 1_000_000,
    };
    match user::write_user(out_ptr, &ts) {
        Ok(()) => SyscallDisposition::Return(0),
        Err(ec) => SyscallDisposition::Return(ec.as_syscall_return()),
    }
}
