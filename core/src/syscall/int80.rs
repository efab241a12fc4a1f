//! The legacy `int 0x80` trap gate: the reduced subset kernel tasks use to
//! exit, exit their group, and yield/sleep. Numbers follow the classic
//! 32-bit Linux table; the argument travels in RDI.

use phobos_abi::cpu::CpuState;
use phobos_abi::syscall::Int80SysCallNumber;
use phobos_lib::klog_warn;

use super::dispatch::SyscallDisposition;
use super::task_handlers;
use crate::scheduler::manager::schedule;

#[unsafe(no_mangle)]
pub extern "C" fn int80_router(frame: *mut CpuState) -> *mut CpuState {
    let (sysno, arg1) = unsafe { ((*frame).rax, (*frame).rdi) };

    let disposition = match Int80SysCallNumber::from_raw(sysno) {
        Some(Int80SysCallNumber::Exit) => task_handlers::sys_exit(arg1),
        Some(Int80SysCallNumber::ExitGroup) => task_handlers::sys_exit_group(arg1),
        Some(Int80SysCallNumber::Nanosleep) => task_handlers::sys_nanosleep(arg1, frame),
        None => {
            klog_warn!("int80: unknown number {}", sysno);
            SyscallDisposition::Return(
                phobos_abi::error::ErrorCode::EcInval.as_syscall_return(),
            )
        }
    };

    match disposition {
        SyscallDisposition::Return(value) => {
            unsafe { (*frame).rax = value as u64 };
            frame
        }
        SyscallDisposition::Block { restart } => {
            if restart {
                unsafe { (*frame).rip -= 2 };
            }
            schedule(frame)
        }
        SyscallDisposition::Yield => {
            unsafe { (*frame).rax = 0 };
            schedule(frame)
        }
        SyscallDisposition::Terminated(next) => next,
    }
}

/// Kernel-context trap into `exit`; the epilogue of every kernel task
/// lands here via the task-finished trampoline.
pub fn exit_current_via_int80() -> ! {
    #[cfg(target_os = "none")]
    unsafe {
        core::arch::asm!(
            "int 0x80",
            in("rax") Int80SysCallNumber::Exit as u64,
            in("rdi") 0u64,
            options(noreturn)
        );
    }
    #[cfg(not(target_os = "none"))]
    unreachable!("int80 exit on host");
}

pub fn exit_group_current_via_int80() -> ! {
    #[cfg(target_os = "none")]
    unsafe {
        core::arch::asm!(
            "int 0x80",
            in("rax") Int80SysCallNumber::ExitGroup as u64,
            in("rdi") 0u64,
            options(noreturn)
        );
    }
    #[cfg(not(target_os = "none"))]
    unreachable!("int80 exit_group on host");
}

/// Zero-duration sleep: give the CPU away for one round.
pub fn yield_via_int80() {
    #[cfg(target_os = "none")]
    unsafe {
        core::arch::asm!(
            "int 0x80",
            in("rax") Int80SysCallNumber::Nanosleep as u64,
            in("rdi") 0u64,
            lateout("rax") _,
        );
    }
}
