//! The syscall dispatcher: RAX selects the operation, RDI/RSI/RDX/R10/R8/R9
//! carry the parameters, RAX returns the result (negative values encode the
//! error codes).

use phobos_abi::cpu::CpuState;
use phobos_abi::syscall::SysCallNumber;
use phobos_lib::klog_warn;

use super::{fs_handlers, task_handlers, vga_handlers};
use crate::scheduler::manager::schedule;

/// What a handler decided; the router folds it into the outgoing frame.
pub enum SyscallDisposition {
    /// Plain result into RAX, caller resumes.
    Return(i64),
    /// Caller was taken off the run list. With `restart` the syscall
    /// instruction re-executes on wakeup (the blocking-read pattern);
    /// without it the handler has already placed the result in the frame.
    Block { restart: bool },
    /// Reschedule without blocking (a zero-duration sleep).
    Yield,
    /// The caller is gone; resume the frame the terminator elected.
    Terminated(*mut CpuState),
}

pub struct SyscallArgs {
    pub arg1: u64,
    pub arg2: u64,
    pub arg3: u64,
    pub arg4: u64,
    pub arg5: u64,
    pub arg6: u64,
}

impl SyscallArgs {
    fn from_frame(frame: &CpuState) -> Self {
        Self {
            arg1: frame.rdi,
            arg2: frame.rsi,
            arg3: frame.rdx,
            arg4: frame.r10,
            arg5: frame.r8,
            arg6: frame.r9,
        }
    }
}

/// Both the `syscall` and `int 0x80` instructions are two bytes; rewinding
/// RIP by that much re-executes the trap after a wakeup.
const TRAP_INSTRUCTION_LEN: u64 = 2;

fn apply(disposition: SyscallDisposition, frame: *mut CpuState) -> *mut CpuState {
    match disposition {
        SyscallDisposition::Return(value) => {
            unsafe { (*frame).rax = value as u64 };
            frame
        }
        SyscallDisposition::Block { restart } => {
            if restart {
                unsafe { (*frame).rip -= TRAP_INSTRUCTION_LEN };
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

#[unsafe(no_mangle)]
pub extern "C" fn syscall_router(frame: *mut CpuState) -> *mut CpuState {
    let (sysno, args) = unsafe { ((*frame).rax, SyscallArgs::from_frame(&*frame)) };

    let disposition = match SysCallNumber::from_raw(sysno) {
        Some(number) => dispatch(number, &args, frame),
        None => {
            klog_warn!("syscall: unknown number {}", sysno);
            SyscallDisposition::Return(phobos_abi::error::ErrorCode::EcInval.as_syscall_return())
        }
    };
    apply(disposition, frame)
}

fn dispatch(number: SysCallNumber, args: &SyscallArgs, frame: *mut CpuState) -> SyscallDisposition {
    match number {
        SysCallNumber::FileRead => fs_handlers::sys_read(args.arg1, args.arg2, args.arg3),
        SysCallNumber::FileWrite => fs_handlers::sys_write(args.arg1, args.arg2, args.arg3),
        SysCallNumber::FileOpen => fs_handlers::sys_open(args.arg1, args.arg2, args.arg3),
        SysCallNumber::FileClose => fs_handlers::sys_close(args.arg1),
        SysCallNumber::FileStat => fs_handlers::sys_stat(args.arg1, args.arg2),
        SysCallNumber::FileSeek => fs_handlers::sys_seek(args.arg1, args.arg2, args.arg3),
        SysCallNumber::FileTruncate => fs_handlers::sys_truncate(args.arg1, args.arg2),
        SysCallNumber::FileRename => fs_handlers::sys_rename(args.arg1, args.arg2),
        SysCallNumber::FileMkdir => fs_handlers::sys_mkdir(args.arg1),
        SysCallNumber::FileRmdir => fs_handlers::sys_unlink(args.arg1),
        SysCallNumber::FileCreat => fs_handlers::sys_creat(args.arg1),
        SysCallNumber::FileUnlink => fs_handlers::sys_unlink(args.arg1),
        SysCallNumber::FileEnumerate => {
            fs_handlers::sys_enumerate(args.arg1, args.arg2, args.arg3)
        }
        SysCallNumber::GetCwd => fs_handlers::sys_get_cwd(args.arg1, args.arg2),
        SysCallNumber::Chdir => fs_handlers::sys_chdir(args.arg1),

        SysCallNumber::Nanosleep => task_handlers::sys_nanosleep(args.arg1, frame),
        SysCallNumber::Exit => task_handlers::sys_exit(args.arg1),
        SysCallNumber::ExitGroup => task_handlers::sys_exit_group(args.arg1),
        SysCallNumber::TaskWait => task_handlers::sys_task_wait(args.arg1),
        SysCallNumber::TaskLightweightRun => {
            task_handlers::sys_task_lightweight_run(args.arg1, args.arg2, args.arg3)
        }
        SysCallNumber::ElfRun => task_handlers::sys_elf_run(args.arg1, args.arg2),
        SysCallNumber::ClockGettime => task_handlers::sys_clock_gettime(args.arg1, args.arg2),

        SysCallNumber::VgaCursorSetVisible => vga_handlers::sys_cursor_set_visible(args.arg1),
        SysCallNumber::VgaCursorSetPos => vga_handlers::sys_cursor_set_pos(args.arg1, args.arg2),
        SysCallNumber::VgaSetCharAt => {
            vga_handlers::sys_set_char_at(args.arg1, args.arg2, args.arg3)
        }
        SysCallNumber::VgaFlushCharBuffer => vga_handlers::sys_flush_char_buffer(args.arg1),
        SysCallNumber::VgaGetWidthHeight => {
            vga_handlers::sys_get_width_height(args.arg1, args.arg2)
        }
    }
}
