//! The saved CPU register frame and the task-exit trampoline record.
//!
//! A [`CpuState`] is laid down by the interrupt/syscall entry stubs in the
//! exact order the assembly pushes registers, and consumed by `iretq` after
//! the general registers are popped back. Task creation builds a synthetic
//! frame at the top of the task stack so the first "return from interrupt"
//! drops straight into the task entry point.

/// GDT selector for kernel code (ring 0).
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
/// GDT selector for kernel data (ring 0).
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
/// GDT selector for user data, RPL 3.
pub const USER_DATA_SELECTOR: u16 = 0x18 | 3;
/// GDT selector for user code, RPL 3.
pub const USER_CODE_SELECTOR: u16 = 0x20 | 3;

/// RFLAGS with the interrupt-enable bit and the always-one bit set.
pub const RFLAGS_IF: u64 = 0x202;

/// Sits above the [`CpuState`] on a fresh task stack; holds the address the
/// task entry function returns to (the task-exit trampoline).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct TaskEpilogue {
    pub rip: u64,
}

/// Register snapshot in stub push order (general registers ascending toward
/// the hardware `iretq` frame).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuState {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    /// CPU-pushed or zero, depending on the vector.
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl CpuState {
    /// Build the initial frame for a fresh task.
    ///
    /// `arg1`/`arg2` land in RDI/RSI, the System V argument registers.
    pub fn initial(rip: u64, rsp: u64, arg1: u64, arg2: u64, user_space: bool) -> Self {
        let (cs, ss) = if user_space {
            (USER_CODE_SELECTOR as u64, USER_DATA_SELECTOR as u64)
        } else {
            (KERNEL_CODE_SELECTOR as u64, KERNEL_DATA_SELECTOR as u64)
        };
        Self {
            rdi: arg1,
            rsi: arg2,
            rip,
            cs,
            rflags: RFLAGS_IF,
            rsp,
            ss,
            ..Self::default()
        }
    }
}
