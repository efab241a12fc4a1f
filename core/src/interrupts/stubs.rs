//! Interrupt entry stubs.
//!
//! Every vector funnels through the same shape: complete the hardware
//! frame into a full `CpuState` (error code slot included), hand its
//! address to a Rust router, then resume whatever frame the router
//! returns. That is how a context switch happens: the router hands back
//! a different task's saved frame and `iretq` does the rest.

#[cfg(target_os = "none")]
core::arch::global_asm!(
    r#"
.macro PUSH_GP_REGS
    push rax
    push rbx
    push rcx
    push rdx
    push rsi
    push rdi
    push rbp
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15
.endm

.macro POP_GP_REGS
    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rbp
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    pop rbx
    pop rax
.endm

// Vector with no CPU-pushed error code. The extra `sub rsp, 8` keeps the
// stack 16-aligned at the call; the return path reloads RSP from RAX, so
// the pad never needs undoing.
.macro ISR_NO_ERR name, router
.global \name
\name:
    push 0
    PUSH_GP_REGS
    mov rdi, rsp
    sub rsp, 8
    call \router
    mov rsp, rax
    POP_GP_REGS
    add rsp, 8
    iretq
.endm

// Exception vector where the CPU pushed an error code.
.macro ISR_WITH_ERR name, router
.global \name
\name:
    PUSH_GP_REGS
    mov rdi, rsp
    sub rsp, 8
    call \router
    mov rsp, rax
    POP_GP_REGS
    add rsp, 8
    iretq
.endm

// CPU exception forwarded with its vector number.
.macro EXC_NO_ERR name, vec
.global \name
\name:
    push 0
    PUSH_GP_REGS
    mov rdi, rsp
    mov rsi, \vec
    sub rsp, 8
    call exception_router
    mov rsp, rax
    POP_GP_REGS
    add rsp, 8
    iretq
.endm

.macro EXC_WITH_ERR name, vec
.global \name
\name:
    PUSH_GP_REGS
    mov rdi, rsp
    mov rsi, \vec
    sub rsp, 8
    call exception_router
    mov rsp, rax
    POP_GP_REGS
    add rsp, 8
    iretq
.endm

ISR_NO_ERR   isr_timer,        timer_interrupt_router
ISR_NO_ERR   isr_keyboard,     keyboard_interrupt_router
ISR_NO_ERR   isr_mouse,        mouse_interrupt_router
ISR_NO_ERR   isr_int80,        int80_router
ISR_NO_ERR   isr_spurious,     spurious_interrupt_router
ISR_WITH_ERR isr_page_fault,   page_fault_router

EXC_NO_ERR   exc_divide_error,    0
EXC_NO_ERR   exc_invalid_opcode,  6
EXC_WITH_ERR exc_double_fault,    8
EXC_WITH_ERR exc_segment_missing, 11
EXC_WITH_ERR exc_stack_fault,     12
EXC_WITH_ERR exc_general_protection, 13
EXC_NO_ERR   exc_fpu_error,       16
EXC_WITH_ERR exc_alignment_check, 17

// Entry for the `syscall` instruction: no frame is pushed by hardware, so
// build one by hand on the per-task kernel stack, shaped exactly like an
// interrupt frame (rcx carries the user rip, r11 the user rflags).
.global syscall_entry
syscall_entry:
    mov [rip + SYSCALL_USER_RSP_SCRATCH], rsp
    mov rsp, [rip + CURRENT_KERNEL_STACK_TOP]
    push 0x1B                                   // user ss
    push qword ptr [rip + SYSCALL_USER_RSP_SCRATCH] // user rsp
    push r11                                    // user rflags
    push 0x23                                   // user cs
    push rcx                                    // user rip
    push 0                                      // error code slot
    PUSH_GP_REGS
    mov rdi, rsp
    sub rsp, 8
    call syscall_router
    mov rsp, rax
    POP_GP_REGS
    add rsp, 8
    iretq
"#
);

/// Scratch slot the syscall entry parks the user RSP in while switching to
/// the kernel stack. Single CPU; interrupts are masked on entry by SFMASK.
#[unsafe(no_mangle)]
pub static mut SYSCALL_USER_RSP_SCRATCH: u64 = 0;

#[cfg(target_os = "none")]
unsafe extern "C" {
    pub fn isr_timer();
    pub fn isr_keyboard();
    pub fn isr_mouse();
    pub fn isr_int80();
    pub fn isr_spurious();
    pub fn isr_page_fault();
    pub fn exc_divide_error();
    pub fn exc_invalid_opcode();
    pub fn exc_double_fault();
    pub fn exc_segment_missing();
    pub fn exc_stack_fault();
    pub fn exc_general_protection();
    pub fn exc_fpu_error();
    pub fn exc_alignment_check();
    pub fn syscall_entry();
}
