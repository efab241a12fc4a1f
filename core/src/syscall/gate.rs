//! MSR configuration for the `syscall` instruction.
//!
//! STAR carries the selector bases (sysret adds 16 for user CS, 8 for user
//! SS, so the user base points at the user-data descriptor minus 8), LSTAR
//! the entry stub, SFMASK clears IF so the stub runs with interrupts off
//! until `iretq` restores the saved flags.

#[cfg(target_os = "none")]
pub fn config_and_activate_syscalls() {
    use x86_64::registers::model_specific::{Efer, EferFlags, LStar, SFMask, Star};
    use x86_64::registers::rflags::RFlags;
    use x86_64::VirtAddr;

    use crate::interrupts::stubs::syscall_entry;

    // Selector layout: kernel code 0x08, kernel data 0x10, user data 0x18,
    // user code 0x20 (see the abi constants and the GDT build order).
    unsafe {
        Star::write_raw(0x10, 0x08);
        LStar::write(VirtAddr::new(syscall_entry as usize as u64));
        SFMask::write(RFlags::INTERRUPT_FLAG);
        Efer::update(|flags| flags.insert(EferFlags::SYSTEM_CALL_EXTENSIONS));
    }
    phobos_lib::klog_info!("syscall: MSR gate active");
}

#[cfg(not(target_os = "none"))]
pub fn config_and_activate_syscalls() {}
