//! Thin wrappers over privileged CPU operations.
//!
//! Everything that executes a privileged instruction is gated on
//! `target_os = "none"` so the pure-logic parts of the workspace stay
//! host-testable; the host fallbacks keep the control flow identical.

#[cfg(target_os = "none")]
mod imp {
    use x86_64::instructions::interrupts;
    use x86_64::registers::rflags::{self, RFlags};

    /// Save RFLAGS and disable interrupts. Returns the saved flags word.
    #[inline]
    pub fn save_flags_cli() -> u64 {
        let flags = rflags::read_raw();
        interrupts::disable();
        flags
    }

    /// Restore a flags word saved by [`save_flags_cli`]. Re-enables
    /// interrupts iff they were enabled at save time.
    #[inline]
    pub fn restore_flags(saved: u64) {
        if RFlags::from_bits_truncate(saved).contains(RFlags::INTERRUPT_FLAG) {
            interrupts::enable();
        }
    }

    #[inline]
    pub fn interrupts_enabled() -> bool {
        interrupts::are_enabled()
    }

    #[inline]
    pub fn enable_interrupts() {
        interrupts::enable();
    }

    /// Park the CPU until the next interrupt, forever.
    pub fn halt_loop() -> ! {
        loop {
            x86_64::instructions::hlt();
        }
    }

    /// One `hlt`, interrupts stay as they are.
    #[inline]
    pub fn halt_once() {
        x86_64::instructions::hlt();
    }

    /// Faulting linear address of the last page fault.
    #[inline]
    pub fn read_cr2() -> u64 {
        x86_64::registers::control::Cr2::read_raw()
    }

    /// Current page-table root.
    #[inline]
    pub fn read_cr3() -> u64 {
        let (frame, _) = x86_64::registers::control::Cr3::read_raw();
        frame.start_address().as_u64()
    }
}

#[cfg(not(target_os = "none"))]
mod imp {
    #[inline]
    pub fn save_flags_cli() -> u64 {
        0
    }

    #[inline]
    pub fn restore_flags(_saved: u64) {}

    #[inline]
    pub fn interrupts_enabled() -> bool {
        false
    }

    #[inline]
    pub fn enable_interrupts() {}

    pub fn halt_loop() -> ! {
        panic!("halt_loop on host");
    }

    #[inline]
    pub fn halt_once() {}

    #[inline]
    pub fn read_cr2() -> u64 {
        0
    }

    #[inline]
    pub fn read_cr3() -> u64 {
        0
    }
}

pub use imp::*;
