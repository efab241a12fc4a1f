//! GDT/TSS, IDT, and the interrupt vector wiring.

pub mod routers;
pub mod stubs;

use core::sync::atomic::{AtomicU64, Ordering};

/// Guard range under the boot stack; a fault inside it is classified as a
/// stack overflow rather than a mappable miss.
static BOOT_STACK_GUARD_LO: AtomicU64 = AtomicU64::new(0);
static BOOT_STACK_GUARD_HI: AtomicU64 = AtomicU64::new(0);

pub fn register_boot_stack_guard(lo: u64, hi: u64) {
    BOOT_STACK_GUARD_LO.store(lo, Ordering::Relaxed);
    BOOT_STACK_GUARD_HI.store(hi, Ordering::Relaxed);
}

pub fn boot_stack_guard() -> Option<(u64, u64)> {
    let lo = BOOT_STACK_GUARD_LO.load(Ordering::Relaxed);
    let hi = BOOT_STACK_GUARD_HI.load(Ordering::Relaxed);
    if lo == 0 && hi == 0 {
        None
    } else {
        Some((lo, hi))
    }
}

#[cfg(target_os = "none")]
mod imp {
    use phobos_abi::cpu::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};
    use phobos_lib::klog_info;
    use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};
    use x86_64::instructions::tables::{lidt, load_tss};
    use x86_64::registers::segmentation::SegmentSelector;
    use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable};
    use x86_64::structures::tss::TaskStateSegment;
    use x86_64::structures::DescriptorTablePointer;
    use x86_64::{PrivilegeLevel, VirtAddr as XVirtAddr};

    use super::stubs;
    use phobos_drivers::pic;

    static mut GDT: GlobalDescriptorTable = GlobalDescriptorTable::empty();
    static mut TSS: TaskStateSegment = TaskStateSegment::new();

    /// One raw 16-byte interrupt gate.
    #[repr(C)]
    #[derive(Clone, Copy)]
    struct IdtEntry {
        offset_low: u16,
        selector: u16,
        ist_and_zero: u8,
        type_attr: u8,
        offset_mid: u16,
        offset_high: u32,
        reserved: u32,
    }

    impl IdtEntry {
        const fn missing() -> Self {
            Self {
                offset_low: 0,
                selector: 0,
                ist_and_zero: 0,
                type_attr: 0,
                offset_mid: 0,
                offset_high: 0,
                reserved: 0,
            }
        }

        fn interrupt_gate(handler: u64, user_invocable: bool) -> Self {
            let dpl = if user_invocable { 3 << 5 } else { 0 };
            Self {
                offset_low: handler as u16,
                selector: KERNEL_CODE_SELECTOR,
                ist_and_zero: 0,
                // present | DPL | 64-bit interrupt gate
                type_attr: 0x80 | dpl | 0x0E,
                offset_mid: (handler >> 16) as u16,
                offset_high: (handler >> 32) as u32,
                reserved: 0,
            }
        }
    }

    static mut IDT: [IdtEntry; 256] = [IdtEntry::missing(); 256];

    /// Build and activate GDT + TSS. Selector layout must match the abi
    /// constants (code 0x08, data 0x10, user data 0x18, user code 0x20).
    pub fn init_gdt_tss(boot_kernel_stack_top: u64) {
        unsafe {
            let tss = &mut *(&raw mut TSS);
            tss.privilege_stack_table[0] = XVirtAddr::new(boot_kernel_stack_top);

            let gdt = &mut *(&raw mut GDT);
            let kernel_code = gdt.append(Descriptor::kernel_code_segment());
            let kernel_data = gdt.append(Descriptor::kernel_data_segment());
            let _user_data = gdt.append(Descriptor::user_data_segment());
            let _user_code = gdt.append(Descriptor::user_code_segment());
            let tss_sel = gdt.append(Descriptor::tss_segment(&*(&raw const TSS)));
            gdt.load();

            debug_assert_eq!(kernel_code.0, KERNEL_CODE_SELECTOR);
            debug_assert_eq!(kernel_data.0, KERNEL_DATA_SELECTOR);

            CS::set_reg(SegmentSelector::new(
                KERNEL_CODE_SELECTOR >> 3,
                PrivilegeLevel::Ring0,
            ));
            SS::set_reg(SegmentSelector::new(
                KERNEL_DATA_SELECTOR >> 3,
                PrivilegeLevel::Ring0,
            ));
            DS::set_reg(SegmentSelector::new(
                KERNEL_DATA_SELECTOR >> 3,
                PrivilegeLevel::Ring0,
            ));
            ES::set_reg(SegmentSelector::new(
                KERNEL_DATA_SELECTOR >> 3,
                PrivilegeLevel::Ring0,
            ));
            load_tss(tss_sel);
        }
        klog_info!("interrupts: GDT and TSS installed");
    }

    /// Per-context-switch RSP0 update: interrupts from ring 3 land on the
    /// incoming task's kernel stack.
    pub fn set_interrupt_stack(kernel_stack_top: u64) {
        unsafe {
            (*(&raw mut TSS)).privilege_stack_table[0] = XVirtAddr::new(kernel_stack_top);
        }
    }

    /// Populate and load the IDT: exceptions, the three hardware IRQs the
    /// kernel consumes, and the legacy trap gate.
    pub fn init_idt() {
        unsafe {
            let idt = &mut *(&raw mut IDT);
            for entry in idt.iter_mut() {
                *entry = IdtEntry::interrupt_gate(stubs::isr_spurious as usize as u64, false);
            }

            idt[0] = IdtEntry::interrupt_gate(stubs::exc_divide_error as usize as u64, false);
            idt[6] = IdtEntry::interrupt_gate(stubs::exc_invalid_opcode as usize as u64, false);
            idt[8] = IdtEntry::interrupt_gate(stubs::exc_double_fault as usize as u64, false);
            idt[11] = IdtEntry::interrupt_gate(stubs::exc_segment_missing as usize as u64, false);
            idt[12] = IdtEntry::interrupt_gate(stubs::exc_stack_fault as usize as u64, false);
            idt[13] =
                IdtEntry::interrupt_gate(stubs::exc_general_protection as usize as u64, false);
            idt[14] = IdtEntry::interrupt_gate(stubs::isr_page_fault as usize as u64, false);
            idt[16] = IdtEntry::interrupt_gate(stubs::exc_fpu_error as usize as u64, false);
            idt[17] = IdtEntry::interrupt_gate(stubs::exc_alignment_check as usize as u64, false);

            let base = pic::IRQ_VECTOR_BASE as usize;
            idt[base + pic::IRQ_TIMER as usize] =
                IdtEntry::interrupt_gate(stubs::isr_timer as usize as u64, false);
            idt[base + pic::IRQ_KEYBOARD as usize] =
                IdtEntry::interrupt_gate(stubs::isr_keyboard as usize as u64, false);
            idt[base + pic::IRQ_MOUSE as usize] =
                IdtEntry::interrupt_gate(stubs::isr_mouse as usize as u64, false);

            idt[0x80] = IdtEntry::interrupt_gate(stubs::isr_int80 as usize as u64, true);

            let pointer = DescriptorTablePointer {
                limit: (core::mem::size_of_val(idt) - 1) as u16,
                base: XVirtAddr::new(idt.as_ptr() as u64),
            };
            lidt(&pointer);
        }
        klog_info!("interrupts: IDT installed");
    }

    /// Open the IRQ lines the kernel serves.
    pub fn enable_hardware_irqs() {
        pic::unmask_irq(pic::IRQ_TIMER);
        pic::unmask_irq(pic::IRQ_KEYBOARD);
        pic::unmask_irq(pic::IRQ_MOUSE);
    }
}

#[cfg(not(target_os = "none"))]
mod imp {
    pub fn init_gdt_tss(_boot_kernel_stack_top: u64) {}
    pub fn set_interrupt_stack(_kernel_stack_top: u64) {}
    pub fn init_idt() {}
    pub fn enable_hardware_irqs() {}
}

pub use imp::{enable_hardware_irqs, init_gdt_tss, init_idt, set_interrupt_stack};
