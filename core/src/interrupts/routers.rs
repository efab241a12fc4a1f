//! Rust halves of the interrupt stubs. Every router takes the freshly
//! built `CpuState` frame and returns the frame to resume: the same one,
//! or another task's after a scheduling decision.

use phobos_abi::addr::{PhysAddr, VirtAddr};
use phobos_abi::cpu::CpuState;
use phobos_lib::{cpu, klog_error, klog_warn};
use phobos_mm::page_fault::{alloc_missing_page, get_page_fault_reason, PageFaultReason};

use phobos_drivers::{pic, pit, ps2};

use crate::scheduler::manager::{kill_current_task_group, schedule, task_current_name};

/// The periodic tick: timers first, then the round-robin election.
#[unsafe(no_mangle)]
pub extern "C" fn timer_interrupt_router(frame: *mut CpuState) -> *mut CpuState {
    pit::on_timer_interrupt();
    pic::send_eoi(pic::IRQ_TIMER);
    schedule(frame)
}

#[unsafe(no_mangle)]
pub extern "C" fn keyboard_interrupt_router(frame: *mut CpuState) -> *mut CpuState {
    ps2::on_keyboard_interrupt();
    pic::send_eoi(pic::IRQ_KEYBOARD);
    frame
}

#[unsafe(no_mangle)]
pub extern "C" fn mouse_interrupt_router(frame: *mut CpuState) -> *mut CpuState {
    ps2::on_mouse_interrupt();
    pic::send_eoi(pic::IRQ_MOUSE);
    frame
}

#[unsafe(no_mangle)]
pub extern "C" fn spurious_interrupt_router(frame: *mut CpuState) -> *mut CpuState {
    frame
}

/// Page faults: a miss in a demand-backed region maps one frame and
/// retries the instruction; everything else takes the whole group down.
#[unsafe(no_mangle)]
pub extern "C" fn page_fault_router(frame: *mut CpuState) -> *mut CpuState {
    let faulty_address = VirtAddr::new(cpu::read_cr2());
    let pml4_phys = PhysAddr::new(cpu::read_cr3());
    let error_code = unsafe { (*frame).error_code };

    let reason = get_page_fault_reason(
        faulty_address,
        pml4_phys,
        error_code,
        super::boot_stack_guard(),
    );

    if reason == PageFaultReason::PageNotPresent {
        if alloc_missing_page(faulty_address, pml4_phys) {
            return frame;
        }
        klog_error!(
            "PAGE FAULT at 0x{:x} by \"{}\": could not allocate a frame, killing group",
            faulty_address.as_u64(),
            task_current_name()
        );
        return kill_current_task_group();
    }

    klog_error!(
        "PAGE FAULT at 0x{:x} ({} MiB) by \"{}\": {}, killing group",
        faulty_address.as_u64(),
        faulty_address.as_u64() / 1024 / 1024,
        task_current_name(),
        reason.as_str()
    );
    kill_current_task_group()
}

/// Unrecoverable CPU exceptions: one log line, then the group dies.
#[unsafe(no_mangle)]
pub extern "C" fn exception_router(frame: *mut CpuState, vector: u64) -> *mut CpuState {
    let name = match vector {
        0 => "DIVIDE_ERROR",
        6 => "INVALID_OPCODE",
        8 => "DOUBLE_FAULT",
        11 => "SEGMENT_NOT_PRESENT",
        12 => "STACK_FAULT",
        13 => "GENERAL_PROTECTION",
        16 => "FPU_ERROR",
        17 => "ALIGNMENT_CHECK",
        _ => "UNKNOWN_EXCEPTION",
    };
    let (rip, error_code) = unsafe { ((*frame).rip, (*frame).error_code) };
    klog_error!(
        "EXCEPTION {} (error 0x{:x}) at rip 0x{:x} by \"{}\", killing group",
        name,
        error_code,
        rip,
        task_current_name()
    );
    if vector == 8 {
        // A double fault means the kernel stack state is beyond salvage.
        klog_warn!("double fault: halting");
        cpu::halt_loop();
    }
    kill_current_task_group()
}
