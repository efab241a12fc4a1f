//! Page-fault classification and the lazy 2 MiB mapper.
//!
//! The classifier folds the CPU error code together with the target leaf
//! entry's presence and flags into one closed reason set. Only
//! `PageNotPresent` inside a demand-backed region is recoverable; the ISR
//! maps one frame and lets the faulting instruction re-execute. Every other
//! reason terminates the faulting task group after a single log line.

use phobos_abi::addr::{PhysAddr, VirtAddr};

use crate::frame_alloc::alloc_frame;
use crate::paging::{
    entry_flags, get_page_for_virt_address, install_page, region_for_virt_address, PageFlags,
    VirtRegion,
};

/// CPU error-code bits (Intel SDM vol. 3, §4.7).
const ERR_PRESENT: u64 = 1 << 0;
const ERR_WRITE: u64 = 1 << 1;
const ERR_USER: u64 = 1 << 2;
const ERR_RESERVED: u64 = 1 << 3;
const ERR_INSTR_FETCH: u64 = 1 << 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageFaultReason {
    PageNotPresent,
    ReadonlyViolation,
    PrivilegeViolation,
    ReservedWriteViolation,
    InstructionFetch,
    StackOverflow,
    ProtectionViolation,
    InvalidAddressSpace,
}

impl PageFaultReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            PageFaultReason::PageNotPresent => "PAGE_NOT_PRESENT",
            PageFaultReason::ReadonlyViolation => "READONLY_VIOLATION",
            PageFaultReason::PrivilegeViolation => "PRIVILEGE_VIOLATION",
            PageFaultReason::ReservedWriteViolation => "RESERVED_WRITE_VIOLATION",
            PageFaultReason::InstructionFetch => "INSTRUCTION_FETCH",
            PageFaultReason::StackOverflow => "STACK_OVERFLOW",
            PageFaultReason::ProtectionViolation => "PROTECTION_VIOLATION",
            PageFaultReason::InvalidAddressSpace => "INVALID_ADDRESS_SPACE",
        }
    }
}

/// Classify a fault at `va` under the address space `pml4_phys`.
///
/// `stack_guard` is the current task's guard range (exclusive end); a miss
/// inside it is a stack overflow regardless of anything else.
pub fn get_page_fault_reason(
    va: VirtAddr,
    pml4_phys: PhysAddr,
    error_code: u64,
    stack_guard: Option<(u64, u64)>,
) -> PageFaultReason {
    if let Some((lo, hi)) = stack_guard {
        if (lo..hi).contains(&va.as_u64()) {
            return PageFaultReason::StackOverflow;
        }
    }

    if error_code & ERR_RESERVED != 0 {
        return PageFaultReason::ReservedWriteViolation;
    }

    let Some(region) = region_for_virt_address(va) else {
        return PageFaultReason::InvalidAddressSpace;
    };

    let Some(entry) = get_page_for_virt_address(va, pml4_phys) else {
        return PageFaultReason::InvalidAddressSpace;
    };
    let flags = entry_flags(unsafe { *entry });

    if error_code & ERR_PRESENT == 0 {
        // Non-present: recoverable only where backing on demand is allowed.
        return match region {
            VirtRegion::User | VirtRegion::KernelDynamic => PageFaultReason::PageNotPresent,
            VirtRegion::KernelStatic => PageFaultReason::InvalidAddressSpace,
        };
    }

    if error_code & ERR_INSTR_FETCH != 0 {
        return PageFaultReason::InstructionFetch;
    }
    if error_code & ERR_WRITE != 0 && !flags.contains(PageFlags::WRITABLE) {
        return PageFaultReason::ReadonlyViolation;
    }
    if error_code & ERR_USER != 0 && !flags.contains(PageFlags::USER_ACCESSIBLE) {
        return PageFaultReason::PrivilegeViolation;
    }

    PageFaultReason::ProtectionViolation
}

/// Allocate one 2 MiB frame and install it behind `va`. Returns false when
/// no frame is available or the address is outside any demand region.
pub fn alloc_missing_page(va: VirtAddr, pml4_phys: PhysAddr) -> bool {
    let Some(frame) = alloc_frame() else {
        return false;
    };
    if install_page(va, frame, pml4_phys) {
        true
    } else {
        crate::frame_alloc::free_frame(frame);
        false
    }
}
