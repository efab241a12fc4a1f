//! Boot-time memory bring-up from the Multiboot2 information structure.
//!
//! The boot stub hands over one pointer; everything here runs before
//! interrupts and before any allocation. Physical memory is carved as
//! `[0 .. kernel+boot data] [kernel heap] [2 MiB frames ...]`, the heap
//! reached through the fixed higher-half window.

use multiboot2::{BootInformation, BootInformationHeader};
use phobos_abi::addr::KERNEL_VIRTUAL_BASE;
use phobos_lib::{align_up_u64, klog_info, klog_warn};

use crate::frame_alloc::init_frame_allocator;
use crate::kernel_heap::init_kernel_heap;
use crate::mm_constants::{FRAME_SIZE_2MB, FRAME_WINDOW_BYTES, KERNEL_IDENTITY_SPAN};

/// Fixed kernel heap size; the frame window begins past it.
const KERNEL_HEAP_BYTES: u64 = 32 * 1024 * 1024;

pub struct MemoryLayoutInfo {
    pub heap_start_phys: u64,
    pub heap_end_phys: u64,
    pub memory_end_phys: u64,
}

/// Parse the Multiboot2 info and initialise heap + frame allocator.
///
/// # Safety
/// `mb2_info_ptr` must be the physical address the boot loader passed,
/// identity-reachable through the kernel window.
pub unsafe fn init_memory(mb2_info_ptr: u64) -> MemoryLayoutInfo {
    let header = (mb2_info_ptr + KERNEL_VIRTUAL_BASE) as *const BootInformationHeader;
    let boot_info = unsafe { BootInformation::load(header) }.expect("bad multiboot2 info");

    let available: multiboot2::MemoryAreaTypeId = multiboot2::MemoryAreaType::Available.into();
    let mut memory_end_phys = 0u64;
    if let Some(memory_map) = boot_info.memory_map_tag() {
        for area in memory_map.memory_areas() {
            let end = area.start_address() + area.size();
            if area.typ() == available && end > memory_end_phys {
                memory_end_phys = end;
            }
        }
    }
    if memory_end_phys == 0 {
        klog_warn!("memory_init: no usable memory map, assuming frame window only");
        memory_end_phys = FRAME_WINDOW_BYTES;
    }
    // Only the identity-mapped first GiB is reachable.
    memory_end_phys = memory_end_phys.min(KERNEL_IDENTITY_SPAN);

    // The boot loader parks the info structure past the kernel image, so the
    // first free byte is right after it.
    let boot_data_end = mb2_info_ptr + boot_info.total_size() as u64;
    let heap_start_phys = align_up_u64(boot_data_end, 16);
    let heap_end_phys = align_up_u64(heap_start_phys + KERNEL_HEAP_BYTES, FRAME_SIZE_2MB);

    init_kernel_heap(
        heap_start_phys + KERNEL_VIRTUAL_BASE,
        heap_end_phys + KERNEL_VIRTUAL_BASE,
    );
    init_frame_allocator(heap_end_phys, memory_end_phys - 1);

    klog_info!(
        "memory: heap {} MiB at phys 0x{:x}, frames above 0x{:x}, memory end 0x{:x}",
        KERNEL_HEAP_BYTES / 1024 / 1024,
        heap_start_phys,
        heap_end_phys,
        memory_end_phys
    );

    MemoryLayoutInfo {
        heap_start_phys,
        heap_end_phys,
        memory_end_phys,
    }
}
