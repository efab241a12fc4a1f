#![no_std]

pub mod elf;
pub mod frame_alloc;
pub mod global_alloc;
pub mod kernel_heap;
#[cfg(target_os = "none")]
pub mod memory_init;
pub mod mm_constants;
pub mod page_fault;
pub mod paging;

#[cfg(test)]
extern crate std;

pub use frame_alloc::{
    alloc_consecutive_frames, alloc_frame, frame_size, free_consecutive_frames, free_frame,
    total_frames_count, used_frames_count,
};
pub use global_alloc::KernelAllocator;
pub use kernel_heap::{kfree, kmalloc, kzalloc};
pub use page_fault::PageFaultReason;
