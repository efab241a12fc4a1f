//! Memory-layout constants.
//!
//! The virtual address space is carved as:
//!   `[0 .. 1 GiB)`            per-task user half, demand-mapped
//!   `[-2 GiB .. -1 GiB)`      kernel identity map of physical `[0 .. 1 GiB)`
//!   `[-1 GiB .. 0)`           kernel dynamic region, demand-mapped

pub use phobos_abi::addr::{KERNEL_IDENTITY_SPAN, KERNEL_VIRTUAL_BASE};

/// Physical frames are 2 MiB; the page tables use 2 MiB leaf entries only.
pub const FRAME_SIZE_2MB: u64 = 2 * 1024 * 1024;

/// The frame bitmap spans this fixed physical window.
pub const FRAME_WINDOW_BYTES: u64 = 128 * 1024 * 1024;

/// Start of the kernel dynamic (demand-mapped) virtual GiB.
pub const KERNEL_DYNAMIC_BASE: u64 = KERNEL_VIRTUAL_BASE + KERNEL_IDENTITY_SPAN;

/// Span of the per-task user half.
pub const USER_SPACE_SPAN: u64 = 1 << 30;

/// User stacks occupy the top 16 KiB of the user half.
pub const USER_STACK_SIZE: u64 = 16 * 1024;
pub const USER_STACK_TOP: u64 = USER_SPACE_SPAN;
pub const USER_STACK_BASE: u64 = USER_STACK_TOP - USER_STACK_SIZE;

/// Statically linked user programs are linked at 1 MiB.
pub const USER_CODE_BASE: u64 = 0x0010_0000;
