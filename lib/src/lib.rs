#![no_std]

pub mod alignment;
pub mod cpu;
pub mod klog;
pub mod kmsg;
pub mod ports;
pub mod ring_buffer;
pub mod spinlock;
pub mod string;
pub mod testing;

#[cfg(test)]
extern crate std;

#[doc(hidden)]
pub use paste;

pub use alignment::{align_down_u64, align_down_usize, align_up_u64, align_up_usize};
pub use klog::{klog_get_level, klog_init, klog_register_backend, klog_set_level, KlogLevel};
pub use ring_buffer::RingBuffer;
pub use spinlock::{IrqGuard, IrqMutex, IrqMutexGuard};
