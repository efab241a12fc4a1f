//! Kernel heap: a doubly-linked split/coalesce free list over one
//! contiguous virtual range the allocator owns exclusively.
//!
//! Every chunk is `[header | payload]`. The header magic word doubles as the
//! allocated flag: its low bit is the flag, the remaining bits must equal a
//! fixed sentinel, which is how a user-provided pointer is validated on
//! free. Adjacent free chunks never both exist: freeing merges with the next
//! neighbour first, then the previous one (that order avoids touching a
//! freed header).

use core::ffi::c_void;
use core::ptr;

use phobos_lib::{align_up_u64, klog_debug, klog_warn, IrqMutex};

/// Sentinel occupying all magic bits above the allocated flag.
const CHUNK_SENTINEL: u64 = 0x51E5_0C0D_E5EA_1E00;
const CHUNK_ALLOCATED: u64 = 1;

const CHUNK_ALIGN: u64 = 16;

#[repr(C)]
struct ChunkHeader {
    size: u64,
    magic: u64,
    prev: *mut ChunkHeader,
    next: *mut ChunkHeader,
}

const HEADER_SIZE: u64 = core::mem::size_of::<ChunkHeader>() as u64;

impl ChunkHeader {
    #[inline]
    fn is_valid(&self) -> bool {
        self.magic & !CHUNK_ALLOCATED == CHUNK_SENTINEL
    }

    #[inline]
    fn is_allocated(&self) -> bool {
        self.magic & CHUNK_ALLOCATED != 0
    }

    #[inline]
    fn mark_allocated(&mut self) {
        self.magic = CHUNK_SENTINEL | CHUNK_ALLOCATED;
    }

    #[inline]
    fn mark_free(&mut self) {
        self.magic = CHUNK_SENTINEL;
    }

    #[inline]
    fn payload(&mut self) -> *mut u8 {
        unsafe { (self as *mut ChunkHeader as *mut u8).add(HEADER_SIZE as usize) }
    }
}

#[derive(Clone, Copy, Default)]
pub struct HeapStats {
    pub total_bytes: u64,
    pub allocation_count: u64,
    pub free_count: u64,
}

struct KernelHeap {
    head: *mut ChunkHeader,
    start: u64,
    end: u64,
    stats: HeapStats,
    initialized: bool,
}

// SAFETY: the raw chunk pointers are only reached through the IrqMutex.
unsafe impl Send for KernelHeap {}

impl KernelHeap {
    const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            start: 0,
            end: 0,
            stats: HeapStats {
                total_bytes: 0,
                allocation_count: 0,
                free_count: 0,
            },
            initialized: false,
        }
    }

    /// Turn `[start, end)` into a single free chunk.
    fn init(&mut self, start: u64, end: u64) {
        let start = align_up_u64(start, CHUNK_ALIGN);
        assert!(end > start + HEADER_SIZE, "heap range too small");

        let head = start as *mut ChunkHeader;
        unsafe {
            (*head).size = end - start - HEADER_SIZE;
            (*head).mark_free();
            (*head).prev = ptr::null_mut();
            (*head).next = ptr::null_mut();
        }

        self.head = head;
        self.start = start;
        self.end = end;
        self.stats = HeapStats {
            total_bytes: end - start,
            allocation_count: 0,
            free_count: 0,
        };
        self.initialized = true;
    }

    fn alloc(&mut self, size: u64) -> *mut u8 {
        let size = align_up_u64(size.max(1), CHUNK_ALIGN);

        let mut current = self.head;
        while !current.is_null() {
            let chunk = unsafe { &mut *current };
            if !chunk.is_allocated() && chunk.size >= size {
                self.split_if_worthwhile(current, size);
                let chunk = unsafe { &mut *current };
                chunk.mark_allocated();
                self.stats.allocation_count += 1;
                return chunk.payload();
            }
            current = chunk.next;
        }

        ptr::null_mut()
    }

    /// Split `chunk` so that it holds exactly `chop_size` bytes, when the
    /// tail would still fit a header plus at least one payload byte.
    fn split_if_worthwhile(&mut self, chunk: *mut ChunkHeader, chop_size: u64) {
        let chunk = unsafe { &mut *chunk };
        if chunk.size < chop_size + HEADER_SIZE + 1 {
            return;
        }

        let tail_addr = chunk.payload() as u64 + chop_size;
        let tail = tail_addr as *mut ChunkHeader;
        unsafe {
            (*tail).size = chunk.size - chop_size - HEADER_SIZE;
            (*tail).mark_free();
            (*tail).prev = chunk as *mut ChunkHeader;
            (*tail).next = chunk.next;
            if !(*tail).next.is_null() {
                (*(*tail).next).prev = tail;
            }
        }

        chunk.size = chop_size;
        chunk.next = tail;
    }

    fn free(&mut self, payload: *mut u8) {
        let addr = payload as u64;
        if addr < self.start + HEADER_SIZE || addr >= self.end {
            klog_warn!("kfree: pointer outside heap range");
            return;
        }

        let header = (addr - HEADER_SIZE) as *mut ChunkHeader;
        let chunk = unsafe { &mut *header };

        if !chunk.is_valid() {
            klog_warn!("kfree: invalid chunk sentinel, ignoring");
            return;
        }
        if !chunk.is_allocated() {
            // Double free: detected via the flag, deliberately a no-op.
            klog_warn!("kfree: double free detected, ignoring");
            return;
        }

        chunk.mark_free();
        self.stats.free_count += 1;

        // Merge order matters: next first, prev second, so `header` is
        // never read after being absorbed.
        let next = chunk.next;
        self.merge_if_both_free(header, next);
        let prev = unsafe { (*header).prev };
        self.merge_if_both_free(prev, header);
    }

    fn merge_if_both_free(&mut self, first: *mut ChunkHeader, second: *mut ChunkHeader) {
        if first.is_null() || second.is_null() {
            return;
        }
        unsafe {
            if (*first).is_allocated() || (*second).is_allocated() {
                return;
            }

            (*first).size += HEADER_SIZE + (*second).size;
            (*first).next = (*second).next;
            if !(*first).next.is_null() {
                (*(*first).next).prev = first;
            }
            // Invalidate the absorbed header so stale pointers fail the
            // sentinel check.
            (*second).magic = 0;
        }
    }

    fn free_bytes(&self) -> u64 {
        let mut total = 0;
        let mut current = self.head;
        while !current.is_null() {
            let chunk = unsafe { &*current };
            if !chunk.is_allocated() {
                total += chunk.size;
            }
            current = chunk.next;
        }
        total
    }
}

static KERNEL_HEAP: IrqMutex<KernelHeap> = IrqMutex::new(KernelHeap::new());

/// Hand the virtual range `[start, end)` to the heap. Called once at boot,
/// before any allocation.
pub fn init_kernel_heap(start: u64, end: u64) {
    let mut heap = KERNEL_HEAP.lock();
    heap.init(start, end);
    klog_debug!(
        "kernel_heap: {} KiB at 0x{:x}",
        (end - start) / 1024,
        start
    );
}

pub fn kmalloc(size: usize) -> *mut c_void {
    let mut heap = KERNEL_HEAP.lock();
    if !heap.initialized || size == 0 {
        return ptr::null_mut();
    }
    heap.alloc(size as u64) as *mut c_void
}

pub fn kzalloc(size: usize) -> *mut c_void {
    let out = kmalloc(size);
    if !out.is_null() {
        unsafe { ptr::write_bytes(out as *mut u8, 0, size) };
    }
    out
}

pub fn kfree(ptr_in: *mut c_void) {
    if ptr_in.is_null() {
        return;
    }
    let mut heap = KERNEL_HEAP.lock();
    if !heap.initialized {
        return;
    }
    heap.free(ptr_in as *mut u8);
}

pub fn heap_free_bytes() -> u64 {
    let heap = KERNEL_HEAP.lock();
    if !heap.initialized {
        return 0;
    }
    heap.free_bytes()
}

pub fn heap_total_bytes() -> u64 {
    KERNEL_HEAP.lock().stats.total_bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn fresh_heap(bytes: usize) -> vec::Vec<u8> {
        let arena = vec![0u8; bytes];
        let start = arena.as_ptr() as u64;
        init_kernel_heap(start, start + bytes as u64);
        arena
    }

    #[test]
    fn first_alloc_spans_then_splits() {
        let _serial = TEST_LOCK.lock().unwrap();
        let _arena = fresh_heap(4096);

        let a = kmalloc(100);
        assert!(!a.is_null());
        let b = kmalloc(100);
        assert!(!b.is_null());
        assert_ne!(a, b);

        // Split keeps chunks 16-aligned.
        assert_eq!(a as u64 % 16, 0);
        assert_eq!(b as u64 % 16, 0);
    }

    #[test]
    fn free_is_idempotent_and_validated() {
        let _serial = TEST_LOCK.lock().unwrap();
        let _arena = fresh_heap(4096);

        let free_before = heap_free_bytes();
        let p = kmalloc(64);
        assert!(!p.is_null());
        kfree(p);
        assert_eq!(heap_free_bytes(), free_before);

        // Double free must not corrupt the list.
        kfree(p);
        assert_eq!(heap_free_bytes(), free_before);

        let q = kmalloc(64);
        assert!(!q.is_null());
    }

    #[test]
    fn neighbours_coalesce_into_one_chunk() {
        let _serial = TEST_LOCK.lock().unwrap();
        let _arena = fresh_heap(4096);

        let a = kmalloc(128);
        let b = kmalloc(128);
        let free_between = heap_free_bytes();

        kfree(a);
        kfree(b);
        // Both headers must have been absorbed into the tail chunk: the
        // whole arena is one free span again.
        let expected = free_between + 2 * 128 + super::HEADER_SIZE * 2;
        assert_eq!(heap_free_bytes(), expected);

        // A chunk spanning nearly everything must now fit.
        let big = kmalloc((heap_free_bytes() - 64) as usize);
        assert!(!big.is_null());
    }

    #[test]
    fn exhaustion_returns_null() {
        let _serial = TEST_LOCK.lock().unwrap();
        let _arena = fresh_heap(1024);
        assert!(kmalloc(4096).is_null());
    }
}
