//! Physical frame allocator: a fixed bitmap of 2 MiB frames.
//!
//! One bit per frame over a 128 MiB physical window. A set bit means the
//! frame is reserved or handed out; frames outside the available physical
//! range are permanently marked used at init. A bitmap suffices because the
//! window is small and frames are large.

use phobos_abi::addr::PhysAddr;
use phobos_lib::{klog_debug, IrqMutex};

use crate::mm_constants::{FRAME_SIZE_2MB, FRAME_WINDOW_BYTES};

pub const TOTAL_FRAMES: usize = (FRAME_WINDOW_BYTES / FRAME_SIZE_2MB) as usize;

struct FrameBitmap {
    used: [bool; TOTAL_FRAMES],
}

impl FrameBitmap {
    const fn new() -> Self {
        Self {
            used: [true; TOTAL_FRAMES],
        }
    }

    fn init(&mut self, first_available_byte: u64, last_available_byte: u64) {
        // Frames straddling the boundaries stay reserved.
        let first_index = (first_available_byte / FRAME_SIZE_2MB + 1) as usize;
        let last_index = (last_available_byte / FRAME_SIZE_2MB) as usize;

        for (i, slot) in self.used.iter_mut().enumerate() {
            *slot = i < first_index || i > last_index;
        }
    }

    fn find_unused_starting_at(&self, start_index: usize) -> Option<usize> {
        (start_index..TOTAL_FRAMES).find(|&i| !self.used[i])
    }

    fn consecutive_unused_count_at(&self, start_index: usize, required: usize) -> usize {
        let mut count = 0;
        for i in start_index..TOTAL_FRAMES {
            if count == required || self.used[i] {
                break;
            }
            count += 1;
        }
        count
    }
}

static FRAME_BITMAP: IrqMutex<FrameBitmap> = IrqMutex::new(FrameBitmap::new());

/// Mark frames covering `[first_available_byte, last_available_byte]` free;
/// everything else in the window stays permanently used.
pub fn init_frame_allocator(first_available_byte: u64, last_available_byte: u64) {
    let mut bitmap = FRAME_BITMAP.lock();
    bitmap.init(first_available_byte, last_available_byte);
    let free = bitmap.used.iter().filter(|u| !**u).count();
    drop(bitmap);
    klog_debug!(
        "frame_alloc: {} of {} frames available ({} MiB each)",
        free,
        TOTAL_FRAMES,
        FRAME_SIZE_2MB / 1024 / 1024
    );
}

/// First-fit single frame allocation.
pub fn alloc_frame() -> Option<PhysAddr> {
    let mut bitmap = FRAME_BITMAP.lock();
    let index = bitmap.find_unused_starting_at(0)?;
    bitmap.used[index] = true;
    Some(PhysAddr::new(index as u64 * FRAME_SIZE_2MB))
}

/// Free one frame. Freeing an already-free frame is idempotent.
pub fn free_frame(phys_addr: PhysAddr) {
    let index = (phys_addr.as_u64() / FRAME_SIZE_2MB) as usize;
    if index < TOTAL_FRAMES {
        FRAME_BITMAP.lock().used[index] = false;
    }
}

/// Find and claim the first run of frames that can hold `num_bytes`.
/// Partial allocation never happens.
pub fn alloc_consecutive_frames(num_bytes: u64) -> Option<PhysAddr> {
    let needed = (num_bytes / FRAME_SIZE_2MB + 1) as usize;

    let mut bitmap = FRAME_BITMAP.lock();
    let mut index = 0;
    loop {
        index = bitmap.find_unused_starting_at(index)?;
        let run = bitmap.consecutive_unused_count_at(index, needed);
        if run == needed {
            for i in index..index + needed {
                bitmap.used[i] = true;
            }
            return Some(PhysAddr::new(index as u64 * FRAME_SIZE_2MB));
        }
        index += run.max(1);
    }
}

/// Free the run of frames claimed by [`alloc_consecutive_frames`].
pub fn free_consecutive_frames(phys_addr: PhysAddr, num_bytes: u64) {
    let index = (phys_addr.as_u64() / FRAME_SIZE_2MB) as usize;
    let count = (num_bytes / FRAME_SIZE_2MB + 1) as usize;

    let mut bitmap = FRAME_BITMAP.lock();
    for i in index..(index + count).min(TOTAL_FRAMES) {
        bitmap.used[i] = false;
    }
}

pub const fn frame_size() -> u64 {
    FRAME_SIZE_2MB
}

pub fn used_frames_count() -> usize {
    FRAME_BITMAP.lock().used.iter().filter(|u| **u).count()
}

pub const fn total_frames_count() -> usize {
    TOTAL_FRAMES
}

#[cfg(test)]
mod tests {
    use super::*;

    // The allocator is a process-wide singleton; serialize the tests.
    static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn reset_all_free() {
        init_frame_allocator(0, FRAME_WINDOW_BYTES - 1);
        // init keeps frame 0 reserved (first_index = 1); that is fine here.
    }

    #[test]
    fn alloc_sets_bit_and_free_clears_it() {
        let _serial = TEST_LOCK.lock().unwrap();
        reset_all_free();
        let frame = alloc_frame().unwrap();
        let index = (frame.as_u64() / FRAME_SIZE_2MB) as usize;
        assert!(FRAME_BITMAP.lock().used[index]);

        free_frame(frame);
        assert!(!FRAME_BITMAP.lock().used[index]);

        // Double free is idempotent.
        free_frame(frame);
        assert!(!FRAME_BITMAP.lock().used[index]);
    }

    #[test]
    fn consecutive_allocation_is_all_or_nothing() {
        let _serial = TEST_LOCK.lock().unwrap();
        reset_all_free();
        let free_before = TOTAL_FRAMES - used_frames_count();

        // Exactly the largest free run succeeds...
        let span_bytes = (free_before as u64 - 1) * FRAME_SIZE_2MB;
        let base = alloc_consecutive_frames(span_bytes).unwrap();
        assert_eq!(used_frames_count(), TOTAL_FRAMES);

        // ...and one more frame fails without claiming anything.
        free_consecutive_frames(base, span_bytes);
        assert!(alloc_consecutive_frames(free_before as u64 * FRAME_SIZE_2MB).is_none());
        assert_eq!(TOTAL_FRAMES - used_frames_count(), free_before);
    }

    #[test]
    fn init_reserves_outside_range() {
        let _serial = TEST_LOCK.lock().unwrap();
        init_frame_allocator(4 * FRAME_SIZE_2MB, 8 * FRAME_SIZE_2MB - 1);
        let bitmap = FRAME_BITMAP.lock();
        assert!(bitmap.used[4]);
        assert!(!bitmap.used[5]);
        assert!(!bitmap.used[7]);
        assert!(bitmap.used[8]);
    }
}
