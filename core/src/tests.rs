//! In-kernel scheduler suite: exercises task lifecycle against the live
//! run list. Runs from a kernel task once multitasking is up.

use core::sync::atomic::{AtomicU32, Ordering};

use phobos_lib::testing::TestResult;
use phobos_lib::{assert_test, define_test_suite};

use crate::scheduler::manager::{task_add_kernel_task, task_current_id};
use crate::syscall::int80::yield_via_int80;
use crate::time::uptime_ms;

static SIDE_EFFECT: AtomicU32 = AtomicU32::new(0);

extern "C" fn side_effect_task(value: u64, _unused: u64) {
    SIDE_EFFECT.store(value as u32, Ordering::Release);
}

pub fn test_spawned_task_runs_and_exits() -> TestResult {
    SIDE_EFFECT.store(0, Ordering::Release);
    let tid = task_add_kernel_task(side_effect_task as *const () as usize as u64, "test_side_effect", 42, 0);
    assert_test!(tid.is_some(), "task slot available");

    // Yield until the spawned task has run; it writes the marker and exits
    // through the task epilogue.
    for _ in 0..64 {
        if SIDE_EFFECT.load(Ordering::Acquire) == 42 {
            return TestResult::Pass;
        }
        yield_via_int80();
    }
    TestResult::Fail
}

pub fn test_current_task_has_identity() -> TestResult {
    assert_test!(task_current_id() != 0, "running inside a live task");
    TestResult::Pass
}

pub fn test_sleep_advances_clock() -> TestResult {
    let before = uptime_ms();
    crate::scheduler::manager::task_sleep_current_ms(0); // no-op yield path
    for _ in 0..8 {
        yield_via_int80();
    }
    assert_test!(uptime_ms() >= before, "uptime is monotonic");
    TestResult::Pass
}

/// Touch an address deep in the kernel dynamic GiB: the first access
/// faults, the handler installs a 2 MiB frame, and the access repeats
/// without further faults.
pub fn test_lazy_mapping_backs_dynamic_region() -> TestResult {
    use phobos_mm::mm_constants::{FRAME_SIZE_2MB, KERNEL_DYNAMIC_BASE};

    let probe = (KERNEL_DYNAMIC_BASE + 8 * FRAME_SIZE_2MB) as *mut u64;
    unsafe {
        probe.write_volatile(0xFEED_FACE_CAFE_F00D);
        assert_test!(
            probe.read_volatile() == 0xFEED_FACE_CAFE_F00D,
            "mapped page retains the written value"
        );
        // A second touch inside the same 2 MiB page must not fault again;
        // if it did, the written value would be gone.
        let neighbour = ((KERNEL_DYNAMIC_BASE + 8 * FRAME_SIZE_2MB) + 4096) as *mut u64;
        neighbour.write_volatile(1);
        assert_test!(
            probe.read_volatile() == 0xFEED_FACE_CAFE_F00D,
            "second touch stayed on the same frame"
        );
    }
    TestResult::Pass
}

define_test_suite!(SCHEDULER_SUITE, "scheduler", [
    test_current_task_has_identity,
    test_spawned_task_runs_and_exits,
    test_sleep_advances_clock,
    test_lazy_mapping_backs_dynamic_region,
]);
