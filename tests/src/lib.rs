#![no_std]

//! Built-in test aggregation.
//!
//! With the `builtin-tests` feature on, the boot sequence spawns a kernel
//! task that runs every registered suite and reports through klog. The
//! suites themselves live next to the code they exercise.

use phobos_lib::klog_info;
use phobos_lib::testing::{run_suite, TestRunSummary, TestSuiteDesc};

const SYSTEM_SUITES: &[&TestSuiteDesc] = &[
    &phobos_fs::tests::FS_SUITE,
    &phobos_core::tests::SCHEDULER_SUITE,
];

/// Run every suite; returns the number of failed cases.
pub fn tests_run_all() -> u32 {
    let mut summary = TestRunSummary::default();
    klog_info!("TESTS: running {} suites", SYSTEM_SUITES.len());

    for suite in SYSTEM_SUITES {
        run_suite(suite, &mut summary);
    }

    if summary.failed == 0 {
        klog_info!("TESTS: all {} cases passed", summary.passed);
    } else {
        klog_info!(
            "TESTS: {} passed, {} FAILED",
            summary.passed,
            summary.failed
        );
    }
    summary.failed
}

/// Entry point shape for `task_add_kernel_task`.
pub extern "C" fn tests_task_entry(_arg1: u64, _arg2: u64) {
    tests_run_all();
}
