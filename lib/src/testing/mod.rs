//! In-kernel test harness: suite descriptors plus assertion macros.
//!
//! Suites are plain statics built by [`define_test_suite!`]; the tests crate
//! collects them into a registry and runs them from a kernel task, reporting
//! through klog.

mod assertions;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestResult {
    Pass,
    Fail,
}

pub type TestFn = fn() -> TestResult;

pub struct TestCase {
    pub name: &'static str,
    pub run: TestFn,
}

pub struct TestSuiteDesc {
    pub name: &'static str,
    pub cases: &'static [TestCase],
}

#[derive(Clone, Copy, Default)]
pub struct TestRunSummary {
    pub passed: u32,
    pub failed: u32,
}

/// Define a static test suite from a list of test functions.
///
/// ```ignore
/// define_test_suite!(FRAME_SUITE, "frame_alloc", [
///     test_alloc_sets_bit,
///     test_double_free_is_idempotent,
/// ]);
/// ```
#[macro_export]
macro_rules! define_test_suite {
    ($suite:ident, $name:expr, [ $($case:ident),+ $(,)? ]) => {
        $crate::paste::paste! {
            const [<$suite _CASES>]: &[$crate::testing::TestCase] = &[
                $(
                    $crate::testing::TestCase {
                        name: stringify!($case),
                        run: $case,
                    },
                )+
            ];

            pub static $suite: $crate::testing::TestSuiteDesc =
                $crate::testing::TestSuiteDesc {
                    name: $name,
                    cases: [<$suite _CASES>],
                };
        }
    };
}

/// Run one suite, logging each case, and fold the outcome into `summary`.
pub fn run_suite(suite: &TestSuiteDesc, summary: &mut TestRunSummary) {
    crate::klog_info!("TESTS: suite '{}' ({} cases)", suite.name, suite.cases.len());
    for case in suite.cases {
        match (case.run)() {
            TestResult::Pass => {
                summary.passed += 1;
                crate::klog_info!("TESTS:   {} ... ok", case.name);
            }
            TestResult::Fail => {
                summary.failed += 1;
                crate::klog_error!("TESTS:   {} ... FAILED", case.name);
            }
        }
    }
}
