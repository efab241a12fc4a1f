//! Assertion macros returning `TestResult::Fail` instead of panicking, so a
//! failing case never takes the kernel down with it.

#[macro_export]
macro_rules! assert_test {
    ($cond:expr) => {{
        if !$cond {
            $crate::klog_info!("ASSERT: condition failed: {}", stringify!($cond));
            return $crate::testing::TestResult::Fail;
        }
    }};
    ($cond:expr, $msg:expr) => {{
        if !$cond {
            $crate::klog_info!("ASSERT: {}", $msg);
            return $crate::testing::TestResult::Fail;
        }
    }};
}

#[macro_export]
macro_rules! assert_eq_test {
    ($left:expr, $right:expr) => {{
        let left = $left;
        let right = $right;
        if left != right {
            $crate::klog_info!("ASSERT_EQ: expected {:?}, got {:?}", right, left);
            return $crate::testing::TestResult::Fail;
        }
    }};
}

#[macro_export]
macro_rules! assert_ok_test {
    ($expr:expr) => {{
        match $expr {
            Ok(v) => v,
            Err(e) => {
                $crate::klog_info!("ASSERT_OK: {} -> {:?}", stringify!($expr), e);
                return $crate::testing::TestResult::Fail;
            }
        }
    }};
}

#[macro_export]
macro_rules! assert_err_test {
    ($expr:expr, $ec:expr) => {{
        match $expr {
            Err(e) if e == $ec => {}
            other => {
                let _ = other;
                $crate::klog_info!(
                    "ASSERT_ERR: {} should fail with {:?}",
                    stringify!($expr),
                    $ec
                );
                return $crate::testing::TestResult::Fail;
            }
        }
    }};
}
