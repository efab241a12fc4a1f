//! The closed error-code set shared between kernel subsystems and user space.
//!
//! Syscalls return `-(code as i64)` on failure; non-negative values are data
//! or descriptors.

/// Kernel-wide error codes, POSIX-flavoured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    EcOk = 0,
    /// No such file or directory.
    EcNoent = 2,
    /// Operation not permitted on this entry.
    EcPerm = 1,
    /// Would block; try again.
    EcAgain = 11,
    /// Out of memory.
    EcNomem = 12,
    /// Entry already exists.
    EcExist = 17,
    /// Not a directory.
    EcNotdir = 20,
    /// Is a directory.
    EcIsdir = 21,
    /// Invalid argument or path.
    EcInval = 22,
    /// Too many open files.
    EcMfile = 24,
    /// No space left on device.
    EcNospc = 28,
    /// Read-only file system.
    EcRofs = 30,
    /// Bad file descriptor.
    EcBadf = 9,
    /// Not an executable.
    EcNoexec = 8,
}

pub type KernelResult<T> = Result<T, ErrorCode>;

impl ErrorCode {
    /// Encode for the syscall ABI: errors are negative, `EcOk` is zero.
    #[inline]
    pub const fn as_syscall_return(self) -> i64 {
        -(self as u32 as i64)
    }

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::EcOk => "ok",
            ErrorCode::EcNoent => "no such entry",
            ErrorCode::EcPerm => "operation not permitted",
            ErrorCode::EcAgain => "would block",
            ErrorCode::EcNomem => "out of memory",
            ErrorCode::EcExist => "entry exists",
            ErrorCode::EcNotdir => "not a directory",
            ErrorCode::EcIsdir => "is a directory",
            ErrorCode::EcInval => "invalid argument",
            ErrorCode::EcMfile => "too many open files",
            ErrorCode::EcNospc => "no space left",
            ErrorCode::EcRofs => "read-only file system",
            ErrorCode::EcBadf => "bad file descriptor",
            ErrorCode::EcNoexec => "not an executable",
        }
    }
}

/// Map a `KernelResult<u64>` onto the accumulator-register convention.
#[inline]
pub fn syscall_result_to_i64(res: Result<u64, ErrorCode>) -> i64 {
    match res {
        Ok(v) => v as i64,
        Err(ec) => ec.as_syscall_return(),
    }
}
