//! Syscall numbers for the `syscall`-instruction gate and the legacy
//! `int 0x80` gate.
//!
//! POSIX-ish numbers follow the Linux x86-64 table where an equivalent
//! exists; kernel-specific operations live at 500+.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum SysCallNumber {
    FileRead = 0,
    FileWrite = 1,
    FileOpen = 2,
    FileClose = 3,
    FileStat = 4,
    FileSeek = 8,
    Nanosleep = 35,
    Exit = 60,
    FileTruncate = 76,
    GetCwd = 79,
    Chdir = 80,
    FileRename = 82,
    FileMkdir = 83,
    FileRmdir = 84,
    FileCreat = 85,
    FileUnlink = 87,
    ClockGettime = 228,
    ExitGroup = 231,

    VgaCursorSetVisible = 500,
    VgaCursorSetPos = 501,
    VgaSetCharAt = 502,
    VgaFlushCharBuffer = 503,
    VgaGetWidthHeight = 504,

    FileEnumerate = 600,
    ElfRun = 700,
    TaskLightweightRun = 701,
    TaskWait = 800,
}

impl SysCallNumber {
    pub fn from_raw(raw: u64) -> Option<Self> {
        Some(match raw {
            0 => SysCallNumber::FileRead,
            1 => SysCallNumber::FileWrite,
            2 => SysCallNumber::FileOpen,
            3 => SysCallNumber::FileClose,
            4 => SysCallNumber::FileStat,
            8 => SysCallNumber::FileSeek,
            35 => SysCallNumber::Nanosleep,
            60 => SysCallNumber::Exit,
            76 => SysCallNumber::FileTruncate,
            79 => SysCallNumber::GetCwd,
            80 => SysCallNumber::Chdir,
            82 => SysCallNumber::FileRename,
            83 => SysCallNumber::FileMkdir,
            84 => SysCallNumber::FileRmdir,
            85 => SysCallNumber::FileCreat,
            87 => SysCallNumber::FileUnlink,
            228 => SysCallNumber::ClockGettime,
            231 => SysCallNumber::ExitGroup,
            500 => SysCallNumber::VgaCursorSetVisible,
            501 => SysCallNumber::VgaCursorSetPos,
            502 => SysCallNumber::VgaSetCharAt,
            503 => SysCallNumber::VgaFlushCharBuffer,
            504 => SysCallNumber::VgaGetWidthHeight,
            600 => SysCallNumber::FileEnumerate,
            700 => SysCallNumber::ElfRun,
            701 => SysCallNumber::TaskLightweightRun,
            800 => SysCallNumber::TaskWait,
            _ => return None,
        })
    }
}

/// Reduced set accepted by the legacy `int 0x80` trap gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum Int80SysCallNumber {
    Exit = 1,
    Nanosleep = 162,
    ExitGroup = 252,
}

impl Int80SysCallNumber {
    pub fn from_raw(raw: u64) -> Option<Self> {
        Some(match raw {
            1 => Int80SysCallNumber::Exit,
            162 => Int80SysCallNumber::Nanosleep,
            252 => Int80SysCallNumber::ExitGroup,
            _ => return None,
        })
    }
}

/// `clock_gettime` clock ids. Only the monotonic clock is served.
pub const CLOCK_MONOTONIC: u64 = 1;

/// Seek whence values.
pub const SEEK_SET: u64 = 0;
pub const SEEK_CUR: u64 = 1;
pub const SEEK_END: u64 = 2;
