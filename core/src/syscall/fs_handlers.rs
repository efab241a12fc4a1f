//! File and path syscall handlers, forwarding to the VFS facade.

use alloc::string::String;

use phobos_abi::error::{ErrorCode, KernelResult};
use phobos_abi::fs::{UserDirEntry, UserStat};
use phobos_abi::syscall::{SEEK_CUR, SEEK_END, SEEK_SET};

use phobos_fs::vfs::open_table::{
    self, vfs_absolute, vfs_close, vfs_create, vfs_enumerate, vfs_exists, vfs_fd_fifo, vfs_move,
    vfs_open, vfs_position, vfs_read, vfs_remove, vfs_seek, vfs_size, vfs_stat, vfs_truncate,
    vfs_write,
};

use super::dispatch::SyscallDisposition;
use super::user;
use crate::scheduler::manager::{
    block_current_task, current_cwd, set_current_cwd, task_current_id, wake_tasks,
};

/// Open flag subset honoured by `open(path, flags, mode)`.
const O_CREAT: u64 = 0x40;

fn ret(result: KernelResult<u64>) -> SyscallDisposition {
    SyscallDisposition::Return(phobos_abi::error::syscall_result_to_i64(result))
}

fn absolute(user_path: u64) -> KernelResult<String> {
    let raw = user::user_cstr(user_path)?;
    Ok(vfs_absolute(&current_cwd(), &raw))
}

/// Read; an empty FIFO parks the caller on the FIFO's reader list and
/// re-executes the syscall after the next write.
pub fn sys_read(fd: u64, buf: u64, count: u64) -> SyscallDisposition {
    let out = match user::user_slice_mut(buf, count) {
        Ok(slice) => slice,
        Err(ec) => return SyscallDisposition::Return(ec.as_syscall_return()),
    };

    match vfs_read(fd as u32, out) {
        Ok(n) => SyscallDisposition::Return(n as i64),
        Err(ErrorCode::EcAgain) => match vfs_fd_fifo(fd as u32) {
            Some(fifo) => {
                fifo.add_waiting_reader(task_current_id());
                block_current_task();
                SyscallDisposition::Block { restart: true }
            }
            None => SyscallDisposition::Return(ErrorCode::EcAgain.as_syscall_return()),
        },
        Err(ec) => SyscallDisposition::Return(ec.as_syscall_return()),
    }
}

/// Write; a full FIFO returns would-block, a successful FIFO write wakes
/// parked readers.
pub fn sys_write(fd: u64, buf: u64, count: u64) -> SyscallDisposition {
    let data = match user::user_slice(buf, count) {
        Ok(slice) => slice,
        Err(ec) => return SyscallDisposition::Return(ec.as_syscall_return()),
    };

    let result = vfs_write(fd as u32, data);
    if result.is_ok() {
        if let Some(fifo) = vfs_fd_fifo(fd as u32) {
            wake_tasks(&fifo.take_waiting_readers());
        }
    }
    ret(result)
}

pub fn sys_open(path: u64, flags: u64, _mode: u64) -> SyscallDisposition {
    let path = match absolute(path) {
        Ok(p) => p,
        Err(ec) => return SyscallDisposition::Return(ec.as_syscall_return()),
    };

    if flags & O_CREAT != 0 && !vfs_exists(&path) {
        if let Err(ec) = vfs_create(&path, false) {
            return SyscallDisposition::Return(ec.as_syscall_return());
        }
    }
    ret(vfs_open(&path).map(|fd| fd as u64))
}

pub fn sys_close(fd: u64) -> SyscallDisposition {
    ret(vfs_close(fd as u32).map(|_| 0))
}

pub fn sys_stat(path: u64, out_ptr: u64) -> SyscallDisposition {
    let result = absolute(path)
        .and_then(|p| vfs_stat(&p))
        .and_then(|stat: UserStat| user::write_user(out_ptr, &stat).map(|_| 0));
    ret(result)
}

pub fn sys_seek(fd: u64, offset: u64, whence: u64) -> SyscallDisposition {
    let fd = fd as u32;
    let target = match whence {
        SEEK_SET => Ok(offset),
        SEEK_CUR => vfs_position(fd).map(|pos| pos.wrapping_add(offset)),
        SEEK_END => vfs_size(fd).map(|size| size.wrapping_add(offset)),
        _ => Err(ErrorCode::EcInval),
    };
    ret(target.and_then(|pos| vfs_seek(fd, pos).map(|_| pos)))
}

pub fn sys_truncate(path: u64, new_size: u64) -> SyscallDisposition {
    ret(absolute(path).and_then(|p| vfs_truncate(&p, new_size).map(|_| 0)))
}

pub fn sys_creat(path: u64) -> SyscallDisposition {
    ret(absolute(path).and_then(|p| vfs_create(&p, false).map(|_| 0)))
}

pub fn sys_mkdir(path: u64) -> SyscallDisposition {
    ret(absolute(path).and_then(|p| vfs_create(&p, true).map(|_| 0)))
}

pub fn sys_unlink(path: u64) -> SyscallDisposition {
    ret(absolute(path).and_then(|p| vfs_remove(&p).map(|_| 0)))
}

pub fn sys_rename(from: u64, to: u64) -> SyscallDisposition {
    let result = absolute(from).and_then(|src| {
        absolute(to).and_then(|dst| vfs_move(&src, &dst).map(|_| 0))
    });
    ret(result)
}

/// Snapshot a directory into caller-owned records.
pub fn sys_enumerate(fd: u64, out_ptr: u64, max_entries: u64) -> SyscallDisposition {
    let max = max_entries.min(256) as usize;
    let byte_len = (max * size_of::<UserDirEntry>()) as u64;
    if out_ptr % align_of::<UserDirEntry>() as u64 != 0
        || user::user_slice_mut(out_ptr, byte_len).is_err()
    {
        return SyscallDisposition::Return(ErrorCode::EcInval.as_syscall_return());
    }
    let records =
        unsafe { core::slice::from_raw_parts_mut(out_ptr as *mut UserDirEntry, max) };
    ret(vfs_enumerate(fd as u32, records).map(|count| count as u64))
}

pub fn sys_get_cwd(buf: u64, len: u64) -> SyscallDisposition {
    let cwd = current_cwd();
    let needed = cwd.len() as u64 + 1;
    if len < needed {
        return SyscallDisposition::Return(ErrorCode::EcInval.as_syscall_return());
    }
    let out = match user::user_slice_mut(buf, needed) {
        Ok(slice) => slice,
        Err(ec) => return SyscallDisposition::Return(ec.as_syscall_return()),
    };
    out[..cwd.len()].copy_from_slice(cwd.as_bytes());
    out[cwd.len()] = 0;
    SyscallDisposition::Return(cwd.len() as i64)
}

pub fn sys_chdir(path: u64) -> SyscallDisposition {
    let result = absolute(path).and_then(|p| {
        let stat = vfs_stat(&p)?;
        if stat.st_mode & phobos_abi::fs::ST_MODE_DIR == 0 {
            return Err(ErrorCode::EcNotdir);
        }
        set_current_cwd(&p);
        Ok(0)
    });
    ret(result)
}

/// Re-exported so the boot code can pre-open the standard descriptors.
pub fn kernel_open(path: &str) -> KernelResult<u32> {
    open_table::vfs_open(path)
}
