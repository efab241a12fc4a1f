//! User-memory access helpers.
//!
//! The caller's address space is live during a syscall, so user pointers
//! are directly dereferenceable from ring 0; unmapped pages fall into the
//! demand path. Sanity checks keep obviously bad pointers (null, kernel
//! half) out.

use alloc::string::String;
use alloc::vec::Vec;

use phobos_abi::error::{ErrorCode, KernelResult};
use phobos_abi::fs::MAX_PATH_LEN;
use phobos_mm::mm_constants::USER_SPACE_SPAN;

const MAX_ARGV: usize = 16;

fn range_plausible(ptr: u64, len: u64) -> bool {
    // Kernel callers (the legacy gate serves ring 0 too) pass kernel-half
    // pointers; user callers must stay inside their GiB.
    ptr != 0 && (ptr >= USER_SPACE_SPAN || ptr.saturating_add(len) <= USER_SPACE_SPAN)
}

pub fn user_slice<'a>(ptr: u64, len: u64) -> KernelResult<&'a [u8]> {
    if !range_plausible(ptr, len) {
        return Err(ErrorCode::EcInval);
    }
    Ok(unsafe { core::slice::from_raw_parts(ptr as *const u8, len as usize) })
}

pub fn user_slice_mut<'a>(ptr: u64, len: u64) -> KernelResult<&'a mut [u8]> {
    if !range_plausible(ptr, len) {
        return Err(ErrorCode::EcInval);
    }
    Ok(unsafe { core::slice::from_raw_parts_mut(ptr as *mut u8, len as usize) })
}

/// Copy a NUL-terminated path out of user memory.
pub fn user_cstr(ptr: u64) -> KernelResult<String> {
    if !range_plausible(ptr, 1) {
        return Err(ErrorCode::EcInval);
    }
    let mut out = String::new();
    for offset in 0..MAX_PATH_LEN as u64 {
        let b = unsafe { *((ptr + offset) as *const u8) };
        if b == 0 {
            return Ok(out);
        }
        out.push(b as char);
    }
    Err(ErrorCode::EcInval)
}

/// Copy a NULL-terminated `char*[]` of NUL-terminated strings.
pub fn user_argv(ptr: u64) -> KernelResult<Vec<String>> {
    let mut args = Vec::new();
    if ptr == 0 {
        return Ok(args);
    }
    for index in 0..MAX_ARGV as u64 {
        let slot = unsafe { *((ptr + index * 8) as *const u64) };
        if slot == 0 {
            break;
        }
        args.push(user_cstr(slot)?);
    }
    Ok(args)
}

pub fn write_user<T: Copy>(ptr: u64, value: &T) -> KernelResult<()> {
    if !range_plausible(ptr, core::mem::size_of::<T>() as u64) {
        return Err(ErrorCode::EcInval);
    }
    unsafe { core::ptr::write_unaligned(ptr as *mut T, *value) };
    Ok(())
}
