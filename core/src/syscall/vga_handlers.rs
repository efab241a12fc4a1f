//! VGA text facade syscalls: best-effort, never blocking.

use phobos_drivers::vga;

use super::dispatch::SyscallDisposition;
use super::user;

pub fn sys_cursor_set_visible(visible: u64) -> SyscallDisposition {
    vga::set_cursor_visible(visible != 0);
    SyscallDisposition::Return(0)
}

pub fn sys_cursor_set_pos(x: u64, y: u64) -> SyscallDisposition {
    vga::set_cursor_pos(x as u16, y as u16);
    SyscallDisposition::Return(0)
}

pub fn sys_set_char_at(x: u64, y: u64, char_and_attr: u64) -> SyscallDisposition {
    vga::set_char_at(x as u16, y as u16, char_and_attr as u16);
    SyscallDisposition::Return(0)
}

pub fn sys_flush_char_buffer(buf_ptr: u64) -> SyscallDisposition {
    let cells = vga::VGA_WIDTH as u64 * vga::VGA_HEIGHT as u64;
    match user::user_slice(buf_ptr, cells * 2) {
        Ok(_) => {
            let chars =
                unsafe { core::slice::from_raw_parts(buf_ptr as *const u16, cells as usize) };
            vga::flush_char_buffer(chars);
            SyscallDisposition::Return(0)
        }
        Err(ec) => SyscallDisposition::Return(ec.as_syscall_return()),
    }
}

pub fn sys_get_width_height(width_ptr: u64, height_ptr: u64) -> SyscallDisposition {
    let (width, height) = vga::width_height();
    let _ = user::write_user(width_ptr, &width);
    let _ = user::write_user(height_ptr, &height);
    SyscallDisposition::Return(0)
}
