//! VGA text-mode facade: exactly the surface the vga_* syscalls consume.
//!
//! Writes are best-effort and non-blocking; both tasks and ISRs may call in.

use phobos_abi::addr::PhysAddr;

pub const VGA_WIDTH: u16 = 80;
pub const VGA_HEIGHT: u16 = 25;

const VGA_TEXT_BUFFER_PHYS: u64 = 0xB8000;

#[cfg(target_os = "none")]
mod imp {
    use super::*;
    use phobos_lib::ports::outb;

    fn buffer() -> *mut u16 {
        PhysAddr::new(VGA_TEXT_BUFFER_PHYS).to_virt().as_mut_ptr()
    }

    pub fn set_char_at(x: u16, y: u16, char_and_attr: u16) {
        if x >= VGA_WIDTH || y >= VGA_HEIGHT {
            return;
        }
        let offset = y as usize * VGA_WIDTH as usize + x as usize;
        // SAFETY: offset bounds-checked against the 80x25 text buffer.
        unsafe { buffer().add(offset).write_volatile(char_and_attr) };
    }

    pub fn get_char_at(x: u16, y: u16) -> u16 {
        if x >= VGA_WIDTH || y >= VGA_HEIGHT {
            return 0;
        }
        let offset = y as usize * VGA_WIDTH as usize + x as usize;
        unsafe { buffer().add(offset).read_volatile() }
    }

    /// Blit a full 80x25 character buffer at once.
    pub fn flush_char_buffer(chars: &[u16]) {
        let count = chars.len().min(VGA_WIDTH as usize * VGA_HEIGHT as usize);
        let dst = buffer();
        for (i, &c) in chars.iter().enumerate().take(count) {
            unsafe { dst.add(i).write_volatile(c) };
        }
    }

    pub fn set_cursor_visible(visible: bool) {
        unsafe {
            outb(0x3D4, 0x0A);
            outb(0x3D5, if visible { 0x0E } else { 0x20 });
        }
    }

    pub fn set_cursor_pos(x: u16, y: u16) {
        if x >= VGA_WIDTH || y >= VGA_HEIGHT {
            return;
        }
        let pos = y * VGA_WIDTH + x;
        unsafe {
            outb(0x3D4, 0x0F);
            outb(0x3D5, pos as u8);
            outb(0x3D4, 0x0E);
            outb(0x3D5, (pos >> 8) as u8);
        }
    }
}

#[cfg(not(target_os = "none"))]
mod imp {
    use super::*;

    pub fn set_char_at(_x: u16, _y: u16, _c: u16) {
        let _ = PhysAddr::new(VGA_TEXT_BUFFER_PHYS);
    }

    pub fn get_char_at(_x: u16, _y: u16) -> u16 {
        0
    }

    pub fn flush_char_buffer(_chars: &[u16]) {}
    pub fn set_cursor_visible(_visible: bool) {}
    pub fn set_cursor_pos(_x: u16, _y: u16) {}
}

pub use imp::{flush_char_buffer, get_char_at, set_char_at, set_cursor_pos, set_cursor_visible};

pub fn width_height() -> (u16, u16) {
    (VGA_WIDTH, VGA_HEIGHT)
}
