//! PS/2 keyboard and mouse.
//!
//! The keyboard decodes scan-code set 1 into the `u16` key encoding user
//! space sees through `/dev/keyboard`: high byte is the functional-key
//! flag, low byte is ASCII. Decoded events are pushed into sinks the kernel
//! registers at boot (the `/dev` FIFOs).

use phobos_abi::fs::KEY_FUNCTIONAL_FLAG;
use spin::Once;

/// Functional keys, delivered with [`KEY_FUNCTIONAL_FLAG`] set.
pub const KEY_ENTER: u8 = 0x1C;
pub const KEY_BACKSPACE: u8 = 0x0E;
pub const KEY_ESC: u8 = 0x01;
pub const KEY_UP: u8 = 0x48;
pub const KEY_DOWN: u8 = 0x50;
pub const KEY_LEFT: u8 = 0x4B;
pub const KEY_RIGHT: u8 = 0x4D;
pub const KEY_PGUP: u8 = 0x49;
pub const KEY_PGDOWN: u8 = 0x51;
pub const KEY_HOME: u8 = 0x47;
pub const KEY_END: u8 = 0x4F;
pub const KEY_TAB: u8 = 0x0F;

const SCANCODE_RELEASE_BIT: u8 = 0x80;

/// Scan-code set 1, unshifted layer.
const ASCII_LOWER: [u8; 0x3B] = [
    0, 0, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0, 0, b'q',
    b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', 0, 0, b'a', b's', b'd',
    b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v',
    b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ', 0,
];

/// Shifted layer.
const ASCII_UPPER: [u8; 0x3B] = [
    0, 0, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0, 0, b'Q',
    b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', 0, 0, b'A', b'S', b'D',
    b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0, b'|', b'Z', b'X', b'C', b'V', b'B',
    b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ', 0,
];

const SCANCODE_LSHIFT: u8 = 0x2A;
const SCANCODE_RSHIFT: u8 = 0x36;

/// Stateful set-1 decoder; one lives behind the keyboard ISR.
pub struct ScanCodeSet1Decoder {
    shift_held: bool,
}

impl ScanCodeSet1Decoder {
    pub const fn new() -> Self {
        Self { shift_held: false }
    }

    /// Feed one raw byte; returns a user-space key code on key press.
    pub fn decode(&mut self, scancode: u8) -> Option<u16> {
        let released = scancode & SCANCODE_RELEASE_BIT != 0;
        let code = scancode & !SCANCODE_RELEASE_BIT;

        if code == SCANCODE_LSHIFT || code == SCANCODE_RSHIFT {
            self.shift_held = !released;
            return None;
        }
        if released {
            return None;
        }

        let ascii = if (code as usize) < ASCII_LOWER.len() {
            if self.shift_held {
                ASCII_UPPER[code as usize]
            } else {
                ASCII_LOWER[code as usize]
            }
        } else {
            0
        };

        if ascii != 0 {
            Some(ascii as u16)
        } else {
            Some(KEY_FUNCTIONAL_FLAG | code as u16)
        }
    }
}

impl Default for ScanCodeSet1Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Key sink: receives decoded key codes from the keyboard ISR.
static ON_KEY: Once<fn(u16)> = Once::new();
/// Mouse sink: receives raw 3-byte packets from the mouse ISR.
static ON_MOUSE: Once<fn([u8; 3])> = Once::new();

pub fn set_on_key(hook: fn(u16)) {
    ON_KEY.call_once(|| hook);
}

pub fn set_on_mouse(hook: fn([u8; 3])) {
    ON_MOUSE.call_once(|| hook);
}

#[cfg(target_os = "none")]
mod imp {
    use super::*;
    use phobos_lib::ports::{inb, outb};
    use phobos_lib::IrqMutex;

    const PS2_DATA: u16 = 0x60;
    const PS2_STATUS_CMD: u16 = 0x64;

    static DECODER: IrqMutex<ScanCodeSet1Decoder> = IrqMutex::new(ScanCodeSet1Decoder::new());
    static MOUSE_PACKET: IrqMutex<([u8; 3], usize)> = IrqMutex::new(([0; 3], 0));

    /// Enable the auxiliary (mouse) device and streaming.
    pub fn init() {
        unsafe {
            outb(PS2_STATUS_CMD, 0xA8); // enable aux port
            outb(PS2_STATUS_CMD, 0x20); // read command byte
            let cmd = inb(PS2_DATA) | 0x02; // enable IRQ12
            outb(PS2_STATUS_CMD, 0x60);
            outb(PS2_DATA, cmd);
            outb(PS2_STATUS_CMD, 0xD4); // next byte to aux
            outb(PS2_DATA, 0xF4); // enable data reporting
            let _ = inb(PS2_DATA); // ack
        }
    }

    /// IRQ1 vector body.
    pub fn on_keyboard_interrupt() {
        let scancode = unsafe { inb(PS2_DATA) };
        let key = DECODER.lock().decode(scancode);
        if let (Some(key), Some(hook)) = (key, ON_KEY.get()) {
            hook(key);
        }
    }

    /// IRQ12 vector body; mouse bytes arrive one per interrupt.
    pub fn on_mouse_interrupt() {
        let byte = unsafe { inb(PS2_DATA) };
        let mut guard = MOUSE_PACKET.lock();
        let (ref mut packet, ref mut filled) = *guard;
        packet[*filled] = byte;
        *filled += 1;
        if *filled == 3 {
            let complete = *packet;
            *filled = 0;
            drop(guard);
            if let Some(hook) = ON_MOUSE.get() {
                hook(complete);
            }
        }
    }
}

#[cfg(not(target_os = "none"))]
mod imp {
    pub fn init() {}
    pub fn on_keyboard_interrupt() {}
    pub fn on_mouse_interrupt() {}
}

pub use imp::{init, on_keyboard_interrupt, on_mouse_interrupt};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_letters_and_shift_layer() {
        let mut dec = ScanCodeSet1Decoder::new();
        assert_eq!(dec.decode(0x10), Some(b'q' as u16));
        assert_eq!(dec.decode(SCANCODE_LSHIFT), None);
        assert_eq!(dec.decode(0x10), Some(b'Q' as u16));
        assert_eq!(dec.decode(SCANCODE_LSHIFT | SCANCODE_RELEASE_BIT), None);
        assert_eq!(dec.decode(0x10), Some(b'q' as u16));
    }

    #[test]
    fn key_release_produces_nothing() {
        let mut dec = ScanCodeSet1Decoder::new();
        assert_eq!(dec.decode(0x10 | SCANCODE_RELEASE_BIT), None);
    }

    #[test]
    fn functional_keys_carry_flag() {
        let mut dec = ScanCodeSet1Decoder::new();
        assert_eq!(
            dec.decode(KEY_ENTER),
            Some(KEY_FUNCTIONAL_FLAG | KEY_ENTER as u16)
        );
        assert_eq!(
            dec.decode(KEY_UP),
            Some(KEY_FUNCTIONAL_FLAG | KEY_UP as u16)
        );
    }
}
