//! In-memory ring of recent kernel log output, read back by `/proc/kmsg`.

use core::fmt;

use crate::spinlock::IrqMutex;

const KMSG_CAPACITY: usize = 8192;

struct KmsgRing {
    buf: [u8; KMSG_CAPACITY],
    head: usize,
    len: usize,
}

impl KmsgRing {
    const fn new() -> Self {
        Self {
            buf: [0; KMSG_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    fn push_byte(&mut self, b: u8) {
        let tail = (self.head + self.len) % KMSG_CAPACITY;
        self.buf[tail] = b;
        if self.len < KMSG_CAPACITY {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % KMSG_CAPACITY;
        }
    }

    fn snapshot_into(&self, offset: usize, out: &mut [u8]) -> usize {
        if offset >= self.len {
            return 0;
        }
        let count = out.len().min(self.len - offset);
        for (i, slot) in out.iter_mut().enumerate().take(count) {
            *slot = self.buf[(self.head + offset + i) % KMSG_CAPACITY];
        }
        count
    }

    fn size(&self) -> usize {
        self.len
    }
}

static KMSG: IrqMutex<KmsgRing> = IrqMutex::new(KmsgRing::new());

struct KmsgWriter<'a>(&'a mut KmsgRing);

impl fmt::Write for KmsgWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &b in s.as_bytes() {
            self.0.push_byte(b);
        }
        Ok(())
    }
}

pub fn kmsg_append(args: fmt::Arguments<'_>) {
    let mut ring = KMSG.lock();
    let _ = fmt::write(&mut KmsgWriter(&mut ring), args);
    ring.push_byte(b'\n');
}

/// Copy ring content starting at `offset` into `out`; returns bytes copied.
pub fn kmsg_read(offset: usize, out: &mut [u8]) -> usize {
    KMSG.lock().snapshot_into(offset, out)
}

pub fn kmsg_size() -> usize {
    KMSG.lock().size()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_back() {
        kmsg_append(format_args!("ring test line"));
        let mut buf = [0u8; KMSG_CAPACITY];
        let n = kmsg_read(0, &mut buf);
        assert!(n > 0);
        let text = core::str::from_utf8(&buf[..n]).unwrap();
        assert!(text.contains("ring test line"));
    }
}
