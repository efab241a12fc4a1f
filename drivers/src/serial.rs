//! COM1 serial driver, the klog backend once initialised.

use core::fmt;

use phobos_lib::klog::klog_register_backend;
use phobos_lib::IrqMutex;

#[cfg(target_os = "none")]
mod imp {
    use super::*;
    use uart_16550::SerialPort;

    static COM1_PORT: IrqMutex<Option<SerialPort>> = IrqMutex::new(None);

    pub fn init() {
        let mut guard = COM1_PORT.lock();
        if guard.is_some() {
            return;
        }
        // SAFETY: 0x3F8 is the standard COM1 base on PC hardware.
        let mut port = unsafe { SerialPort::new(phobos_lib::ports::COM1) };
        port.init();
        *guard = Some(port);
        drop(guard);

        klog_register_backend(serial_backend);
    }

    /// One whole log line under one lock acquisition, newline appended.
    fn serial_backend(args: fmt::Arguments<'_>) {
        use fmt::Write;
        let mut guard = COM1_PORT.lock();
        if let Some(port) = guard.as_mut() {
            let _ = port.write_fmt(args);
            let _ = port.write_str("\r\n");
        }
    }
}

#[cfg(not(target_os = "none"))]
mod imp {
    use super::*;

    static COM1_PORT: IrqMutex<Option<()>> = IrqMutex::new(None);

    pub fn init() {
        *COM1_PORT.lock() = Some(());
        klog_register_backend(|_args: fmt::Arguments<'_>| {});
    }
}

pub use imp::init;
