//! Device glue the kernel binary owns: the ATA block-device adapter and
//! the input-event sinks feeding the `/dev` FIFOs.

use alloc::sync::Arc;

use phobos_abi::error::{ErrorCode, KernelResult};
use phobos_drivers::ata::AtaDevice;
use phobos_fs::blockdev::{BlockDevice, SECTOR_SIZE};
use phobos_fs::ramfs::RamFifoEntry;
use spin::Once;

/// Adapts an ATA drive to the sector trait the FAT32 engine consumes.
pub struct AtaBlockDevice {
    device: AtaDevice,
}

impl AtaBlockDevice {
    pub fn new(device: AtaDevice) -> Self {
        Self { device }
    }
}

impl BlockDevice for AtaBlockDevice {
    fn read_sector(&self, lba: u32, out: &mut [u8]) -> KernelResult<()> {
        self.device.read28(lba, out).map_err(|_| ErrorCode::EcInval)
    }

    fn write_sector(&self, lba: u32, data: &[u8]) -> KernelResult<()> {
        self.device.write28(lba, data).map_err(|_| ErrorCode::EcInval)
    }

    fn sector_count(&self) -> u32 {
        // 28-bit LBA ceiling; the partition table bounds actual use.
        (1 << 28) / SECTOR_SIZE as u32
    }
}

static KEYBOARD_FIFO: Once<Arc<RamFifoEntry>> = Once::new();
static MOUSE_FIFO: Once<Arc<RamFifoEntry>> = Once::new();

pub fn register_input_fifos(keyboard: Arc<RamFifoEntry>, mouse: Arc<RamFifoEntry>) {
    KEYBOARD_FIFO.call_once(|| keyboard);
    MOUSE_FIFO.call_once(|| mouse);
}

/// Keyboard ISR sink: two little-endian bytes per key code. Called from
/// interrupt context, so a full FIFO silently drops and parked readers are
/// re-queued rather than switched to.
pub fn on_key_event(key: u16) {
    if let Some(fifo) = KEYBOARD_FIFO.get() {
        let _ = fifo.write(&key.to_le_bytes());
        phobos_core::scheduler::manager::wake_tasks(&fifo.take_waiting_readers());
    }
}

/// Mouse ISR sink: raw 3-byte packets, same overflow policy.
pub fn on_mouse_packet(packet: [u8; 3]) {
    if let Some(fifo) = MOUSE_FIFO.get() {
        let _ = fifo.write(&packet);
        phobos_core::scheduler::manager::wake_tasks(&fifo.take_waiting_readers());
    }
}
