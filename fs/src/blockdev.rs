//! Sector-granular block device seam between the FAT32 engine and the disk
//! drivers.
//!
//! The engine only ever needs whole-sector transfers at 28-bit LBAs. The
//! RAM-backed device exists for the test suites; the ATA adapter lives with
//! the boot code, keeping this crate free of hardware knowledge.

use alloc::vec;
use alloc::vec::Vec;

use phobos_abi::error::{ErrorCode, KernelResult};
use phobos_lib::IrqMutex;

pub const SECTOR_SIZE: usize = 512;

pub trait BlockDevice: Send + Sync {
    /// Read one 512-byte sector.
    fn read_sector(&self, lba: u32, out: &mut [u8]) -> KernelResult<()>;

    /// Write one 512-byte sector (shorter writes are zero-padded).
    fn write_sector(&self, lba: u32, data: &[u8]) -> KernelResult<()>;

    fn sector_count(&self) -> u32;
}

/// In-memory block device backing the filesystem test suites.
pub struct MemoryBlockDevice {
    sectors: IrqMutex<Vec<u8>>,
    count: u32,
}

impl MemoryBlockDevice {
    pub fn new(sector_count: u32) -> Self {
        Self {
            sectors: IrqMutex::new(vec![0u8; sector_count as usize * SECTOR_SIZE]),
            count: sector_count,
        }
    }

    /// Leak into a `'static` handle, the lifetime a mounted volume needs.
    pub fn new_static(sector_count: u32) -> &'static Self {
        alloc::boxed::Box::leak(alloc::boxed::Box::new(Self::new(sector_count)))
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn read_sector(&self, lba: u32, out: &mut [u8]) -> KernelResult<()> {
        if lba >= self.count || out.len() > SECTOR_SIZE {
            return Err(ErrorCode::EcInval);
        }
        let sectors = self.sectors.lock();
        let start = lba as usize * SECTOR_SIZE;
        out.copy_from_slice(&sectors[start..start + out.len()]);
        Ok(())
    }

    fn write_sector(&self, lba: u32, data: &[u8]) -> KernelResult<()> {
        if lba >= self.count || data.len() > SECTOR_SIZE {
            return Err(ErrorCode::EcInval);
        }
        let mut sectors = self.sectors.lock();
        let start = lba as usize * SECTOR_SIZE;
        sectors[start..start + data.len()].copy_from_slice(data);
        for b in sectors[start + data.len()..start + SECTOR_SIZE].iter_mut() {
            *b = 0;
        }
        Ok(())
    }

    fn sector_count(&self) -> u32 {
        self.count
    }
}
