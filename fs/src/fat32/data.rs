//! Sector I/O within data clusters.

use super::CLUSTER_FIRST_VALID;
use crate::blockdev::{BlockDevice, SECTOR_SIZE};

/// The data region of one volume. Copyable for the same reason as the
/// table: all instances address the same sectors.
#[derive(Clone, Copy)]
pub struct Fat32Data {
    dev: &'static dyn BlockDevice,
    data_start_lba: u32,
    sectors_per_cluster: u8,
}

impl Fat32Data {
    pub fn new(dev: &'static dyn BlockDevice, data_start_lba: u32, sectors_per_cluster: u8) -> Self {
        Self {
            dev,
            data_start_lba,
            sectors_per_cluster,
        }
    }

    pub fn sectors_per_cluster(&self) -> u8 {
        self.sectors_per_cluster
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.sectors_per_cluster as u32 * SECTOR_SIZE as u32
    }

    /// Does `byte_position` fall on the first byte of a cluster?
    pub fn is_cluster_beginning(&self, byte_position: u32) -> bool {
        byte_position % self.bytes_per_cluster() == 0
    }

    fn cluster_first_lba(&self, cluster: u32) -> u32 {
        self.data_start_lba + (cluster - CLUSTER_FIRST_VALID) * self.sectors_per_cluster as u32
    }

    /// Read one whole sector of a cluster.
    pub fn read_data_sector(&self, cluster: u32, sector_in_cluster: u8, out: &mut [u8]) -> bool {
        self.dev
            .read_sector(self.cluster_first_lba(cluster) + sector_in_cluster as u32, out)
            .is_ok()
    }

    pub fn write_data_sector(&self, cluster: u32, sector_in_cluster: u8, data: &[u8]) -> bool {
        self.dev
            .write_sector(self.cluster_first_lba(cluster) + sector_in_cluster as u32, data)
            .is_ok()
    }

    /// Read up to `out.len()` bytes from `cluster` starting at `position`
    /// (taken modulo the cluster size); stops at the cluster end. Returns
    /// bytes read.
    pub fn read_data_cluster(&self, position: u32, cluster: u32, out: &mut [u8]) -> u32 {
        let offset_in_cluster = position % self.bytes_per_cluster();
        let available = (self.bytes_per_cluster() - offset_in_cluster) as usize;
        let to_read = out.len().min(available);

        let mut sector_buf = [0u8; SECTOR_SIZE];
        let mut done = 0usize;
        while done < to_read {
            let abs = offset_in_cluster as usize + done;
            let sector_in_cluster = (abs / SECTOR_SIZE) as u8;
            let offset_in_sector = abs % SECTOR_SIZE;

            if !self.read_data_sector(cluster, sector_in_cluster, &mut sector_buf) {
                break;
            }
            let chunk = (SECTOR_SIZE - offset_in_sector).min(to_read - done);
            out[done..done + chunk]
                .copy_from_slice(&sector_buf[offset_in_sector..offset_in_sector + chunk]);
            done += chunk;
        }
        done as u32
    }

    /// Write up to `data.len()` bytes into `cluster` starting at `position`
    /// (modulo cluster size); stops at the cluster end. Partial-sector
    /// writes read-modify-write. Returns bytes written.
    pub fn write_data_cluster(&self, position: u32, cluster: u32, data: &[u8]) -> u32 {
        let offset_in_cluster = position % self.bytes_per_cluster();
        let available = (self.bytes_per_cluster() - offset_in_cluster) as usize;
        let to_write = data.len().min(available);

        let mut sector_buf = [0u8; SECTOR_SIZE];
        let mut done = 0usize;
        while done < to_write {
            let abs = offset_in_cluster as usize + done;
            let sector_in_cluster = (abs / SECTOR_SIZE) as u8;
            let offset_in_sector = abs % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - offset_in_sector).min(to_write - done);

            if chunk < SECTOR_SIZE && !self.read_data_sector(cluster, sector_in_cluster, &mut sector_buf)
            {
                break;
            }
            sector_buf[offset_in_sector..offset_in_sector + chunk]
                .copy_from_slice(&data[done..done + chunk]);
            if !self.write_data_sector(cluster, sector_in_cluster, &sector_buf) {
                break;
            }
            done += chunk;
        }
        done as u32
    }

    /// Zero a whole cluster; fresh directory clusters must not leak stale
    /// bytes into enumeration.
    pub fn clear_data_cluster(&self, cluster: u32) {
        let zeros = [0u8; SECTOR_SIZE];
        for sector in 0..self.sectors_per_cluster {
            self.write_data_sector(cluster, sector, &zeros);
        }
    }
}
