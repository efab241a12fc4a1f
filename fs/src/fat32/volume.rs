//! One mountable FAT32 volume: BPB geometry, root directory, and the
//! path-level operations the VFS mountpoint forwards to.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use phobos_abi::error::{ErrorCode, KernelResult};
use phobos_lib::klog_info;
use phobos_lib::string::rtrim;

use super::cluster_chain::Fat32ClusterChain;
use super::data::Fat32Data;
use super::entry::Fat32Entry;
use super::table::Fat32Table;
use super::utils::{fits_8_3, make_8_3_truncated};
use super::{CLUSTER_END_OF_CHAIN, CLUSTER_UNUSED};
use crate::blockdev::{BlockDevice, SECTOR_SIZE};
use crate::vfs::path;

/// The BPB fields the engine needs, read from the volume boot record.
#[derive(Clone, Copy)]
struct VolumeBootRecord {
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    reserved_sectors: u16,
    fat_copies: u8,
    fat_size_in_sectors: u32,
    root_cluster: u32,
    label: [u8; 11],
}

impl VolumeBootRecord {
    fn parse(sector: &[u8; SECTOR_SIZE]) -> Self {
        Self {
            bytes_per_sector: u16::from_le_bytes([sector[11], sector[12]]),
            sectors_per_cluster: sector[13],
            reserved_sectors: u16::from_le_bytes([sector[14], sector[15]]),
            fat_copies: sector[16],
            fat_size_in_sectors: u32::from_le_bytes([
                sector[36], sector[37], sector[38], sector[39],
            ]),
            root_cluster: u32::from_le_bytes([sector[44], sector[45], sector[46], sector[47]]),
            label: sector[71..82].try_into().unwrap(),
        }
    }
}

#[derive(Clone, Copy)]
pub struct Fat32Volume {
    table: Fat32Table,
    data: Fat32Data,
    root_cluster: u32,
    label: [u8; 11],
    size_in_sectors: u32,
}

impl Fat32Volume {
    /// Read the volume boot record at `partition_start_lba` and derive the
    /// table/data geometry.
    pub fn new(
        dev: &'static dyn BlockDevice,
        partition_start_lba: u32,
        partition_size_in_sectors: u32,
    ) -> KernelResult<Self> {
        let mut sector = [0u8; SECTOR_SIZE];
        dev.read_sector(partition_start_lba, &mut sector)?;
        let vbr = VolumeBootRecord::parse(&sector);

        if vbr.bytes_per_sector as usize != SECTOR_SIZE
            || vbr.sectors_per_cluster == 0
            || vbr.fat_size_in_sectors == 0
        {
            return Err(ErrorCode::EcInval);
        }

        let fat_start = partition_start_lba + vbr.reserved_sectors as u32;
        let data_start = fat_start + vbr.fat_copies as u32 * vbr.fat_size_in_sectors;

        Ok(Self {
            table: Fat32Table::new(
                dev,
                fat_start,
                vbr.fat_size_in_sectors,
                vbr.sectors_per_cluster,
            ),
            data: Fat32Data::new(dev, data_start, vbr.sectors_per_cluster),
            root_cluster: vbr.root_cluster,
            label: vbr.label,
            size_in_sectors: partition_size_in_sectors,
        })
    }

    pub fn label(&self) -> String {
        let trimmed = rtrim(&self.label);
        if trimmed.is_empty() {
            "NONAME".to_string()
        } else {
            core::str::from_utf8(trimmed).unwrap_or("NONAME").to_string()
        }
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_sectors as u64 * SECTOR_SIZE as u64
    }

    pub fn used_space_in_clusters(&self) -> u32 {
        self.table.used_clusters_count()
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.table.bytes_per_cluster()
    }

    /// The synthetic root entry; it has no record in any parent.
    pub fn root_entry(&self) -> Fat32Entry {
        Fat32Entry::new(
            self.table,
            self.data,
            String::from("/"),
            0,
            true,
            self.root_cluster,
            CLUSTER_UNUSED,
            0,
        )
    }

    /// Walk `unix_path` down from the root. Empty and `/` paths yield the
    /// root itself.
    pub fn get_entry(&self, unix_path: &str) -> KernelResult<Fat32Entry> {
        let mut entry = self.root_entry();
        for segment in path::segments(unix_path) {
            if !entry.is_directory() {
                return Err(ErrorCode::EcNotdir);
            }
            entry = entry.get_entry(segment).ok_or(ErrorCode::EcNoent)?;
        }
        Ok(entry)
    }

    /// Resolve the directory that holds the last path segment.
    fn get_parent_dir(&self, unix_path: &str) -> KernelResult<Fat32Entry> {
        self.get_entry(path::parent(unix_path))
    }

    /// Pick the stored name: 8.3 as-is, long names truncated to `NAME~N.EXT`
    /// with the first free `N` in `parent`.
    fn storable_name(&self, parent: &Fat32Entry, filename: &str) -> KernelResult<String> {
        if fits_8_3(filename) {
            return Ok(filename.to_string());
        }
        for n in 1..=u8::MAX {
            let candidate = make_8_3_truncated(filename, n);
            if parent.get_entry(&candidate).is_none() {
                return Ok(candidate);
            }
        }
        Err(ErrorCode::EcExist)
    }

    /// Create a file or directory at `unix_path`.
    pub fn create_entry(&self, unix_path: &str, is_directory: bool) -> KernelResult<Fat32Entry> {
        let filename = path::file_name(unix_path);
        if filename.is_empty() {
            return Err(ErrorCode::EcInval);
        }

        let mut parent = self.get_parent_dir(unix_path)?;
        if !parent.is_directory() {
            return Err(ErrorCode::EcNotdir);
        }
        if parent.get_entry(filename).is_some() {
            return Err(ErrorCode::EcExist);
        }

        let name = self.storable_name(&parent, filename)?;
        let mut entry = Fat32Entry::new(
            self.table,
            self.data,
            name,
            0,
            is_directory,
            CLUSTER_UNUSED,
            CLUSTER_UNUSED,
            0,
        );

        if !parent.alloc_entry_in_directory(&mut entry) {
            return Err(ErrorCode::EcNospc);
        }
        if is_directory && !entry.alloc_dot_dot_entries() {
            return Err(ErrorCode::EcNospc);
        }
        Ok(entry)
    }

    /// Delete the file or empty directory at `unix_path`.
    pub fn delete_entry(&self, unix_path: &str) -> KernelResult<()> {
        if path::is_root(unix_path) {
            return Err(ErrorCode::EcInval);
        }

        let entry = self.get_entry(unix_path)?;
        if entry.is_directory() && !entry.is_directory_empty() {
            return Err(ErrorCode::EcInval);
        }

        // Content clusters first, then the record.
        if entry.data_head() != CLUSTER_UNUSED {
            self.table.free_cluster_chain(entry.data_head());
        }

        let mut parent = self.get_parent_dir(unix_path)?;
        if parent.dealloc_entry_in_directory(&entry, self.root_cluster) {
            Ok(())
        } else {
            Err(ErrorCode::EcInval)
        }
    }

    /// Move or rename within this volume. The record moves; the cluster
    /// chain never does.
    pub fn move_entry(&self, path_from: &str, path_to: &str) -> KernelResult<()> {
        if path::is_root(path_from) {
            return Err(ErrorCode::EcInval);
        }

        let source = self.get_entry(path_from)?;

        // A destination that is an existing directory receives the entry
        // under its own name.
        let (dst_parent_path, dst_name) = match self.get_entry(path_to) {
            Ok(e) if e.is_directory() => (path_to, source.name().to_string()),
            Ok(_) => return Err(ErrorCode::EcExist),
            Err(_) => (path::parent(path_to), path::file_name(path_to).to_string()),
        };

        let mut dst_parent = self.get_entry(dst_parent_path)?;
        if !dst_parent.is_directory() {
            return Err(ErrorCode::EcNotdir);
        }
        if dst_parent.get_entry(&dst_name).is_some() {
            return Err(ErrorCode::EcExist);
        }

        let mut src_parent = self.get_parent_dir(path_from)?;
        let same_directory = src_parent.data_head() == dst_parent.data_head();

        if same_directory {
            // Rename in place: rewrite the record under the new name.
            let mut renamed = source.clone();
            renamed.set_name(self.storable_name(&dst_parent, &dst_name)?);
            if renamed.update_entry_info_in_parent_dir() {
                Ok(())
            } else {
                Err(ErrorCode::EcInval)
            }
        } else {
            // Re-home the record: new record points at the same chain, old
            // record is released without touching content clusters.
            let name = self.storable_name(&dst_parent, &dst_name)?;
            let mut moved = Fat32Entry::new(
                self.table,
                self.data,
                name,
                source.size(),
                source.is_directory(),
                source.data_head(),
                CLUSTER_UNUSED,
                0,
            );
            if !dst_parent.alloc_entry_in_directory(&mut moved) {
                return Err(ErrorCode::EcNospc);
            }
            if !src_parent.dealloc_entry_in_directory(&source, self.root_cluster) {
                return Err(ErrorCode::EcInval);
            }
            Ok(())
        }
    }

    /// Lay down a fresh single-FAT filesystem across the whole device.
    /// Exists for the test suites and the install path.
    pub fn format(
        dev: &'static dyn BlockDevice,
        label: &str,
        sectors_per_cluster: u8,
    ) -> KernelResult<Fat32Volume> {
        let reserved_sectors: u16 = 1;
        let total_sectors = dev.sector_count();
        // One FAT sector indexes 128 clusters; size the table to cover the
        // whole device.
        let clusters = total_sectors / sectors_per_cluster as u32;
        let fat_size_in_sectors = clusters.div_ceil(SECTOR_SIZE as u32 / 4).max(1);

        let mut boot = [0u8; SECTOR_SIZE];
        boot[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        boot[13] = sectors_per_cluster;
        boot[14..16].copy_from_slice(&reserved_sectors.to_le_bytes());
        boot[16] = 1; // single FAT copy
        boot[36..40].copy_from_slice(&fat_size_in_sectors.to_le_bytes());
        boot[44..48].copy_from_slice(&2u32.to_le_bytes()); // root at cluster 2
        let mut label_field = [b' '; 11];
        for (dst, &src) in label_field.iter_mut().zip(label.as_bytes()) {
            *dst = src.to_ascii_uppercase();
        }
        boot[71..82].copy_from_slice(&label_field);
        boot[510] = 0x55;
        boot[511] = 0xAA;
        dev.write_sector(0, &boot)?;

        // Clear the FAT, then reserve entries 0 and 1 and terminate the
        // root directory chain.
        let zeros = [0u8; SECTOR_SIZE];
        for s in 0..fat_size_in_sectors {
            dev.write_sector(reserved_sectors as u32 + s, &zeros)?;
        }
        let mut fat0 = [0u8; SECTOR_SIZE];
        fat0[0..4].copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes());
        fat0[4..8].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        fat0[8..12].copy_from_slice(&CLUSTER_END_OF_CHAIN.to_le_bytes());
        dev.write_sector(reserved_sectors as u32, &fat0)?;

        let volume = Fat32Volume::new(dev, 0, total_sectors)?;
        // A zeroed root cluster reads as an immediate no-more marker.
        volume.data.clear_data_cluster(volume.root_cluster);
        klog_info!(
            "fat32: formatted '{}', {} sectors, {} per cluster",
            volume.label(),
            total_sectors,
            sectors_per_cluster
        );
        Ok(volume)
    }

    #[doc(hidden)]
    pub fn root_chain(&self) -> Fat32ClusterChain {
        Fat32ClusterChain::new(self.table, self.data, self.root_cluster, u32::MAX)
    }
}

/// Collect entries of a directory into names, for diagnostics and tests.
pub fn list_names(dir: &Fat32Entry) -> Vec<String> {
    let mut names = Vec::new();
    dir.enumerate_entries(&mut |e| {
        names.push(e.name().to_string());
        true
    });
    names
}
