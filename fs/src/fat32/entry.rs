//! Logical FAT32 entry: a named file or directory plus the value-addressed
//! link to its 32-byte record in the parent directory.
//!
//! The parent link is a cluster-chain value and a record index, never a
//! live object reference; metadata updates (size, rename, delete markers)
//! seek to `parent_index * 32` in the parent chain and rewrite the record.

use alloc::string::String;

use phobos_lib::klog_debug;

use super::cluster_chain::{ChainCursor, Fat32ClusterChain};
use super::data::Fat32Data;
use super::dir_entry::{
    DirEntryAttrib, DirectoryEntryFat32, DIR_ENTRY_NO_MORE, DIR_ENTRY_SIZE, DIR_ENTRY_UNUSED,
};
use super::table::Fat32Table;
use super::utils::{make_8_3_space_padded, name_from_8_3};
use super::CLUSTER_UNUSED;
use crate::blockdev::SECTOR_SIZE;

const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / DIR_ENTRY_SIZE;

/// Directory chains carry no size field on disk; reads stop at the chain
/// end instead.
const DIR_CHAIN_SIZE: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnumerateResult {
    Finished,
    Stopped,
    Failed,
}

#[derive(Clone)]
pub struct Fat32Entry {
    name: String,
    is_dir: bool,
    data: Fat32ClusterChain,
    parent_data: Fat32ClusterChain,
    parent_index: u32,
}

impl Fat32Entry {
    /// Entry that corresponds to an entity in the filesystem.
    pub fn new(
        table: Fat32Table,
        data: Fat32Data,
        name: String,
        size: u32,
        is_dir: bool,
        data_cluster: u32,
        parent_data_cluster: u32,
        parent_index: u32,
    ) -> Self {
        let content_size = if is_dir { DIR_CHAIN_SIZE } else { size };
        Self {
            name,
            is_dir,
            data: Fat32ClusterChain::new(table, data, data_cluster, content_size),
            parent_data: Fat32ClusterChain::new(table, data, parent_data_cluster, DIR_CHAIN_SIZE),
            parent_index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn is_directory(&self) -> bool {
        self.is_dir
    }

    pub fn size(&self) -> u32 {
        if self.is_dir {
            0
        } else {
            self.data.size()
        }
    }

    pub fn data_head(&self) -> u32 {
        self.data.head()
    }

    pub fn parent_head(&self) -> u32 {
        self.parent_data.head()
    }

    pub fn parent_index(&self) -> u32 {
        self.parent_index
    }

    pub fn cursor(&self) -> ChainCursor {
        self.data.cursor()
    }

    /// The root directory has no record in any parent.
    fn has_parent_record(&self) -> bool {
        !self.parent_data.is_empty()
    }

    fn table(&self) -> Fat32Table {
        *self.data.table()
    }

    fn fat_data(&self) -> Fat32Data {
        *self.data.data()
    }

    /// Encode this entry as its on-disk record.
    pub fn make_directory_entry_fat32(&self) -> DirectoryEntryFat32 {
        let (name, ext) = make_8_3_space_padded(&self.name);
        let mut record = DirectoryEntryFat32::zeroed();
        record.name = name;
        record.ext = ext;
        record.attributes = if self.is_dir {
            DirEntryAttrib::DIRECTORY.bits()
        } else {
            0
        };
        record.set_first_cluster(self.data.head());
        record.size = if self.is_dir { 0 } else { self.data.size() };
        record
    }

    /// Read at the per-open cursor; directories refuse byte reads.
    pub fn read(&self, cursor: &mut ChainCursor, out: &mut [u8]) -> u32 {
        if self.is_dir {
            return 0;
        }
        self.data.read(cursor, out)
    }

    /// Write at the per-open cursor, growing the file; the parent record is
    /// rewritten whenever the size watermark moves.
    pub fn write(&mut self, cursor: &mut ChainCursor, data: &[u8]) -> u32 {
        if self.is_dir {
            return 0;
        }
        if self.data.size() as u64 + data.len() as u64 > u32::MAX as u64 {
            return 0;
        }

        let old_size = self.data.size();
        let written = self.data.write(cursor, data);
        if old_size != self.data.size() && !self.update_entry_info_in_parent_dir() {
            return 0;
        }
        written
    }

    pub fn seek(&self, cursor: &mut ChainCursor, new_position: u32) -> bool {
        if self.is_dir {
            return false;
        }
        self.data.seek(cursor, new_position)
    }

    pub fn position(&self, cursor: &ChainCursor) -> u32 {
        cursor.byte
    }

    /// Resize the file. Growth zero-fills through the write path so the
    /// size watermark and cluster chain stay consistent.
    pub fn truncate(&mut self, new_size: u32) -> bool {
        if self.is_dir {
            return false;
        }
        if new_size == self.data.size() {
            return true;
        }

        if new_size > self.data.size() {
            let mut cursor = self.data.cursor();
            if !self.data.seek(&mut cursor, self.data.size()) {
                return false;
            }
            let zeros = [0u8; SECTOR_SIZE];
            let mut remaining = new_size - self.data.size();
            while remaining > 0 {
                let count = remaining.min(SECTOR_SIZE as u32);
                if self.data.write(&mut cursor, &zeros[..count as usize]) != count {
                    return false;
                }
                remaining -= count;
            }
        } else {
            self.data.resize(new_size);
        }

        self.update_entry_info_in_parent_dir()
    }

    /// Visit every live record of this directory. Long-name, volume-id and
    /// unused records are skipped; enumeration ends at the first no-more
    /// marker even if non-zero records follow it on disk.
    pub fn enumerate_entries(
        &self,
        on_entry: &mut dyn FnMut(Fat32Entry) -> bool,
    ) -> EnumerateResult {
        if !self.is_dir {
            return EnumerateResult::Failed;
        }

        let mut sector_buf = [0u8; SECTOR_SIZE];
        let mut cursor = self.data.cursor();
        let mut entry_index = 0u32;

        loop {
            let read = self.data.read(&mut cursor, &mut sector_buf);
            if read == 0 {
                return EnumerateResult::Finished;
            }

            for slot in 0..(read as usize / DIR_ENTRY_SIZE).min(ENTRIES_PER_SECTOR) {
                let raw: [u8; DIR_ENTRY_SIZE] = sector_buf
                    [slot * DIR_ENTRY_SIZE..(slot + 1) * DIR_ENTRY_SIZE]
                    .try_into()
                    .unwrap();
                let record = DirectoryEntryFat32::from_bytes(&raw);

                if record.is_nomore() {
                    return EnumerateResult::Finished;
                }
                if record.is_unused() || record.is_volume_id() || record.is_long_name() {
                    entry_index += 1;
                    continue;
                }

                let child = self.make_child_entry(&record, entry_index);
                if !on_entry(child) {
                    return EnumerateResult::Stopped;
                }
                entry_index += 1;
            }
        }
    }

    fn make_child_entry(&self, record: &DirectoryEntryFat32, entry_index: u32) -> Fat32Entry {
        Fat32Entry::new(
            self.table(),
            self.fat_data(),
            name_from_8_3(&record.name, &record.ext),
            record.size,
            record.is_directory(),
            record.first_cluster(),
            self.data.head(),
            entry_index,
        )
    }

    /// Lookup one child by name (case-insensitive, as names are stored
    /// upper-cased).
    pub fn get_entry(&self, name: &str) -> Option<Fat32Entry> {
        let mut found = None;
        self.enumerate_entries(&mut |e| {
            if e.name().eq_ignore_ascii_case(name) {
                found = Some(e);
                false
            } else {
                true
            }
        });
        found
    }

    /// "." and ".." do not count as content.
    pub fn is_directory_empty(&self) -> bool {
        self.enumerate_entries(&mut |e| e.name() == "." || e.name() == "..")
            != EnumerateResult::Stopped
    }

    /// Rewrite this entry's record in the parent directory.
    pub fn update_entry_info_in_parent_dir(&mut self) -> bool {
        if !self.has_parent_record() {
            return true; // the root has no record to update
        }
        let record = self.make_directory_entry_fat32();
        self.write_record_in_parent(self.parent_index, &record.to_bytes())
    }

    fn write_record_in_parent(&mut self, index: u32, raw: &[u8; DIR_ENTRY_SIZE]) -> bool {
        let mut cursor = self.parent_data.cursor();
        if !self.parent_data.seek(&mut cursor, index * DIR_ENTRY_SIZE as u32) {
            return false;
        }
        self.parent_data.write(&mut cursor, raw) == DIR_ENTRY_SIZE as u32
    }

    /// Write a raw record at `index` of *this* directory's data.
    fn write_record_in_self(&mut self, index: u32, raw: &[u8; DIR_ENTRY_SIZE]) -> bool {
        let mut cursor = self.data.cursor();
        if !self.data.seek(&mut cursor, index * DIR_ENTRY_SIZE as u32) {
            return false;
        }
        self.data.write(&mut cursor, raw) == DIR_ENTRY_SIZE as u32
    }

    /// Find a slot for `out` in this directory: the first unused record, or
    /// the no-more position (marker then moves one slot down), or a fresh
    /// cluster appended to the directory chain.
    pub fn alloc_entry_in_directory(&mut self, out: &mut Fat32Entry) -> bool {
        let mut sector_buf = [0u8; SECTOR_SIZE];
        let mut cursor = self.data.cursor();
        let mut entry_index = 0u32;

        loop {
            let read = self.data.read(&mut cursor, &mut sector_buf);
            if read == 0 {
                break;
            }
            for slot in 0..(read as usize / DIR_ENTRY_SIZE).min(ENTRIES_PER_SECTOR) {
                let raw: [u8; DIR_ENTRY_SIZE] = sector_buf
                    [slot * DIR_ENTRY_SIZE..(slot + 1) * DIR_ENTRY_SIZE]
                    .try_into()
                    .unwrap();
                let record = DirectoryEntryFat32::from_bytes(&raw);

                if record.is_unused() {
                    return self.alloc_entry_in_directory_at_index(entry_index, out);
                }
                if record.is_nomore() {
                    if !self.alloc_entry_in_directory_at_index(entry_index, out) {
                        return false;
                    }
                    return self.mark_next_entry_as_nomore(out.parent_index);
                }
                entry_index += 1;
            }
        }

        // Directory full: grow it by one cluster and place the entry at its
        // start, followed by a fresh no-more marker.
        let old_head = self.data.head();
        if !self.alloc_entry_in_directory_at_index(entry_index, out) {
            return false;
        }
        if !self.mark_next_entry_as_nomore(out.parent_index) {
            return false;
        }
        if old_head != self.data.head() {
            return self.update_entry_info_in_parent_dir();
        }
        true
    }

    /// Write `out`'s record at `index` in this directory and point `out`'s
    /// parent link at it.
    pub fn alloc_entry_in_directory_at_index(&mut self, index: u32, out: &mut Fat32Entry) -> bool {
        let record = out.make_directory_entry_fat32();
        if !self.write_record_in_self(index, &record.to_bytes()) {
            return false;
        }

        // Link after the write: growing the directory may have changed its
        // head cluster.
        out.parent_data =
            Fat32ClusterChain::new(self.table(), self.fat_data(), self.data.head(), DIR_CHAIN_SIZE);
        out.parent_index = index;
        true
    }

    fn mark_record_in_self(&mut self, index: u32, marker: u8) -> bool {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw[0] = marker;
        self.write_record_in_self(index, &raw)
    }

    /// The marker only moves when the next slot is not the first record of
    /// a cluster; a fresh cluster is zeroed and terminates on its own.
    fn mark_next_entry_as_nomore(&mut self, index: u32) -> bool {
        let entries_per_cluster =
            ENTRIES_PER_SECTOR as u32 * self.fat_data().sectors_per_cluster() as u32;
        let next_index = index + 1;
        if next_index % entries_per_cluster == 0 {
            return true;
        }
        self.mark_record_in_self(next_index, DIR_ENTRY_NO_MORE)
    }

    /// Remove `target`'s record from this directory: the last live record
    /// becomes a no-more marker, an inner one becomes unused. A directory
    /// cluster left without live records is detached, except the first one.
    pub fn dealloc_entry_in_directory(&mut self, target: &Fat32Entry, root_cluster: u32) -> bool {
        if self.is_no_more_entries_after(target) {
            klog_debug!("fat32: delete '{}': marking no-more", target.name());
            if !self.mark_record_in_self(target.parent_index, DIR_ENTRY_NO_MORE) {
                return false;
            }
        } else {
            klog_debug!("fat32: delete '{}': marking unused", target.name());
            if !self.mark_record_in_self(target.parent_index, DIR_ENTRY_UNUSED) {
                return false;
            }
        }

        let entry_cluster = self.table().find_cluster_for_byte(
            self.data.head(),
            target.parent_index * DIR_ENTRY_SIZE as u32,
        );
        if entry_cluster != root_cluster
            && entry_cluster != self.data.head()
            && self.is_directory_cluster_empty(entry_cluster)
        {
            return self.detach_directory_cluster(entry_cluster);
        }
        true
    }

    /// True when no live record follows `entry` in this directory.
    fn is_no_more_entries_after(&self, entry: &Fat32Entry) -> bool {
        let mut entry_found = false;
        self.enumerate_entries(&mut |e| {
            if entry_found {
                return false; // a record after ours: stop
            }
            if e.parent_index == entry.parent_index {
                entry_found = true;
            }
            true
        }) == EnumerateResult::Finished
    }

    /// Scan a single directory cluster for live records.
    fn is_directory_cluster_empty(&self, cluster: u32) -> bool {
        let mut sector_buf = [0u8; SECTOR_SIZE];
        for sector in 0..self.fat_data().sectors_per_cluster() {
            if !self.fat_data().read_data_sector(cluster, sector, &mut sector_buf) {
                return true;
            }
            for slot in 0..ENTRIES_PER_SECTOR {
                let raw: [u8; DIR_ENTRY_SIZE] = sector_buf
                    [slot * DIR_ENTRY_SIZE..(slot + 1) * DIR_ENTRY_SIZE]
                    .try_into()
                    .unwrap();
                let record = DirectoryEntryFat32::from_bytes(&raw);
                if record.is_nomore() {
                    return true;
                }
                if record.is_unused() || record.is_volume_id() || record.is_long_name() {
                    continue;
                }
                return false;
            }
        }
        true
    }

    fn detach_directory_cluster(&mut self, cluster: u32) -> bool {
        let old_head = self.data.head();
        let mut cursor = self.data.cursor();
        self.data.detach_cluster(cluster, &mut cursor);
        if old_head != self.data.head() {
            return self.update_entry_info_in_parent_dir();
        }
        true
    }

    /// Every directory except the root starts with "." and ".." at records
    /// 0 and 1, living in a zeroed first cluster.
    pub fn alloc_dot_dot_entries(&mut self) -> bool {
        if !self.data.attach_cluster_and_zero_it() {
            return false;
        }

        let mut dot = Fat32Entry::new(
            self.table(),
            self.fat_data(),
            String::from("."),
            0,
            true,
            CLUSTER_UNUSED,
            CLUSTER_UNUSED,
            0,
        );
        if !self.alloc_entry_in_directory_at_index(0, &mut dot) {
            return false;
        }

        let mut dotdot = Fat32Entry::new(
            self.table(),
            self.fat_data(),
            String::from(".."),
            0,
            true,
            CLUSTER_UNUSED,
            CLUSTER_UNUSED,
            1,
        );
        if !self.alloc_entry_in_directory_at_index(1, &mut dotdot) {
            return false;
        }

        self.update_entry_info_in_parent_dir()
    }
}
