//! Byte-addressed stream over one cluster chain.
//!
//! The chain owns `(head, cached tail, size)`; each opener brings its own
//! [`ChainCursor`]. Writes extend the chain on the fly and refuse to cross
//! the FAT32 4 GiB limit. A cursor sitting exactly on a cluster boundary
//! writes into the *next* cluster, attaching one when the chain ends there.

use phobos_lib::klog_warn;

use super::data::Fat32Data;
use super::table::Fat32Table;
use super::{is_allocated_cluster, CLUSTER_END_OF_CHAIN, CLUSTER_UNUSED};

/// Per-opener position: the cluster the next access touches plus the
/// absolute byte offset.
#[derive(Clone, Copy, Debug)]
pub struct ChainCursor {
    pub cluster: u32,
    pub byte: u32,
}

#[derive(Clone, Copy)]
pub struct Fat32ClusterChain {
    table: Fat32Table,
    data: Fat32Data,
    head: u32,
    tail_cache: u32,
    size: u32,
}

impl Fat32ClusterChain {
    pub fn new(table: Fat32Table, data: Fat32Data, head: u32, size: u32) -> Self {
        Self {
            table,
            data,
            head,
            tail_cache: CLUSTER_UNUSED,
            size,
        }
    }

    pub fn cursor(&self) -> ChainCursor {
        ChainCursor {
            cluster: self.head,
            byte: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head == CLUSTER_UNUSED
    }

    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn table(&self) -> &Fat32Table {
        &self.table
    }

    pub fn data(&self) -> &Fat32Data {
        &self.data
    }

    /// Lazily found last cluster of the chain.
    pub fn tail(&mut self) -> u32 {
        if self.head == CLUSTER_UNUSED {
            return CLUSTER_UNUSED;
        }
        if self.tail_cache == CLUSTER_UNUSED {
            self.tail_cache = self.table.get_last_cluster(self.head);
        }
        self.tail_cache
    }

    /// Resize to `new_size` bytes; grown bytes are not zeroed, the shrink
    /// path frees spare clusters. Cursors are untouched.
    pub fn resize(&mut self, new_size: u32) {
        self.head = self.table.resize_cluster_chain(self.head, new_size);
        self.tail_cache = CLUSTER_UNUSED;
        self.size = new_size;
    }

    /// Free every cluster and reset the given cursor.
    pub fn free(&mut self, cursor: &mut ChainCursor) {
        self.resize(0);
        cursor.cluster = CLUSTER_UNUSED;
        cursor.byte = 0;
    }

    /// Reposition `cursor`; refuses positions past the content size.
    pub fn seek(&self, cursor: &mut ChainCursor, new_position: u32) -> bool {
        if new_position > self.size {
            return false;
        }
        if new_position == cursor.byte {
            return true;
        }
        cursor.cluster = self.table.find_cluster_for_byte(self.head, new_position);
        cursor.byte = new_position;
        true
    }

    /// Allocate one cluster and link it at the tail (or as the head of an
    /// empty chain).
    pub fn attach_cluster(&mut self) -> bool {
        let new_cluster = self.table.alloc_cluster();
        if new_cluster == CLUSTER_END_OF_CHAIN {
            return false;
        }

        if self.head == CLUSTER_UNUSED {
            self.head = new_cluster;
            self.tail_cache = new_cluster;
        } else {
            let old_tail = self.tail();
            self.table.set_next_cluster(old_tail, new_cluster);
            self.tail_cache = new_cluster;
        }
        true
    }

    pub fn attach_cluster_and_zero_it(&mut self) -> bool {
        if !self.attach_cluster() {
            return false;
        }
        let tail = self.tail();
        self.data.clear_data_cluster(tail);
        true
    }

    /// Unlink one cluster; invalidates tail cache and the given cursor.
    pub fn detach_cluster(&mut self, cluster: u32, cursor: &mut ChainCursor) {
        self.head = self.table.detach_cluster(self.head, cluster);
        self.tail_cache = CLUSTER_UNUSED;
        cursor.cluster = CLUSTER_UNUSED;
        cursor.byte = 0;
    }

    /// Read up to `min(out.len(), size - cursor.byte)` bytes at the cursor,
    /// hopping clusters as boundaries are crossed.
    pub fn read(&self, cursor: &mut ChainCursor, out: &mut [u8]) -> u32 {
        if self.is_empty() {
            return 0;
        }
        if cursor.byte > self.size {
            klog_warn!("fat32: read past end of cluster chain");
            return 0;
        }

        let max_bytes = (self.size - cursor.byte) as usize;
        let mut remaining = out.len().min(max_bytes);
        let mut total_read = 0usize;
        let mut position_in_cluster = cursor.byte;
        let mut cluster = cursor.cluster;

        while is_allocated_cluster(cluster) && remaining > 0 {
            let count = self.data.read_data_cluster(
                position_in_cluster,
                cluster,
                &mut out[total_read..total_read + remaining],
            ) as usize;
            if count == 0 {
                break; // device error; report what was read
            }
            remaining -= count;
            total_read += count;

            if self.data.is_cluster_beginning(cursor.byte + total_read as u32) {
                position_in_cluster = 0;
                cluster = self.table.get_next_cluster(cluster);
            }
        }

        cursor.byte += total_read as u32;
        cursor.cluster = cluster;
        total_read as u32
    }

    /// Write `data` at the cursor, growing the chain cluster by cluster and
    /// the size watermark as the cursor advances past it.
    pub fn write(&mut self, cursor: &mut ChainCursor, data: &[u8]) -> u32 {
        if cursor.byte as u64 + data.len() as u64 > u32::MAX as u64 {
            klog_warn!("fat32: write would exceed the 4 GiB limit");
            return 0;
        }

        let mut remaining = data.len();
        let mut total_written = 0usize;
        let mut position_in_cluster = cursor.byte;
        let Some(mut cluster) = self.cluster_for_write(cursor) else {
            return 0;
        };

        while is_allocated_cluster(cluster) && remaining > 0 {
            let count = self.data.write_data_cluster(
                position_in_cluster,
                cluster,
                &data[total_written..total_written + remaining],
            ) as usize;
            if count == 0 {
                break; // device error; report what was written
            }
            remaining -= count;
            total_written += count;

            if remaining == 0 {
                break;
            }

            position_in_cluster = 0;
            let next = self.table.get_next_cluster(cluster);
            cluster = if is_allocated_cluster(next) {
                next
            } else {
                if !self.attach_cluster() {
                    break;
                }
                self.tail()
            };
        }

        cursor.byte += total_written as u32;
        cursor.cluster = if self.data.is_cluster_beginning(cursor.byte) {
            self.table.get_next_cluster(cluster)
        } else {
            cluster
        };

        if self.size < cursor.byte {
            self.size = cursor.byte;
        }
        total_written as u32
    }

    /// Cluster the next write lands in.
    ///
    /// Cursor convention: on an exact cluster boundary, `cursor.cluster`
    /// already names the cluster holding byte `cursor.byte` (seek and the
    /// read/write loops maintain this), so writing "at the boundary" means
    /// writing into the start of that next cluster. A cursor at the true
    /// chain end (or an empty chain) grows the chain first.
    fn cluster_for_write(&mut self, cursor: &mut ChainCursor) -> Option<u32> {
        if is_allocated_cluster(cursor.cluster) {
            return Some(cursor.cluster);
        }

        if !self.attach_cluster() {
            return None;
        }
        let tail = self.tail();
        cursor.cluster = tail;
        Some(tail)
    }
}
