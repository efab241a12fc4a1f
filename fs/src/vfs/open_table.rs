//! The global open-entry table: integer descriptors over cached entries
//! plus their per-open state, and the file-operation facade the syscall
//! layer calls.

use alloc::string::String;
use alloc::sync::Arc;

use phobos_abi::error::{ErrorCode, KernelResult};
use phobos_abi::fs::{UserDirEntry, UserStat, ST_MODE_DIR, ST_MODE_FILE};
use phobos_lib::IrqMutex;

use super::cache::CacheFd;
use super::entry::{EntryType, OpenState, VfsEntry};
use super::tree::with_tree;
use crate::ramfs::RamFifoEntry;

pub const MAX_OPEN_ENTRIES: usize = 128;

/// User-visible file descriptor.
pub type Fd = u32;

struct OpenSlot {
    cache_fd: CacheFd,
    state: OpenState,
}

pub struct OpenEntryTable {
    slots: [Option<OpenSlot>; MAX_OPEN_ENTRIES],
}

impl OpenEntryTable {
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; MAX_OPEN_ENTRIES],
        }
    }

    fn find_free_fd(&self) -> Option<Fd> {
        self.slots
            .iter()
            .position(|s| s.is_none())
            .map(|idx| idx as Fd)
    }

    fn slot_mut(&mut self, fd: Fd) -> KernelResult<&mut OpenSlot> {
        self.slots
            .get_mut(fd as usize)
            .and_then(|s| s.as_mut())
            .ok_or(ErrorCode::EcBadf)
    }
}

impl Default for OpenEntryTable {
    fn default() -> Self {
        Self::new()
    }
}

static OPEN_TABLE: IrqMutex<OpenEntryTable> = IrqMutex::new(OpenEntryTable::new());

pub fn open_table_init() {
    *OPEN_TABLE.lock() = OpenEntryTable::new();
}

/// Open `path`: bring the entry into the tree cache, take its per-open
/// state, store both under the first free descriptor.
pub fn vfs_open(path: &str) -> KernelResult<Fd> {
    let mut table = OPEN_TABLE.lock();
    let Some(fd) = table.find_free_fd() else {
        return Err(ErrorCode::EcMfile);
    };

    // Two tree visits with `open()` in between: a proc entry's open may
    // take a snapshot that itself reads the tree, so it must not run under
    // the tree lock.
    let (cache_fd, entry) = with_tree(|tree| -> KernelResult<(CacheFd, VfsEntry)> {
        let cache_fd = tree.open(path)?;
        let cached = tree.cached(cache_fd).ok_or(ErrorCode::EcNoent)?;
        Ok((cache_fd, cached.entry.clone()))
    })?;

    match entry.open() {
        Ok(state) => {
            table.slots[fd as usize] = Some(OpenSlot { cache_fd, state });
            Ok(fd)
        }
        Err(ec) => {
            with_tree(|tree| tree.close(cache_fd));
            Err(ec)
        }
    }
}

/// Close a descriptor: hand the state back to the entry, drop the opener
/// count (which may evict the cached entry).
pub fn vfs_close(fd: Fd) -> KernelResult<()> {
    let mut table = OPEN_TABLE.lock();
    let slot = table
        .slots
        .get_mut(fd as usize)
        .and_then(|s| s.take())
        .ok_or(ErrorCode::EcBadf)?;

    with_tree(|tree| {
        if let Some(cached) = tree.cached_mut(slot.cache_fd) {
            cached.entry.close(slot.state);
        }
        tree.close(slot.cache_fd);
    });
    Ok(())
}

pub fn vfs_read(fd: Fd, out: &mut [u8]) -> KernelResult<u64> {
    let mut table = OPEN_TABLE.lock();
    let slot = table.slot_mut(fd)?;
    with_tree(|tree| {
        let cached = tree.cached_mut(slot.cache_fd).ok_or(ErrorCode::EcBadf)?;
        cached.entry.read(&mut slot.state, out)
    })
}

pub fn vfs_write(fd: Fd, data: &[u8]) -> KernelResult<u64> {
    let mut table = OPEN_TABLE.lock();
    let slot = table.slot_mut(fd)?;
    with_tree(|tree| {
        let cached = tree.cached_mut(slot.cache_fd).ok_or(ErrorCode::EcBadf)?;
        cached.entry.write(&mut slot.state, data)
    })
}

pub fn vfs_seek(fd: Fd, position: u64) -> KernelResult<()> {
    let mut table = OPEN_TABLE.lock();
    let slot = table.slot_mut(fd)?;
    with_tree(|tree| {
        let cached = tree.cached_mut(slot.cache_fd).ok_or(ErrorCode::EcBadf)?;
        cached.entry.seek(&mut slot.state, position)
    })
}

pub fn vfs_position(fd: Fd) -> KernelResult<u64> {
    let mut table = OPEN_TABLE.lock();
    let slot = table.slot_mut(fd)?;
    with_tree(|tree| {
        let cached = tree.cached(slot.cache_fd).ok_or(ErrorCode::EcBadf)?;
        Ok(cached.entry.position(&slot.state))
    })
}

pub fn vfs_size(fd: Fd) -> KernelResult<u64> {
    let mut table = OPEN_TABLE.lock();
    let slot = table.slot_mut(fd)?;
    with_tree(|tree| {
        let cached = tree.cached(slot.cache_fd).ok_or(ErrorCode::EcBadf)?;
        Ok(cached.entry.size())
    })
}

/// Snapshot directory contents into caller-owned records; returns the count
/// delivered.
pub fn vfs_enumerate(fd: Fd, out: &mut [UserDirEntry]) -> KernelResult<usize> {
    let mut table = OPEN_TABLE.lock();
    let slot = table.slot_mut(fd)?;
    with_tree(|tree| {
        let cached = tree.cached(slot.cache_fd).ok_or(ErrorCode::EcBadf)?;
        if !cached.entry.is_directory() {
            return Err(ErrorCode::EcNotdir);
        }

        let mut count = 0usize;
        cached.enumerate(&mut |child| {
            if count >= out.len() {
                return false;
            }
            let record = &mut out[count];
            *record = UserDirEntry::empty();
            record.set_name(child.name().as_bytes());
            record.is_directory = child.is_directory() as u32;
            record.size = child.size() as u32;
            count += 1;
            true
        });
        Ok(count)
    })
}

/// The FIFO behind a descriptor, for the blocking-read path.
pub fn vfs_fd_fifo(fd: Fd) -> Option<Arc<RamFifoEntry>> {
    let mut table = OPEN_TABLE.lock();
    let slot = table.slot_mut(fd).ok()?;
    with_tree(|tree| {
        let cached = tree.cached(slot.cache_fd)?;
        cached.entry.as_fifo().cloned()
    })
}

// ---------------------------------------------------------------------
// Path-level operations
// ---------------------------------------------------------------------

pub fn vfs_stat(path: &str) -> KernelResult<UserStat> {
    with_tree(|tree| {
        let entry = tree.lookup(path)?;
        Ok(UserStat {
            st_mode: match entry.entry_type() {
                EntryType::Directory => ST_MODE_DIR,
                EntryType::File => ST_MODE_FILE,
            },
            st_size: entry.size() as u32,
        })
    })
}

pub fn vfs_truncate(path: &str, new_size: u64) -> KernelResult<()> {
    with_tree(|tree| {
        // Go through the cached instance when one exists so open cursors
        // and the resized chain agree on the new metadata.
        if let Some(fd) = tree.cache().find_fd_for_path(path) {
            let cached = tree.cached_mut(fd).ok_or(ErrorCode::EcNoent)?;
            return cached.entry.truncate(new_size);
        }
        tree.lookup(path)?.truncate(new_size)
    })
}

pub fn vfs_exists(path: &str) -> bool {
    with_tree(|tree| tree.exists(path))
}

pub fn vfs_attach(entry: VfsEntry, parent_path: &str) -> KernelResult<()> {
    with_tree(|tree| tree.attach(entry, parent_path))
}

pub fn vfs_create(path: &str, is_directory: bool) -> KernelResult<()> {
    with_tree(|tree| tree.create(path, is_directory))
}

pub fn vfs_remove(path: &str) -> KernelResult<()> {
    with_tree(|tree| tree.remove(path))
}

pub fn vfs_copy(from: &str, to: &str) -> KernelResult<()> {
    with_tree(|tree| tree.copy(from, to))
}

pub fn vfs_move(from: &str, to: &str) -> KernelResult<()> {
    with_tree(|tree| tree.move_entry(from, to))
}

/// Read a whole file into memory (the ELF runner's load path).
pub fn vfs_read_entire_file(path: &str) -> KernelResult<alloc::vec::Vec<u8>> {
    let fd = vfs_open(path)?;
    let size = vfs_size(fd)? as usize;
    let mut content = alloc::vec![0u8; size];
    let mut done = 0usize;
    while done < size {
        match vfs_read(fd, &mut content[done..]) {
            Ok(0) => break,
            Ok(n) => done += n as usize,
            Err(ec) => {
                let _ = vfs_close(fd);
                return Err(ec);
            }
        }
    }
    let _ = vfs_close(fd);
    content.truncate(done);
    Ok(content)
}

/// Current-working-directory style resolution helper for the syscall layer.
pub fn vfs_absolute(cwd: &str, user_path: &str) -> String {
    super::path::normalize(cwd, user_path)
}
