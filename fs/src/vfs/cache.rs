//! The entry cache: every open entry lives here exactly once, wrapped with
//! an open count and its in-memory attachments.
//!
//! A cached entry may be reclaimed only when its open count is zero and no
//! attachments remain. The root is pinned for the lifetime of the system.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use phobos_abi::error::{ErrorCode, KernelResult};

use super::entry::VfsEntry;

/// Index into the cache slot vector.
pub type CacheFd = u32;

pub const MAX_CACHED_ENTRIES: usize = 128;

pub struct CachedEntry {
    pub entry: VfsEntry,
    pub path: String,
    pub open_count: u32,
    pub attachments: Vec<VfsEntry>,
}

impl CachedEntry {
    fn new(entry: VfsEntry, path: &str) -> Self {
        Self {
            entry,
            path: path.to_string(),
            open_count: 0,
            attachments: Vec::new(),
        }
    }

    /// Graft an in-memory child; refuses an attached sibling of the same
    /// name. A same-name persistent child is allowed and ends up shadowed.
    pub fn attach(&mut self, entry: VfsEntry) -> KernelResult<()> {
        let name = entry.name();
        if self.attachments.iter().any(|a| a.name() == name) {
            return Err(ErrorCode::EcExist);
        }
        self.attachments.push(entry);
        Ok(())
    }

    pub fn detach(&mut self, name: &str) -> KernelResult<VfsEntry> {
        match self.attachments.iter().position(|a| a.name() == name) {
            Some(idx) => Ok(self.attachments.remove(idx)),
            None => Err(ErrorCode::EcNoent),
        }
    }

    pub fn get_attached(&self, name: &str) -> Option<VfsEntry> {
        self.attachments.iter().find(|a| a.name() == name).cloned()
    }

    /// Attachment-first lookup of one child.
    pub fn get_child(&self, name: &str) -> KernelResult<VfsEntry> {
        if let Some(attached) = self.get_attached(name) {
            return Ok(attached);
        }
        self.entry.get_entry(name)
    }

    /// Attachments first, then the wrapped entry's children, shadowed by
    /// attachment names.
    pub fn enumerate(&self, on_entry: &mut dyn FnMut(VfsEntry) -> bool) {
        let mut stopped = false;
        for attached in &self.attachments {
            if !on_entry(attached.clone()) {
                stopped = true;
                break;
            }
        }
        if stopped {
            return;
        }

        let attachments = &self.attachments;
        let _ = self.entry.enumerate_entries(&mut |child| {
            if attachments.iter().any(|a| a.name() == child.name()) {
                return true; // shadowed
            }
            on_entry(child)
        });
    }

    pub fn can_evict(&self) -> bool {
        self.open_count == 0 && self.attachments.is_empty()
    }
}

pub struct EntryCache {
    slots: Vec<Option<CachedEntry>>,
}

impl EntryCache {
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Install the pinned root at slot 0.
    pub fn install(&mut self, root: VfsEntry) {
        self.slots.clear();
        self.slots.resize_with(MAX_CACHED_ENTRIES, || None);
        self.slots[0] = Some(CachedEntry::new(root, "/"));
    }

    pub const ROOT_FD: CacheFd = 0;

    pub fn allocate(&mut self, entry: VfsEntry, path: &str) -> KernelResult<CacheFd> {
        let free = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(ErrorCode::EcMfile)?;
        self.slots[free] = Some(CachedEntry::new(entry, path));
        Ok(free as CacheFd)
    }

    /// Drop a slot; the pinned root stays.
    pub fn deallocate(&mut self, fd: CacheFd) {
        if fd != Self::ROOT_FD {
            if let Some(slot) = self.slots.get_mut(fd as usize) {
                *slot = None;
            }
        }
    }

    pub fn get(&self, fd: CacheFd) -> Option<&CachedEntry> {
        self.slots.get(fd as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, fd: CacheFd) -> Option<&mut CachedEntry> {
        self.slots.get_mut(fd as usize)?.as_mut()
    }

    pub fn find_fd_for_path(&self, path: &str) -> Option<CacheFd> {
        self.slots.iter().enumerate().find_map(|(idx, slot)| {
            slot.as_ref()
                .filter(|cached| cached.path == path)
                .map(|_| idx as CacheFd)
        })
    }
}

impl Default for EntryCache {
    fn default() -> Self {
        Self::new()
    }
}
