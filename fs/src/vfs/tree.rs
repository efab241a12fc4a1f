//! The VFS tree: one uniform name space over mountpoints, cached entries,
//! attachments, and persistent FAT32 storage.
//!
//! Resolution starts at the pinned root, prefers attachments at cached
//! nodes, and crosses a mount boundary by handing the remaining path to the
//! mountpoint, which owns its namespace. Create/remove/move delegate to the
//! deepest mountpoint on the path; attach grafts in-memory entries onto
//! cached nodes.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use phobos_abi::error::{ErrorCode, KernelResult};
use phobos_lib::{klog_debug, IrqMutex};

use super::cache::{CacheFd, CachedEntry, EntryCache};
use super::entry::VfsEntry;
use super::path;

const COPY_CHUNK: usize = 512;

pub struct VfsTree {
    cache: EntryCache,
}

/// Deepest mountpoint on a path plus the path remainder it owns.
struct MountpointPath {
    mountpoint: VfsEntry,
    /// Absolute path of the mountpoint itself.
    prefix: String,
    /// Mount-relative remainder, always absolute-style ("/a/b" or "/").
    rest: String,
}

impl VfsTree {
    pub const fn new() -> Self {
        Self {
            cache: EntryCache::new(),
        }
    }

    /// Plant the root. Called once, before any other operation.
    pub fn install(&mut self, root: VfsEntry) {
        self.cache.install(root);
    }

    pub fn cache(&self) -> &EntryCache {
        &self.cache
    }

    pub fn cached_mut(&mut self, fd: CacheFd) -> Option<&mut CachedEntry> {
        self.cache.get_mut(fd)
    }

    pub fn cached(&self, fd: CacheFd) -> Option<&CachedEntry> {
        self.cache.get(fd)
    }

    // -----------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------

    /// Split `path` into its deepest cached prefix and the leftover
    /// segments below it. The root is always cached, so this always
    /// succeeds.
    fn deepest_cached_prefix<'p>(&self, p: &'p str) -> (CacheFd, Vec<&'p str>) {
        let segments: Vec<&str> = path::segments(p).collect();

        for take in (0..=segments.len()).rev() {
            let mut prefix = String::from("/");
            for (i, seg) in segments[..take].iter().enumerate() {
                if i > 0 {
                    prefix.push('/');
                }
                prefix.push_str(seg);
            }
            if let Some(fd) = self.cache.find_fd_for_path(&prefix) {
                return (fd, segments[take..].to_vec());
            }
        }
        (EntryCache::ROOT_FD, segments)
    }

    fn join_rest(segments: &[&str]) -> String {
        let mut rest = String::from("/");
        for (i, seg) in segments.iter().enumerate() {
            if i > 0 {
                rest.push('/');
            }
            rest.push_str(seg);
        }
        rest
    }

    /// Resolve `p` to an entry, without touching the cache contents.
    pub fn lookup(&self, p: &str) -> KernelResult<VfsEntry> {
        let (fd, segments) = self.deepest_cached_prefix(p);
        let cached = self.cache.get(fd).ok_or(ErrorCode::EcNoent)?;

        if segments.is_empty() {
            return Ok(cached.entry.clone());
        }

        // First hop out of the cached node: attachments shadow the wrapped
        // entry; a mountpoint without a matching attachment owns the whole
        // remainder.
        if cached.entry.is_mountpoint() && cached.get_attached(segments[0]).is_none() {
            return cached.entry.get_entry(&Self::join_rest(&segments));
        }
        let mut current = cached.get_child(segments[0])?;

        for (i, segment) in segments.iter().enumerate().skip(1) {
            if current.is_mountpoint() {
                return current.get_entry(&Self::join_rest(&segments[i..]));
            }
            if !current.is_directory() {
                return Err(ErrorCode::EcNotdir);
            }
            current = current.get_entry(segment)?;
        }
        Ok(current)
    }

    pub fn exists(&self, p: &str) -> bool {
        self.cache.find_fd_for_path(p).is_some() || self.lookup(p).is_ok()
    }

    /// Walk `p` recording the deepest mountpoint crossed.
    fn mountpoint_for_path(&self, p: &str) -> Option<MountpointPath> {
        let segments: Vec<&str> = path::segments(p).collect();
        let mut current = self.cache.get(EntryCache::ROOT_FD)?.entry.clone();
        let mut current_path = String::from("/");
        let mut deepest: Option<MountpointPath> = None;

        for (i, segment) in segments.iter().enumerate() {
            let child = match self.cache.find_fd_for_path(&current_path) {
                Some(fd) => self.cache.get(fd)?.get_child(segment),
                None => current.get_entry(segment),
            };
            let Ok(child) = child else {
                break;
            };

            current_path = path::join(&current_path, segment);
            if child.is_mountpoint() {
                deepest = Some(MountpointPath {
                    mountpoint: child.clone(),
                    prefix: current_path.clone(),
                    rest: Self::join_rest(&segments[i + 1..]),
                });
            }
            current = child;
        }
        deepest
    }

    // -----------------------------------------------------------------
    // Cache discipline
    // -----------------------------------------------------------------

    /// Reuse the cached slot for `p` or resolve and allocate one.
    pub fn get_or_bring_to_cache(&mut self, p: &str) -> KernelResult<CacheFd> {
        if let Some(fd) = self.cache.find_fd_for_path(p) {
            return Ok(fd);
        }
        let entry = self.lookup(p)?;
        self.cache.allocate(entry, p)
    }

    /// Open: cache the entry and count the opener.
    pub fn open(&mut self, p: &str) -> KernelResult<CacheFd> {
        let fd = self.get_or_bring_to_cache(p)?;
        let cached = self.cache.get_mut(fd).ok_or(ErrorCode::EcNoent)?;
        cached.open_count += 1;
        Ok(fd)
    }

    /// Drop one opener; evict the slot once nothing pins it.
    pub fn close(&mut self, fd: CacheFd) {
        let Some(cached) = self.cache.get_mut(fd) else {
            return;
        };
        cached.open_count = cached.open_count.saturating_sub(1);
        if cached.can_evict() {
            self.cache.deallocate(fd);
        }
    }

    // -----------------------------------------------------------------
    // Tree mutation
    // -----------------------------------------------------------------

    /// Graft `entry` as an in-memory child under `parent_path`.
    pub fn attach(&mut self, entry: VfsEntry, parent_path: &str) -> KernelResult<()> {
        let fd = self.get_or_bring_to_cache(parent_path)?;
        let cached = self.cache.get_mut(fd).ok_or(ErrorCode::EcNoent)?;
        if !cached.entry.is_directory() {
            return Err(ErrorCode::EcNotdir);
        }
        cached.attach(entry)
    }

    /// Create a persistent entry; only a mountpoint on the path can do it.
    pub fn create(&mut self, p: &str, is_directory: bool) -> KernelResult<()> {
        if self.exists(p) {
            return Err(ErrorCode::EcExist);
        }
        let Some(mp) = self.mountpoint_for_path(p) else {
            klog_debug!("vfs: create '{}': no mountpoint covers the path", p);
            return Err(ErrorCode::EcRofs);
        };
        mp.mountpoint.create_entry(&mp.rest, is_directory)?;
        Ok(())
    }

    /// Remove an attachment, or delegate to the owning mountpoint.
    /// Non-empty directories are refused.
    pub fn remove(&mut self, p: &str) -> KernelResult<()> {
        if path::is_root(p) {
            return Err(ErrorCode::EcInval);
        }

        let name = path::file_name(p).to_string();
        let parent = path::parent(p).to_string();

        // Attachment removal first: that is the symmetric inverse of
        // attach().
        if let Some(parent_fd) = self.cache.find_fd_for_path(&parent) {
            let parent_cached = self.cache.get_mut(parent_fd).ok_or(ErrorCode::EcNoent)?;
            if let Some(attached) = parent_cached.get_attached(&name) {
                if let VfsEntry::RamDir(dir) = &attached {
                    if !dir.is_empty() {
                        return Err(ErrorCode::EcInval);
                    }
                }
                parent_cached.detach(&name)?;
                self.evict_if_unused(&parent);
                return self.evict_path(p);
            }
        }

        let Some(mp) = self.mountpoint_for_path(p) else {
            return Err(ErrorCode::EcRofs);
        };
        if mp.rest == "/" {
            // The path names the mountpoint itself; unmounting goes through
            // detach on its parent, not through the mountpoint.
            return Err(ErrorCode::EcPerm);
        }
        mp.mountpoint.delete_entry(&mp.rest)?;
        self.evict_path(p)
    }

    /// Drop a stale cache slot for `p` if nothing holds it open.
    fn evict_path(&mut self, p: &str) -> KernelResult<()> {
        if let Some(fd) = self.cache.find_fd_for_path(p) {
            if let Some(cached) = self.cache.get(fd) {
                if cached.can_evict() {
                    self.cache.deallocate(fd);
                }
            }
        }
        Ok(())
    }

    fn evict_if_unused(&mut self, p: &str) {
        let _ = self.evict_path(p);
    }

    /// Copy a file. A destination resolving to a directory receives the
    /// source's file name; the bytes stream through a bounded chunk buffer.
    pub fn copy(&mut self, from: &str, to: &str) -> KernelResult<()> {
        let mut source = self.lookup(from)?;
        if source.is_directory() {
            return Err(ErrorCode::EcIsdir);
        }

        let dst_path = match self.lookup(to) {
            Ok(e) if e.is_directory() => path::join(to, &source.name()),
            _ => to.to_string(),
        };

        self.create(&dst_path, false)?;
        let mut dest = self.lookup(&dst_path)?;

        let mut src_state = source.open()?;
        let mut dst_state = dest.open()?;
        let mut chunk = [0u8; COPY_CHUNK];
        loop {
            let read = source.read(&mut src_state, &mut chunk)?;
            if read == 0 {
                break;
            }
            let written = dest.write(&mut dst_state, &chunk[..read as usize])?;
            if written != read {
                source.close(src_state);
                dest.close(dst_state);
                return Err(ErrorCode::EcNospc);
            }
        }
        source.close(src_state);
        dest.close(dst_state);
        Ok(())
    }

    /// Move or rename. Same-mountpoint moves delegate to the mountpoint;
    /// attachment moves re-graft; crossing filesystems copies then removes.
    /// Mountpoints and the root refuse to move.
    pub fn move_entry(&mut self, from: &str, to: &str) -> KernelResult<()> {
        if path::is_root(from) {
            return Err(ErrorCode::EcInval);
        }
        let source = self.lookup(from)?;
        if source.is_mountpoint() {
            return Err(ErrorCode::EcPerm);
        }

        // A destination that is an existing directory receives the entry
        // under its source name.
        let final_to = match self.lookup(to) {
            Ok(e) if e.is_directory() => path::join(to, &source.name()),
            Ok(_) => return Err(ErrorCode::EcExist),
            Err(_) => to.to_string(),
        };

        let mp_from = self.mountpoint_for_path(from);
        let mp_to = self.mountpoint_for_path(&final_to);

        match (mp_from, mp_to) {
            (Some(a), Some(b)) if a.prefix == b.prefix => {
                a.mountpoint.move_entry(&a.rest, &b.rest)?;
                self.evict_if_unused(from);
                Ok(())
            }
            (None, None) => self.move_attachment(from, &final_to),
            _ => {
                if source.is_directory() {
                    return Err(ErrorCode::EcPerm);
                }
                self.copy(from, &final_to)?;
                self.remove(from)
            }
        }
    }

    /// Re-graft an attached entry from its parent onto the destination
    /// directory.
    fn move_attachment(&mut self, from: &str, final_to: &str) -> KernelResult<()> {
        let src_parent = path::parent(from).to_string();
        let src_name = path::file_name(from).to_string();
        let dst_parent = path::parent(final_to).to_string();
        let dst_name = path::file_name(final_to).to_string();

        let parent_fd = self
            .cache
            .find_fd_for_path(&src_parent)
            .ok_or(ErrorCode::EcNoent)?;
        let parent_cached = self.cache.get_mut(parent_fd).ok_or(ErrorCode::EcNoent)?;
        let detached = parent_cached.detach(&src_name)?;

        if dst_name != src_name {
            detached.set_name(&dst_name);
        }
        match self.attach(detached.clone(), &dst_parent) {
            Ok(()) => Ok(()),
            Err(ec) => {
                // Re-graft at the source rather than losing the entry.
                detached.set_name(&src_name);
                let _ = self.attach(detached, &src_parent);
                Err(ec)
            }
        }
    }

    /// Mounted-volume statistics for `/proc/mountinfo`.
    pub fn mountinfo_text(&self) -> String {
        use core::fmt::Write;

        let mut out = String::new();
        let Some(root) = self.cache.get(EntryCache::ROOT_FD) else {
            return out;
        };
        for attached in &root.attachments {
            if let VfsEntry::Fat32Mount(mp) = attached {
                let volume = mp.volume();
                let _ = writeln!(
                    out,
                    "/{}: {} KiB, {} clusters used",
                    attached.name(),
                    volume.size_in_bytes() / 1024,
                    volume.used_space_in_clusters()
                );
            } else {
                let _ = writeln!(out, "/{}: ramfs", attached.name());
            }
        }
        out
    }
}

impl Default for VfsTree {
    fn default() -> Self {
        Self::new()
    }
}

static VFS_TREE: IrqMutex<VfsTree> = IrqMutex::new(VfsTree::new());

/// Install the root into the global tree. Boot-time only.
pub fn vfs_tree_init(root: VfsEntry) {
    VFS_TREE.lock().install(root);
}

/// Run `f` against the global tree.
pub fn with_tree<R>(f: impl FnOnce(&mut VfsTree) -> R) -> R {
    let mut tree = VFS_TREE.lock();
    f(&mut tree)
}

/// Provider hook for `/proc/mountinfo`.
pub fn mountinfo_snapshot() -> String {
    with_tree(|tree| tree.mountinfo_text())
}
