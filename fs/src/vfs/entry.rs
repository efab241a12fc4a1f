//! The VFS entry: one sum type carrying every capability variant.
//!
//! Files and directories from FAT32 travel as values (their shared state is
//! the disk itself); ram entries share interior state through `Arc`; proc
//! entries are generated on open. Every variant answers the common
//! capability set; directories add lookup/enumeration; mountpoints add
//! create/delete/move over their own namespace.

use alloc::string::{String, ToString};
use alloc::sync::Arc;

use phobos_abi::error::{ErrorCode, KernelResult};

use crate::fat32::cluster_chain::ChainCursor;
use crate::fat32::entry::Fat32Entry;
use crate::fat32::volume::Fat32Volume;
use crate::procfs::ProcEntryKind;
use crate::ramfs::{RamDirEntry, RamFifoEntry, RamFileEntry, RamMountPoint};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

/// Per-open state, produced by `open()` and threaded through every file
/// operation on that descriptor.
pub enum OpenState {
    /// Entries with no per-open bookkeeping (directories, FIFOs).
    None,
    /// FAT32 cursor pair.
    Fat32(ChainCursor),
    /// Byte position into a ram file.
    Position(u64),
    /// Proc snapshot taken at open time.
    Snapshot { content: String, position: usize },
}

/// A FAT32 volume surfaced as a mountpoint entry.
#[derive(Clone)]
pub struct Fat32MountPoint {
    name: String,
    volume: Fat32Volume,
}

impl Fat32MountPoint {
    pub fn new(volume: Fat32Volume) -> Self {
        Self {
            name: volume.label(),
            volume,
        }
    }

    pub fn named(volume: Fat32Volume, name: &str) -> Self {
        Self {
            name: name.to_string(),
            volume,
        }
    }

    pub fn volume(&self) -> &Fat32Volume {
        &self.volume
    }
}

#[derive(Clone)]
pub enum VfsEntry {
    Fat32(Fat32Entry),
    Fat32Mount(Fat32MountPoint),
    RamDir(Arc<RamDirEntry>),
    RamFile(Arc<RamFileEntry>),
    RamFifo(Arc<RamFifoEntry>),
    RamMount(Arc<RamMountPoint>),
    Proc(ProcEntryKind),
}

impl VfsEntry {
    pub fn name(&self) -> String {
        match self {
            VfsEntry::Fat32(e) => e.name().to_string(),
            VfsEntry::Fat32Mount(m) => m.name.clone(),
            VfsEntry::RamDir(d) => d.name(),
            VfsEntry::RamFile(f) => f.name(),
            VfsEntry::RamFifo(f) => f.name(),
            VfsEntry::RamMount(m) => m.name().to_string(),
            VfsEntry::Proc(k) => k.name().to_string(),
        }
    }

    pub fn set_name(&self, name: &str) {
        match self {
            VfsEntry::RamDir(d) => d.set_name(name),
            VfsEntry::RamFile(f) => f.set_name(name),
            VfsEntry::RamFifo(f) => f.set_name(name),
            // FAT32 renames go through the volume; mount and proc names are
            // fixed.
            _ => {}
        }
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            VfsEntry::Fat32(e) => {
                if e.is_directory() {
                    EntryType::Directory
                } else {
                    EntryType::File
                }
            }
            VfsEntry::Fat32Mount(_) | VfsEntry::RamDir(_) | VfsEntry::RamMount(_) => {
                EntryType::Directory
            }
            VfsEntry::RamFile(_) | VfsEntry::RamFifo(_) | VfsEntry::Proc(_) => EntryType::File,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type() == EntryType::Directory
    }

    pub fn is_mountpoint(&self) -> bool {
        matches!(self, VfsEntry::Fat32Mount(_) | VfsEntry::RamMount(_))
    }

    /// Start a manipulation session; the returned state is this open's own.
    pub fn open(&self) -> KernelResult<OpenState> {
        Ok(match self {
            VfsEntry::Fat32(e) if !e.is_directory() => OpenState::Fat32(e.cursor()),
            VfsEntry::Fat32(_) | VfsEntry::Fat32Mount(_) => OpenState::None,
            VfsEntry::RamDir(_) | VfsEntry::RamMount(_) => OpenState::None,
            VfsEntry::RamFile(_) => OpenState::Position(0),
            VfsEntry::RamFifo(_) => OpenState::None,
            VfsEntry::Proc(kind) => OpenState::Snapshot {
                content: kind.generate(),
                position: 0,
            },
        })
    }

    pub fn close(&self, _state: OpenState) {}

    pub fn size(&self) -> u64 {
        match self {
            VfsEntry::Fat32(e) => e.size() as u64,
            VfsEntry::RamFile(f) => f.size(),
            VfsEntry::RamFifo(f) => f.size(),
            _ => 0,
        }
    }

    pub fn read(&mut self, state: &mut OpenState, out: &mut [u8]) -> KernelResult<u64> {
        match self {
            VfsEntry::Fat32(e) => {
                if e.is_directory() {
                    return Err(ErrorCode::EcIsdir);
                }
                let OpenState::Fat32(cursor) = state else {
                    return Err(ErrorCode::EcBadf);
                };
                Ok(e.read(cursor, out) as u64)
            }
            VfsEntry::RamFile(f) => {
                let OpenState::Position(pos) = state else {
                    return Err(ErrorCode::EcBadf);
                };
                let count = f.read_at(*pos, out);
                *pos += count;
                Ok(count)
            }
            VfsEntry::RamFifo(f) => f.read(out),
            VfsEntry::Proc(_) => {
                let OpenState::Snapshot { content, position } = state else {
                    return Err(ErrorCode::EcBadf);
                };
                let bytes = content.as_bytes();
                if *position >= bytes.len() {
                    return Ok(0);
                }
                let count = out.len().min(bytes.len() - *position);
                out[..count].copy_from_slice(&bytes[*position..*position + count]);
                *position += count;
                Ok(count as u64)
            }
            _ => Err(ErrorCode::EcIsdir),
        }
    }

    pub fn write(&mut self, state: &mut OpenState, data: &[u8]) -> KernelResult<u64> {
        match self {
            VfsEntry::Fat32(e) => {
                if e.is_directory() {
                    return Err(ErrorCode::EcIsdir);
                }
                let OpenState::Fat32(cursor) = state else {
                    return Err(ErrorCode::EcBadf);
                };
                Ok(e.write(cursor, data) as u64)
            }
            VfsEntry::RamFile(f) => {
                let OpenState::Position(pos) = state else {
                    return Err(ErrorCode::EcBadf);
                };
                let count = f.write_at(*pos, data);
                *pos += count;
                Ok(count)
            }
            VfsEntry::RamFifo(f) => f.write(data),
            VfsEntry::Proc(_) => Err(ErrorCode::EcPerm),
            _ => Err(ErrorCode::EcIsdir),
        }
    }

    pub fn seek(&self, state: &mut OpenState, new_position: u64) -> KernelResult<()> {
        match self {
            VfsEntry::Fat32(e) => {
                let OpenState::Fat32(cursor) = state else {
                    return Err(ErrorCode::EcBadf);
                };
                if e.seek(cursor, new_position as u32) {
                    Ok(())
                } else {
                    Err(ErrorCode::EcInval)
                }
            }
            VfsEntry::RamFile(_) => {
                let OpenState::Position(pos) = state else {
                    return Err(ErrorCode::EcBadf);
                };
                *pos = new_position;
                Ok(())
            }
            VfsEntry::Proc(_) => {
                let OpenState::Snapshot { content, position } = state else {
                    return Err(ErrorCode::EcBadf);
                };
                if new_position as usize > content.len() {
                    return Err(ErrorCode::EcInval);
                }
                *position = new_position as usize;
                Ok(())
            }
            VfsEntry::RamFifo(_) => Err(ErrorCode::EcPerm),
            _ => Err(ErrorCode::EcIsdir),
        }
    }

    pub fn truncate(&mut self, new_size: u64) -> KernelResult<()> {
        match self {
            VfsEntry::Fat32(e) => {
                if e.truncate(new_size as u32) {
                    Ok(())
                } else {
                    Err(ErrorCode::EcInval)
                }
            }
            VfsEntry::RamFile(f) => {
                f.truncate(new_size);
                Ok(())
            }
            VfsEntry::RamFifo(_) | VfsEntry::Proc(_) => Err(ErrorCode::EcPerm),
            _ => Err(ErrorCode::EcIsdir),
        }
    }

    pub fn position(&self, state: &OpenState) -> u64 {
        match state {
            OpenState::Fat32(cursor) => cursor.byte as u64,
            OpenState::Position(pos) => *pos,
            OpenState::Snapshot { position, .. } => *position as u64,
            OpenState::None => 0,
        }
    }

    /// Directory lookup. Plain directories resolve one name; mountpoints
    /// own their namespace and resolve whole mount-relative paths.
    pub fn get_entry(&self, path_or_name: &str) -> KernelResult<VfsEntry> {
        match self {
            VfsEntry::Fat32(e) => {
                if !e.is_directory() {
                    return Err(ErrorCode::EcNotdir);
                }
                e.get_entry(path_or_name)
                    .map(VfsEntry::Fat32)
                    .ok_or(ErrorCode::EcNoent)
            }
            VfsEntry::Fat32Mount(m) => m.volume.get_entry(path_or_name).map(VfsEntry::Fat32),
            VfsEntry::RamDir(d) => d.get_child(path_or_name).ok_or(ErrorCode::EcNoent),
            VfsEntry::RamMount(m) => m.get_entry(path_or_name),
            _ => Err(ErrorCode::EcNotdir),
        }
    }

    /// Visit children; the callback returns `true` to continue.
    pub fn enumerate_entries(
        &self,
        on_entry: &mut dyn FnMut(VfsEntry) -> bool,
    ) -> KernelResult<()> {
        match self {
            VfsEntry::Fat32(e) => {
                if !e.is_directory() {
                    return Err(ErrorCode::EcNotdir);
                }
                e.enumerate_entries(&mut |child| on_entry(VfsEntry::Fat32(child)));
                Ok(())
            }
            VfsEntry::Fat32Mount(m) => {
                m.volume
                    .root_entry()
                    .enumerate_entries(&mut |child| on_entry(VfsEntry::Fat32(child)));
                Ok(())
            }
            VfsEntry::RamDir(d) => {
                d.for_each_child(on_entry);
                Ok(())
            }
            VfsEntry::RamMount(m) => {
                m.for_each_root_child(on_entry);
                Ok(())
            }
            _ => Err(ErrorCode::EcNotdir),
        }
    }

    /// Mountpoint interface: create a persistent entry in this namespace.
    pub fn create_entry(&self, mount_path: &str, is_directory: bool) -> KernelResult<VfsEntry> {
        match self {
            VfsEntry::Fat32Mount(m) => m
                .volume
                .create_entry(mount_path, is_directory)
                .map(VfsEntry::Fat32),
            VfsEntry::RamMount(m) => m.create_entry(mount_path, is_directory),
            _ => Err(ErrorCode::EcPerm),
        }
    }

    pub fn delete_entry(&self, mount_path: &str) -> KernelResult<()> {
        match self {
            VfsEntry::Fat32Mount(m) => m.volume.delete_entry(mount_path),
            VfsEntry::RamMount(m) => m.delete_entry(mount_path),
            _ => Err(ErrorCode::EcPerm),
        }
    }

    pub fn move_entry(&self, mount_path_from: &str, mount_path_to: &str) -> KernelResult<()> {
        match self {
            VfsEntry::Fat32Mount(m) => m.volume.move_entry(mount_path_from, mount_path_to),
            VfsEntry::RamMount(m) => m.move_entry(mount_path_from, mount_path_to),
            _ => Err(ErrorCode::EcPerm),
        }
    }

    /// FIFO access for the blocking-read plumbing in the syscall layer.
    pub fn as_fifo(&self) -> Option<&Arc<RamFifoEntry>> {
        match self {
            VfsEntry::RamFifo(f) => Some(f),
            _ => None,
        }
    }
}
