//! In-memory file system entries: directory, dummy file, FIFO, and the ram
//! mountpoint that composes them into a self-contained namespace.
//!
//! Interior state (bytes, children, names) sits behind `IrqMutex` so clones
//! of one handle observe the same entry, mirroring how independent opens
//! share a file.

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use phobos_abi::error::{ErrorCode, KernelResult};
use phobos_abi::task::TaskId;
use phobos_lib::{IrqMutex, RingBuffer};

use crate::vfs::entry::VfsEntry;
use crate::vfs::path;

/// Plain directory: a named vector of children.
pub struct RamDirEntry {
    name: IrqMutex<String>,
    children: IrqMutex<Vec<VfsEntry>>,
}

impl RamDirEntry {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: IrqMutex::new(name.to_string()),
            children: IrqMutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.lock() = name.to_string();
    }

    pub fn is_empty(&self) -> bool {
        self.children.lock().is_empty()
    }

    /// Refuses duplicate names.
    pub fn attach_entry(&self, entry: VfsEntry) -> KernelResult<()> {
        let mut children = self.children.lock();
        if children.iter().any(|c| c.name() == entry.name()) {
            return Err(ErrorCode::EcExist);
        }
        children.push(entry);
        Ok(())
    }

    pub fn detach_entry(&self, name: &str) -> KernelResult<VfsEntry> {
        let mut children = self.children.lock();
        match children.iter().position(|c| c.name() == name) {
            Some(idx) => Ok(children.remove(idx)),
            None => Err(ErrorCode::EcNoent),
        }
    }

    pub fn get_child(&self, name: &str) -> Option<VfsEntry> {
        self.children.lock().iter().find(|c| c.name() == name).cloned()
    }

    pub fn for_each_child(&self, on_entry: &mut dyn FnMut(VfsEntry) -> bool) {
        let snapshot: Vec<VfsEntry> = self.children.lock().clone();
        for child in snapshot {
            if !on_entry(child) {
                break;
            }
        }
    }
}

/// Growable in-memory file; every open shares the same bytes, positions
/// are per-open.
pub struct RamFileEntry {
    name: IrqMutex<String>,
    data: IrqMutex<Vec<u8>>,
}

impl RamFileEntry {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: IrqMutex::new(name.to_string()),
            data: IrqMutex::new(Vec::new()),
        })
    }

    pub fn with_content(name: &str, content: &[u8]) -> Arc<Self> {
        let entry = Self::new(name);
        entry.data.lock().extend_from_slice(content);
        entry
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.lock() = name.to_string();
    }

    pub fn size(&self) -> u64 {
        self.data.lock().len() as u64
    }

    pub fn read_at(&self, position: u64, out: &mut [u8]) -> u64 {
        let data = self.data.lock();
        let pos = position as usize;
        if pos >= data.len() {
            return 0;
        }
        let count = out.len().min(data.len() - pos);
        out[..count].copy_from_slice(&data[pos..pos + count]);
        count as u64
    }

    pub fn write_at(&self, position: u64, input: &[u8]) -> u64 {
        let mut data = self.data.lock();
        let pos = position as usize;
        if pos + input.len() > data.len() {
            data.resize(pos + input.len(), 0);
        }
        data[pos..pos + input.len()].copy_from_slice(input);
        input.len() as u64
    }

    pub fn truncate(&self, new_size: u64) {
        self.data.lock().resize(new_size as usize, 0);
    }
}

const FIFO_CAPACITY: usize = 512;

struct FifoState {
    queue: RingBuffer<FIFO_CAPACITY>,
    waiting_readers: Vec<TaskId>,
}

/// Bounded byte queue. Reads drain the head in write order; an empty queue
/// reports would-block so the syscall layer can park the reader on the
/// wait list kept here. A full queue reports would-block to task-context
/// writers; ISR writers just drop.
pub struct RamFifoEntry {
    name: IrqMutex<String>,
    state: IrqMutex<FifoState>,
}

impl RamFifoEntry {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: IrqMutex::new(name.to_string()),
            state: IrqMutex::new(FifoState {
                queue: RingBuffer::new(),
                waiting_readers: Vec::new(),
            }),
        })
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.lock() = name.to_string();
    }

    pub fn size(&self) -> u64 {
        self.state.lock().queue.len() as u64
    }

    pub fn read(&self, out: &mut [u8]) -> KernelResult<u64> {
        let mut state = self.state.lock();
        if state.queue.is_empty() {
            return Err(ErrorCode::EcAgain);
        }
        Ok(state.queue.pop_into(out) as u64)
    }

    pub fn write(&self, input: &[u8]) -> KernelResult<u64> {
        let mut state = self.state.lock();
        if state.queue.is_full() {
            return Err(ErrorCode::EcAgain);
        }
        Ok(state.queue.push_from(input) as u64)
    }

    /// Park `task_id` until the next write.
    pub fn add_waiting_reader(&self, task_id: TaskId) {
        let mut state = self.state.lock();
        if !state.waiting_readers.contains(&task_id) {
            state.waiting_readers.push(task_id);
        }
    }

    /// Drain the reader wait list; the caller re-queues those tasks.
    pub fn take_waiting_readers(&self) -> Vec<TaskId> {
        core::mem::take(&mut self.state.lock().waiting_readers)
    }
}

/// A self-contained in-memory namespace behind a mountpoint boundary.
pub struct RamMountPoint {
    name: String,
    root: Arc<RamDirEntry>,
}

impl RamMountPoint {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            root: RamDirEntry::new(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descend the mount-relative `unix_path` from this mount's root.
    pub fn get_entry(&self, unix_path: &str) -> KernelResult<VfsEntry> {
        let mut current = VfsEntry::RamDir(self.root.clone());
        for segment in path::segments(unix_path) {
            let dir = match &current {
                VfsEntry::RamDir(d) => d.clone(),
                _ => return Err(ErrorCode::EcNotdir),
            };
            current = dir.get_child(segment).ok_or(ErrorCode::EcNoent)?;
        }
        Ok(current)
    }

    fn parent_dir(&self, unix_path: &str) -> KernelResult<Arc<RamDirEntry>> {
        match self.get_entry(path::parent(unix_path))? {
            VfsEntry::RamDir(d) => Ok(d),
            _ => Err(ErrorCode::EcNotdir),
        }
    }

    pub fn create_entry(&self, unix_path: &str, is_directory: bool) -> KernelResult<VfsEntry> {
        let name = path::file_name(unix_path);
        if name.is_empty() {
            return Err(ErrorCode::EcInval);
        }
        let parent = self.parent_dir(unix_path)?;
        let entry = if is_directory {
            VfsEntry::RamDir(RamDirEntry::new(name))
        } else {
            VfsEntry::RamFile(RamFileEntry::new(name))
        };
        parent.attach_entry(entry.clone())?;
        Ok(entry)
    }

    pub fn delete_entry(&self, unix_path: &str) -> KernelResult<()> {
        if path::is_root(unix_path) {
            return Err(ErrorCode::EcInval);
        }
        let parent = self.parent_dir(unix_path)?;
        let name = path::file_name(unix_path);

        let target = parent.get_child(name).ok_or(ErrorCode::EcNoent)?;
        if let VfsEntry::RamDir(dir) = &target {
            if !dir.is_empty() {
                return Err(ErrorCode::EcInval);
            }
        }
        parent.detach_entry(name).map(|_| ())
    }

    pub fn move_entry(&self, path_from: &str, path_to: &str) -> KernelResult<()> {
        if path::is_root(path_from) {
            return Err(ErrorCode::EcInval);
        }

        let src_parent = self.parent_dir(path_from)?;
        let src_name = path::file_name(path_from).to_string();

        // Moving onto an existing directory drops the source inside it,
        // keeping its name; otherwise the last segment renames it.
        let (dst_parent, dst_name) = match self.get_entry(path_to) {
            Ok(VfsEntry::RamDir(d)) => (d, src_name.clone()),
            Ok(_) => return Err(ErrorCode::EcExist),
            Err(_) => (
                self.parent_dir(path_to)?,
                path::file_name(path_to).to_string(),
            ),
        };

        let moved = src_parent.detach_entry(&src_name)?;
        if dst_name != src_name {
            moved.set_name(&dst_name);
        }
        if let Err(ec) = dst_parent.attach_entry(moved.clone()) {
            // Roll back rather than lose the entry.
            moved.set_name(&src_name);
            let _ = src_parent.attach_entry(moved);
            return Err(ec);
        }
        Ok(())
    }

    pub fn for_each_root_child(&self, on_entry: &mut dyn FnMut(VfsEntry) -> bool) {
        self.root.for_each_child(on_entry);
    }
}
