#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod blockdev;
pub mod fat32;
pub mod procfs;
pub mod ramfs;
pub mod tests;
pub mod vfs;

pub use blockdev::{BlockDevice, MemoryBlockDevice, SECTOR_SIZE};
pub use vfs::entry::{EntryType, OpenState, VfsEntry};
pub use vfs::open_table::{open_table_init, OpenEntryTable};
pub use vfs::tree::{vfs_tree_init, VfsTree};
