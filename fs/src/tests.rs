//! Filesystem test suite.
//!
//! Every case drives the real engine over a RAM block device and a private
//! tree instance, so the suite runs identically from the in-kernel harness
//! and from the host test runner.

use alloc::string::ToString;

use phobos_abi::error::ErrorCode;
use phobos_lib::testing::TestResult;
use phobos_lib::{assert_eq_test, assert_err_test, assert_ok_test, assert_test, define_test_suite};

use crate::blockdev::MemoryBlockDevice;
use crate::fat32;
use crate::fat32::volume::Fat32Volume;
use crate::ramfs::{RamDirEntry, RamFifoEntry, RamFileEntry, RamMountPoint};
use crate::vfs::entry::{Fat32MountPoint, VfsEntry};
use crate::vfs::tree::VfsTree;

const TEST_DISK_SECTORS: u32 = 2048;

fn fresh_volume() -> Fat32Volume {
    let dev = MemoryBlockDevice::new_static(TEST_DISK_SECTORS);
    Fat32Volume::format(dev, "TESTVOL", 1).expect("format")
}

fn fresh_tree_with_volume() -> (VfsTree, Fat32Volume) {
    let volume = fresh_volume();
    let mut tree = VfsTree::new();
    tree.install(VfsEntry::RamDir(RamDirEntry::new("/")));
    tree.attach(
        VfsEntry::Fat32Mount(Fat32MountPoint::new(volume)),
        "/",
    )
    .expect("mount");
    (tree, volume)
}

// ---------------------------------------------------------------------
// FAT32 engine
// ---------------------------------------------------------------------

pub fn test_fat32_create_write_read_back() -> TestResult {
    let volume = fresh_volume();

    assert_ok_test!(volume.create_entry("/A.TXT", false));
    let mut entry = assert_ok_test!(volume.get_entry("/A.TXT"));
    let mut cursor = entry.cursor();
    assert_eq_test!(entry.write(&mut cursor, b"hello"), 5);

    let entry2 = assert_ok_test!(volume.get_entry("/A.TXT"));
    assert_eq_test!(entry2.size(), 5);
    let mut cursor2 = entry2.cursor();
    let mut buf = [0u8; 8];
    assert_eq_test!(entry2.read(&mut cursor2, &mut buf), 5);
    assert_eq_test!(&buf[..5], &b"hello"[..]);
    TestResult::Pass
}

pub fn test_fat32_write_spanning_clusters() -> TestResult {
    let volume = fresh_volume();
    let cluster = volume.bytes_per_cluster() as usize;

    assert_ok_test!(volume.create_entry("/BIG.BIN", false));
    let mut entry = assert_ok_test!(volume.get_entry("/BIG.BIN"));
    let mut cursor = entry.cursor();

    let mut pattern = alloc::vec![0u8; cluster * 2 + 37];
    for (i, b) in pattern.iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    assert_eq_test!(entry.write(&mut cursor, &pattern), pattern.len() as u32);

    let entry2 = assert_ok_test!(volume.get_entry("/BIG.BIN"));
    let mut cursor2 = entry2.cursor();
    let mut readback = alloc::vec![0u8; pattern.len()];
    assert_eq_test!(entry2.read(&mut cursor2, &mut readback), pattern.len() as u32);
    assert_test!(readback == pattern, "cluster-spanning content mismatch");
    TestResult::Pass
}

pub fn test_fat32_seek_and_overwrite() -> TestResult {
    let volume = fresh_volume();
    assert_ok_test!(volume.create_entry("/S.TXT", false));
    let mut entry = assert_ok_test!(volume.get_entry("/S.TXT"));
    let mut cursor = entry.cursor();
    entry.write(&mut cursor, b"0123456789");

    assert_test!(entry.seek(&mut cursor, 4), "seek inside file");
    entry.write(&mut cursor, b"XY");

    let entry2 = assert_ok_test!(volume.get_entry("/S.TXT"));
    let mut cursor2 = entry2.cursor();
    let mut buf = [0u8; 10];
    entry2.read(&mut cursor2, &mut buf);
    assert_eq_test!(&buf, b"0123XY6789");

    // Seeking past the end is refused.
    assert_test!(!entry2.seek(&mut cursor2, 11), "seek past end must fail");
    TestResult::Pass
}

pub fn test_fat32_resize_boundary_keeps_cluster_count() -> TestResult {
    let volume = fresh_volume();
    let cluster = volume.bytes_per_cluster();

    assert_ok_test!(volume.create_entry("/R.BIN", false));
    let mut entry = assert_ok_test!(volume.get_entry("/R.BIN"));
    assert_test!(entry.truncate(3 * cluster), "grow to 3 clusters");

    let used_at_full = volume.used_space_in_clusters();
    assert_test!(entry.truncate(3 * cluster - 1), "shrink by one byte");
    assert_eq_test!(volume.used_space_in_clusters(), used_at_full);

    // One full cluster less releases exactly one cluster.
    assert_test!(entry.truncate(2 * cluster), "shrink to 2 clusters");
    assert_eq_test!(volume.used_space_in_clusters(), used_at_full - 1);
    TestResult::Pass
}

pub fn test_fat32_directory_create_and_delete() -> TestResult {
    let volume = fresh_volume();

    assert_ok_test!(volume.create_entry("/HOME", true));
    let home = assert_ok_test!(volume.get_entry("/HOME"));
    assert_test!(home.is_directory(), "HOME is a directory");
    assert_test!(home.is_directory_empty(), "fresh directory is empty");

    // The dot pair occupies records 0 and 1.
    let names = fat32::volume::list_names(&home);
    assert_eq_test!(names.len(), 2);
    assert_eq_test!(names[0].as_str(), ".");
    assert_eq_test!(names[1].as_str(), "..");

    assert_ok_test!(volume.create_entry("/HOME/NOTE.TXT", false));
    assert_err_test!(volume.delete_entry("/HOME"), ErrorCode::EcInval);
    assert_ok_test!(volume.delete_entry("/HOME/NOTE.TXT"));
    assert_ok_test!(volume.delete_entry("/HOME"));
    assert_err_test!(volume.get_entry("/HOME"), ErrorCode::EcNoent);
    TestResult::Pass
}

pub fn test_fat32_enumeration_stops_at_nomore() -> TestResult {
    let volume = fresh_volume();
    assert_ok_test!(volume.create_entry("/ONE.TXT", false));
    assert_ok_test!(volume.create_entry("/TWO.TXT", false));
    assert_ok_test!(volume.create_entry("/SIX.TXT", false));

    // Deleting the last entry moves the no-more marker over it; records
    // after the marker stay invisible even though bytes remain on disk.
    assert_ok_test!(volume.delete_entry("/SIX.TXT"));
    let names = fat32::volume::list_names(&volume.root_entry());
    assert_eq_test!(names.len(), 2);
    assert_test!(!names.iter().any(|n| n == "SIX.TXT"), "deleted entry visible");
    TestResult::Pass
}

pub fn test_fat32_long_name_truncation() -> TestResult {
    let volume = fresh_volume();
    assert_ok_test!(volume.create_entry("/averylongfilename.jpeg", false));
    assert_test!(
        volume.get_entry("/AVERYL~1.JPE").is_ok(),
        "long name stored truncated"
    );
    TestResult::Pass
}

pub fn test_fat32_rename_and_move() -> TestResult {
    let volume = fresh_volume();
    assert_ok_test!(volume.create_entry("/A.TXT", false));
    let mut entry = assert_ok_test!(volume.get_entry("/A.TXT"));
    let mut cursor = entry.cursor();
    entry.write(&mut cursor, b"content");

    // Same-directory rename.
    assert_ok_test!(volume.move_entry("/A.TXT", "/B.TXT"));
    assert_err_test!(volume.get_entry("/A.TXT"), ErrorCode::EcNoent);
    let renamed = assert_ok_test!(volume.get_entry("/B.TXT"));
    assert_eq_test!(renamed.size(), 7);

    // Cross-directory move keeps the content chain.
    assert_ok_test!(volume.create_entry("/DIR", true));
    assert_ok_test!(volume.move_entry("/B.TXT", "/DIR"));
    let moved = assert_ok_test!(volume.get_entry("/DIR/B.TXT"));
    let mut cursor = moved.cursor();
    let mut buf = [0u8; 7];
    assert_eq_test!(moved.read(&mut cursor, &mut buf), 7);
    assert_eq_test!(&buf, b"content");

    // Move it back: the tree is as before.
    assert_ok_test!(volume.move_entry("/DIR/B.TXT", "/B.TXT"));
    assert_test!(volume.get_entry("/DIR/B.TXT").is_err(), "old location gone");
    assert_test!(volume.get_entry("/B.TXT").is_ok(), "back at the root");
    TestResult::Pass
}

pub fn test_fat32_chain_grows_and_frees() -> TestResult {
    let volume = fresh_volume();
    let baseline = volume.used_space_in_clusters();

    assert_ok_test!(volume.create_entry("/G.BIN", false));
    let mut entry = assert_ok_test!(volume.get_entry("/G.BIN"));
    let mut cursor = entry.cursor();
    let chunk = alloc::vec![7u8; volume.bytes_per_cluster() as usize * 3];
    entry.write(&mut cursor, &chunk);
    assert_eq_test!(volume.used_space_in_clusters(), baseline + 3);

    assert_ok_test!(volume.delete_entry("/G.BIN"));
    assert_eq_test!(volume.used_space_in_clusters(), baseline);
    TestResult::Pass
}

// ---------------------------------------------------------------------
// VFS tree
// ---------------------------------------------------------------------

pub fn test_vfs_attach_then_remove_round_trip() -> TestResult {
    let mut tree = VfsTree::new();
    tree.install(VfsEntry::RamDir(RamDirEntry::new("/")));

    let file = VfsEntry::RamFile(RamFileEntry::with_content("photo.jpg", b"jpeg"));
    assert_ok_test!(tree.attach(file, "/"));
    assert_test!(tree.exists("/photo.jpg"), "attached entry resolvable");

    // A second attach under the same name is refused.
    let dup = VfsEntry::RamFile(RamFileEntry::new("photo.jpg"));
    assert_err_test!(tree.attach(dup, "/"), ErrorCode::EcExist);

    assert_ok_test!(tree.remove("/photo.jpg"));
    assert_test!(!tree.exists("/photo.jpg"), "entry gone after remove");
    TestResult::Pass
}

pub fn test_vfs_directory_move_scenario() -> TestResult {
    let mut tree = VfsTree::new();
    tree.install(VfsEntry::RamDir(RamDirEntry::new("/")));

    assert_ok_test!(tree.attach(VfsEntry::RamDir(RamDirEntry::new("home")), "/"));
    assert_ok_test!(tree.attach(VfsEntry::RamDir(RamDirEntry::new("images")), "/"));

    assert_ok_test!(tree.move_entry("/images", "/home"));
    assert_test!(tree.exists("/home/images"), "moved under /home");
    assert_test!(!tree.exists("/images"), "source location empty");

    // Moving it back restores the original tree.
    assert_ok_test!(tree.move_entry("/home/images", "/"));
    assert_test!(tree.exists("/images"), "back at the root");
    assert_test!(!tree.exists("/home/images"), "no longer under /home");
    TestResult::Pass
}

pub fn test_vfs_mountpoint_shadowing() -> TestResult {
    let (mut tree, _volume) = fresh_tree_with_volume();

    let photo = VfsEntry::RamFile(RamFileEntry::with_content("photo.jpg", b"x"));
    assert_ok_test!(tree.attach(photo, "/"));

    assert_test!(tree.lookup("/photo.jpg").is_ok(), "attachment visible at /");
    assert_err_test!(tree.lookup("/TESTVOL/photo.jpg"), ErrorCode::EcNoent);
    TestResult::Pass
}

pub fn test_vfs_create_goes_to_mountpoint() -> TestResult {
    let (mut tree, volume) = fresh_tree_with_volume();

    assert_ok_test!(tree.create("/TESTVOL/A.TXT", false));
    assert_test!(volume.get_entry("/A.TXT").is_ok(), "created on the volume");

    // Without a covering mountpoint the tree is read-only.
    assert_err_test!(tree.create("/ELSEWHERE.TXT", false), ErrorCode::EcRofs);

    // create/remove round-trips the tree.
    assert_ok_test!(tree.remove("/TESTVOL/A.TXT"));
    assert_test!(volume.get_entry("/A.TXT").is_err(), "removed from volume");
    TestResult::Pass
}

pub fn test_vfs_open_count_round_trip() -> TestResult {
    let (mut tree, _volume) = fresh_tree_with_volume();
    assert_ok_test!(tree.create("/TESTVOL/F.TXT", false));

    let fd = assert_ok_test!(tree.open("/TESTVOL/F.TXT"));
    let fd2 = assert_ok_test!(tree.open("/TESTVOL/F.TXT"));
    assert_eq_test!(fd, fd2);
    assert_eq_test!(tree.cached(fd).map(|c| c.open_count), Some(2));

    tree.close(fd);
    assert_eq_test!(tree.cached(fd).map(|c| c.open_count), Some(1));
    tree.close(fd);
    assert_test!(tree.cached(fd).is_none(), "slot evicted at zero opens");
    TestResult::Pass
}

pub fn test_vfs_copy_across_mountpoints() -> TestResult {
    let volume_a = fresh_volume();
    let dev_b = MemoryBlockDevice::new_static(TEST_DISK_SECTORS);
    let volume_b = Fat32Volume::format(dev_b, "OTHER", 1).expect("format");

    let mut tree = VfsTree::new();
    tree.install(VfsEntry::RamDir(RamDirEntry::new("/")));
    assert_ok_test!(tree.attach(VfsEntry::Fat32Mount(Fat32MountPoint::new(volume_a)), "/"));
    assert_ok_test!(tree.attach(VfsEntry::Fat32Mount(Fat32MountPoint::new(volume_b)), "/"));

    assert_ok_test!(tree.create("/TESTVOL/SRC.TXT", false));
    let mut src = assert_ok_test!(tree.lookup("/TESTVOL/SRC.TXT"));
    let mut state = assert_ok_test!(src.open());
    assert_ok_test!(src.write(&mut state, b"copy me across volumes"));
    src.close(state);

    // Destination names an existing directory: the file name is appended.
    assert_ok_test!(tree.copy("/TESTVOL/SRC.TXT", "/OTHER"));
    let mut copied = assert_ok_test!(tree.lookup("/OTHER/SRC.TXT"));
    let mut state = assert_ok_test!(copied.open());
    let mut buf = [0u8; 32];
    let n = assert_ok_test!(copied.read(&mut state, &mut buf));
    assert_eq_test!(&buf[..n as usize], &b"copy me across volumes"[..]);
    copied.close(state);
    TestResult::Pass
}

pub fn test_vfs_move_mountpoint_refused() -> TestResult {
    let (mut tree, _volume) = fresh_tree_with_volume();
    assert_err_test!(tree.move_entry("/TESTVOL", "/ELSEWHERE"), ErrorCode::EcPerm);
    assert_err_test!(tree.move_entry("/", "/ANY"), ErrorCode::EcInval);
    TestResult::Pass
}

pub fn test_vfs_enumerate_shadowing() -> TestResult {
    let (mut tree, volume) = fresh_tree_with_volume();
    assert_ok_test!(volume.create_entry("/NOTE.TXT", false).map(|_| ()));

    // Attach a ram file with the same name onto the mountpoint node.
    let fd = assert_ok_test!(tree.open("/TESTVOL"));
    let shadow = VfsEntry::RamFile(RamFileEntry::with_content("NOTE.TXT", b"ram"));
    assert_ok_test!(tree.attach(shadow, "/TESTVOL"));

    let mut seen = alloc::vec::Vec::new();
    if let Some(cached) = tree.cached(fd) {
        cached.enumerate(&mut |child| {
            seen.push(child.name().to_string());
            true
        });
    }
    let count = seen.iter().filter(|n| n.as_str() == "NOTE.TXT").count();
    assert_eq_test!(count, 1);
    TestResult::Pass
}

// ---------------------------------------------------------------------
// Ram entries
// ---------------------------------------------------------------------

pub fn test_ram_fifo_byte_order_and_would_block() -> TestResult {
    let fifo = RamFifoEntry::new("stdin");

    let mut buf = [0u8; 4];
    assert_err_test!(fifo.read(&mut buf), ErrorCode::EcAgain);

    assert_ok_test!(fifo.write(b"ab"));
    assert_ok_test!(fifo.write(b"cd"));
    let n = assert_ok_test!(fifo.read(&mut buf));
    assert_eq_test!(n, 4);
    assert_eq_test!(&buf, b"abcd");

    // Fill to capacity: the next task-context write reports would-block.
    let big = [0u8; 512];
    assert_ok_test!(fifo.write(&big));
    assert_err_test!(fifo.write(b"x"), ErrorCode::EcAgain);
    TestResult::Pass
}

pub fn test_ram_fifo_wait_list() -> TestResult {
    let fifo = RamFifoEntry::new("keyboard");
    fifo.add_waiting_reader(7);
    fifo.add_waiting_reader(9);
    fifo.add_waiting_reader(7); // duplicates collapse
    let woken = fifo.take_waiting_readers();
    assert_eq_test!(woken.len(), 2);
    assert_test!(fifo.take_waiting_readers().is_empty(), "list drained");
    TestResult::Pass
}

pub fn test_ram_mountpoint_namespace() -> TestResult {
    let mp = RamMountPoint::new("tmp");
    assert_ok_test!(mp.create_entry("/docs", true));
    assert_ok_test!(mp.create_entry("/docs/a.txt", false));
    assert_test!(mp.get_entry("/docs/a.txt").is_ok(), "nested create");

    assert_err_test!(mp.delete_entry("/docs"), ErrorCode::EcInval);
    assert_ok_test!(mp.move_entry("/docs/a.txt", "/b.txt"));
    assert_test!(mp.get_entry("/b.txt").is_ok(), "renamed at root");
    assert_ok_test!(mp.delete_entry("/docs"));
    TestResult::Pass
}

define_test_suite!(FS_SUITE, "filesystem", [
    test_fat32_create_write_read_back,
    test_fat32_write_spanning_clusters,
    test_fat32_seek_and_overwrite,
    test_fat32_resize_boundary_keeps_cluster_count,
    test_fat32_directory_create_and_delete,
    test_fat32_enumeration_stops_at_nomore,
    test_fat32_long_name_truncation,
    test_fat32_rename_and_move,
    test_fat32_chain_grows_and_frees,
    test_vfs_attach_then_remove_round_trip,
    test_vfs_directory_move_scenario,
    test_vfs_mountpoint_shadowing,
    test_vfs_create_goes_to_mountpoint,
    test_vfs_open_count_round_trip,
    test_vfs_copy_across_mountpoints,
    test_vfs_move_mountpoint_refused,
    test_vfs_enumerate_shadowing,
    test_ram_fifo_byte_order_and_would_block,
    test_ram_fifo_wait_list,
    test_ram_mountpoint_namespace,
]);

#[cfg(test)]
mod host {
    use super::*;

    macro_rules! host_case {
        ($name:ident) => {
            #[test]
            fn $name() {
                assert_eq!(super::$name(), TestResult::Pass);
            }
        };
    }

    host_case!(test_fat32_create_write_read_back);
    host_case!(test_fat32_write_spanning_clusters);
    host_case!(test_fat32_seek_and_overwrite);
    host_case!(test_fat32_resize_boundary_keeps_cluster_count);
    host_case!(test_fat32_directory_create_and_delete);
    host_case!(test_fat32_enumeration_stops_at_nomore);
    host_case!(test_fat32_long_name_truncation);
    host_case!(test_fat32_rename_and_move);
    host_case!(test_fat32_chain_grows_and_frees);
    host_case!(test_vfs_attach_then_remove_round_trip);
    host_case!(test_vfs_directory_move_scenario);
    host_case!(test_vfs_mountpoint_shadowing);
    host_case!(test_vfs_create_goes_to_mountpoint);
    host_case!(test_vfs_open_count_round_trip);
    host_case!(test_vfs_copy_across_mountpoints);
    host_case!(test_vfs_move_mountpoint_refused);
    host_case!(test_vfs_enumerate_shadowing);
    host_case!(test_ram_fifo_byte_order_and_would_block);
    host_case!(test_ram_fifo_wait_list);
    host_case!(test_ram_mountpoint_namespace);
}
