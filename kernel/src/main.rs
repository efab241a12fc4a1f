#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

//! The bootable kernel: ordered bring-up from the Multiboot2 handover to
//! the first scheduled task.

extern crate alloc;

use phobos_core as core_sched;
use phobos_drivers::{ata, pic, pit, ps2, serial};
use phobos_fs as fs;
use phobos_lib::{cpu, klog_error, klog_info};
use phobos_mm as mm;

use fs::ramfs::{RamDirEntry, RamFifoEntry};
use fs::vfs::entry::{Fat32MountPoint, VfsEntry};

mod devices;

#[cfg(target_os = "none")]
core::arch::global_asm!(include_str!("boot_entry.s"));

#[cfg(target_os = "none")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mm::KernelAllocator = mm::KernelAllocator::new();

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    klog_error!("KERNEL PANIC: {}", info);
    cpu::halt_loop();
}

const MULTIBOOT2_BOOTLOADER_MAGIC: u64 = 0x36D7_6289;

#[cfg(target_os = "none")]
unsafe extern "C" {
    static boot_stack_guard: u8;
    static boot_stack_bottom: u8;
    static boot_stack_top: u8;
}

/// Boot, then hand the CPU to the scheduler; never returns.
#[unsafe(no_mangle)]
pub extern "C" fn kernel_main(mb2_magic: u64, mb2_info: u64) -> ! {
    // 1. Logging first: the early backend writes raw to COM1.
    phobos_lib::klog_init();
    klog_info!("PhobOS booting");

    if mb2_magic != MULTIBOOT2_BOOTLOADER_MAGIC {
        klog_error!("bad multiboot2 magic 0x{:x}, halting", mb2_magic);
        cpu::halt_loop();
    }

    // 2. Kernel address space, then physical memory and the heap.
    mm::paging::map_and_load_kernel_address_space();
    #[cfg(target_os = "none")]
    unsafe {
        mm::memory_init::init_memory(mb2_info);
    }
    #[cfg(not(target_os = "none"))]
    let _ = mb2_info;

    // 3. With the heap alive the serial driver takes over logging.
    serial::init();

    // 4. Descriptor tables; ring-3 entry needs the TSS stack slot.
    #[cfg(target_os = "none")]
    {
        let stack_top = &raw const boot_stack_top as u64;
        let guard_lo = &raw const boot_stack_guard as u64;
        let guard_hi = &raw const boot_stack_bottom as u64;
        core_sched::interrupts::init_gdt_tss(stack_top);
        core_sched::interrupts::register_boot_stack_guard(guard_lo, guard_hi);
    }
    core_sched::interrupts::init_idt();

    // 5. Interrupt controllers and the timebase.
    pic::init();
    pit::init();
    pit::set_on_tick(timer_tick_hook);
    ps2::init();
    ps2::set_on_key(devices::on_key_event);
    ps2::set_on_mouse(devices::on_mouse_packet);

    // 6. The syscall gate.
    core_sched::syscall::config_and_activate_syscalls();

    // 7. The virtual file system: ram root, /dev, /proc, disk volumes.
    setup_filesystem();

    // 8. Multitasking.
    core_sched::task_manager_init(mm::paging::kernel_pml4_phys_addr());
    core_sched::scheduler::manager::task_add_kernel_task(
        idle_task as *const () as usize as u64,
        "idle",
        0,
        0,
    )
    .expect("idle task must exist");
    core_sched::scheduler::manager::task_add_kernel_task(
        init_task as *const () as usize as u64,
        "init",
        0,
        0,
    )
    .expect("init task must exist");

    // 9. Let the timer take it from here; the boot stack is abandoned at
    // the first tick.
    core_sched::interrupts::enable_hardware_irqs();
    klog_info!("boot complete, entering scheduler");
    cpu::enable_interrupts();
    cpu::halt_loop();
}

fn timer_tick_hook(_now: u64) {
    core_sched::timer_tick();
}

/// Always-runnable task that keeps the run list non-empty.
extern "C" fn idle_task(_arg1: u64, _arg2: u64) {
    loop {
        cpu::halt_once();
    }
}

/// First real task: optionally run the built-in suites, then launch the
/// terminal program from the first FAT32 volume.
extern "C" fn init_task(_arg1: u64, _arg2: u64) {
    #[cfg(feature = "builtin-tests")]
    {
        phobos_tests::tests_run_all();
    }

    match core_sched::exec::elf_run("/BIN/TERMINAL", alloc::vec![]) {
        Ok(tid) => klog_info!("init: terminal started as task {}", tid),
        Err(ec) => klog_error!("init: no terminal ({}), console idle", ec.as_str()),
    }
}

/// Root tree population: `/dev` fifos, `/proc` entries, FAT32 volumes by
/// label.
fn setup_filesystem() {
    fs::vfs_tree_init(VfsEntry::RamDir(RamDirEntry::new("/")));
    fs::open_table_init();

    // /dev
    let dev = RamDirEntry::new("dev");
    let keyboard = RamFifoEntry::new("keyboard");
    let mouse = RamFifoEntry::new("mouse");
    let stdin = RamFifoEntry::new("stdin");
    let stdout = RamFifoEntry::new("stdout");
    let _ = dev.attach_entry(VfsEntry::RamFifo(keyboard.clone()));
    let _ = dev.attach_entry(VfsEntry::RamFifo(mouse.clone()));
    let _ = dev.attach_entry(VfsEntry::RamFifo(stdin));
    let _ = dev.attach_entry(VfsEntry::RamFifo(stdout));
    let _ = fs::vfs::open_table::vfs_attach(VfsEntry::RamDir(dev), "/");
    devices::register_input_fifos(keyboard, mouse);

    // /proc
    let proc_dir = RamDirEntry::new("proc");
    for kind in fs::procfs::ProcEntryKind::ALL {
        let _ = proc_dir.attach_entry(VfsEntry::Proc(kind));
    }
    let _ = fs::vfs::open_table::vfs_attach(VfsEntry::RamDir(proc_dir), "/");

    fs::procfs::register_uptime_provider(pit::uptime_ms);
    fs::procfs::register_mountinfo_provider(fs::vfs::tree::mountinfo_snapshot);

    // FAT32 volumes from every responding ATA drive, attached by label.
    let mut mounted = 0;
    for device in ata::ATA_DEVICES {
        if !device.present() {
            continue;
        }
        let block_dev: &'static devices::AtaBlockDevice =
            alloc::boxed::Box::leak(alloc::boxed::Box::new(devices::AtaBlockDevice::new(device)));
        for volume in fs::fat32::mbr::fat32_volumes(block_dev) {
            let mount = Fat32MountPoint::new(volume);
            match fs::vfs::open_table::vfs_attach(VfsEntry::Fat32Mount(mount), "/") {
                Ok(()) => mounted += 1,
                Err(ec) => klog_error!("mount failed: {}", ec.as_str()),
            }
        }
    }
    klog_info!("vfs: root populated, {} FAT32 volume(s) mounted", mounted);
}

/// Host builds only exercise the libraries; give them a main.
#[cfg(not(target_os = "none"))]
fn main() {}
