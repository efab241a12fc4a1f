//! The ELF64 launcher.
//!
//! `elf_run` stages everything a new program needs, then spawns a transient
//! kernel task (the loader) inside the new address space. The loader
//! copies segments (faulting user pages into existence as it goes), plants
//! argv with a bump allocator between the image end and the stack base, and
//! replaces itself with the user task under its own id.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use phobos_abi::error::{ErrorCode, KernelResult};
use phobos_abi::task::TaskId;
use phobos_lib::{align_up_u64, klog_debug, klog_info};
use phobos_mm::elf;
use phobos_mm::mm_constants::{USER_STACK_BASE, USER_STACK_SIZE};
use phobos_mm::paging::{map_elf_address_space, PAGE_TABLES_BYTES};

use crate::scheduler::manager::{current_cwd, task_add, task_replace_current};
use crate::scheduler::task::{Task, TaskGroupData};

struct LoaderArgs {
    elf_data: Vec<u8>,
    args: Vec<String>,
}

/// Load `path` and launch it as a new task group.
/// Returns the id the final user task runs under.
pub fn elf_run(path: &str, args: Vec<String>) -> KernelResult<TaskId> {
    let elf_data = phobos_fs::vfs::open_table::vfs_read_entire_file(path)?;
    if !elf::is_elf64(&elf_data) {
        klog_info!("elf_run: '{}' is not a static ELF64 executable", path);
        return Err(ErrorCode::EcNoexec);
    }

    // The new group's page tables live in physically consecutive frames.
    let tables_phys =
        phobos_mm::alloc_consecutive_frames(PAGE_TABLES_BYTES).ok_or(ErrorCode::EcNomem)?;
    map_elf_address_space(tables_phys);
    let group = TaskGroupData::owning(tables_phys);

    let mut args = args;
    if args.is_empty() {
        args.push(
            path.rsplit('/')
                .next()
                .unwrap_or("program")
                .to_string(),
        );
    }

    let loader_args = Box::new(LoaderArgs { elf_data, args });
    let task = Task::make_kernel_task(
        elf_loader_entry as *const () as usize as u64,
        "elf_loader",
        Box::into_raw(loader_args) as u64,
        0,
        group,
        current_cwd(),
    )
    .ok_or(ErrorCode::EcNomem)?;

    task_add(task).ok_or(ErrorCode::EcPerm)
}

/// The loader task body. Runs as a kernel task whose group already points
/// at the program's page tables, so every user address below resolves
/// through the demand path.
extern "C" fn elf_loader_entry(args_ptr: u64, _unused: u64) {
    // Ownership of the staged data arrives through arg1.
    let staged = unsafe { Box::from_raw(args_ptr as *mut LoaderArgs) };

    let entry_point = match elf::load_into_current_address_space(&staged.elf_data) {
        Ok(entry) => entry,
        Err(_) => {
            klog_info!("elf_loader: segment load failed");
            return;
        }
    };
    let image_end = elf::image_end(&staged.elf_data);

    let (argc, argv) = copy_args_to_user(image_end, &staged.args);

    let name = staged.args.first().cloned().unwrap_or_else(|| String::from("program"));
    let group = match crate::scheduler::manager::current_group() {
        Some(group) => group,
        None => return,
    };

    let Some(user_task) = Task::make_user_task(
        entry_point,
        &name,
        argc,
        argv,
        USER_STACK_BASE,
        USER_STACK_SIZE,
        group,
        current_cwd(),
    ) else {
        klog_info!("elf_loader: out of memory for the user task");
        return;
    };

    klog_debug!(
        "elf_loader: '{}' entry 0x{:x}, image end 0x{:x}",
        name,
        entry_point,
        image_end
    );

    // The user task takes over this id; falling off the end exits the
    // loader through the task epilogue. The shared group handle keeps the
    // page tables alive.
    let _ = task_replace_current(user_task);
}

/// Bump-allocate `argv` into the region between the image end and the
/// stack base: first the pointer array, then the string bytes.
fn copy_args_to_user(image_end: u64, args: &[String]) -> (u64, u64) {
    let argc = args.len() as u64;
    let mut bump = align_up_u64(image_end.max(0x1000), 8);

    let argv_array = bump;
    bump += (argc + 1) * 8;

    for (index, arg) in args.iter().enumerate() {
        // SAFETY: the loader runs inside the target address space; the
        // region below the stack base is demand-mapped on first touch.
        unsafe {
            let slot = (argv_array + index as u64 * 8) as *mut u64;
            *slot = bump;
            core::ptr::copy_nonoverlapping(arg.as_ptr(), bump as *mut u8, arg.len());
            *((bump + arg.len() as u64) as *mut u8) = 0;
        }
        bump += arg.len() as u64 + 1;
    }
    unsafe {
        *((argv_array + argc * 8) as *mut u64) = 0;
    }

    debug_assert!(bump < USER_STACK_BASE);
    (argc, argv_array)
}
