//! Task objects and task groups.
//!
//! A task owns its kernel stack for the whole of its life; the user stack
//! belongs to the group's address space. The saved CPU-state frame lives on
//! one of those stacks and is rebuilt by the scheduler on every preemption.
//!
//! A task group is the unit of address-space sharing and of collective
//! termination; dropping the last handle releases the group's user frames
//! and page tables.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ffi::c_void;
use core::sync::atomic::{AtomicBool, Ordering};

use phobos_abi::addr::PhysAddr;
use phobos_abi::cpu::{CpuState, TaskEpilogue};
use phobos_abi::task::{TaskId, TaskState, TASK_DEFAULT_STACK_SIZE};

use phobos_mm::kernel_heap::{kfree, kmalloc};
use phobos_mm::mm_constants::FRAME_SIZE_2MB;
use phobos_mm::paging::{release_user_half, PAGE_TABLES_BYTES};

/// Shared state of tasks that share an address space.
pub struct TaskGroupData {
    pml4_phys: PhysAddr,
    termination_pending: AtomicBool,
    /// True for groups that own their page tables (spawned programs);
    /// false for the kernel group whose tables are static.
    owns_address_space: bool,
}

impl TaskGroupData {
    pub fn kernel_group(kernel_pml4: PhysAddr) -> Arc<Self> {
        Arc::new(Self {
            pml4_phys: kernel_pml4,
            termination_pending: AtomicBool::new(false),
            owns_address_space: false,
        })
    }

    /// A group backed by a freshly built `PageTables64` block.
    pub fn owning(tables_phys: PhysAddr) -> Arc<Self> {
        Arc::new(Self {
            pml4_phys: tables_phys,
            termination_pending: AtomicBool::new(false),
            owns_address_space: true,
        })
    }

    pub fn pml4_phys(&self) -> PhysAddr {
        self.pml4_phys
    }

    /// The kernel group shares the static tables and never terminates as a
    /// group.
    pub fn is_kernel_group(&self) -> bool {
        !self.owns_address_space
    }

    pub fn mark_termination_pending(&self) {
        self.termination_pending.store(true, Ordering::Release);
    }

    pub fn is_termination_pending(&self) -> bool {
        self.termination_pending.load(Ordering::Acquire)
    }
}

impl Drop for TaskGroupData {
    fn drop(&mut self) {
        // Last member gone: give back the user frames and the tables block.
        if self.owns_address_space {
            release_user_half(self.pml4_phys);
            phobos_mm::free_consecutive_frames(
                self.pml4_phys.align_down(FRAME_SIZE_2MB),
                PAGE_TABLES_BYTES,
            );
        }
    }
}

pub struct Task {
    pub task_id: TaskId,
    pub name: String,
    pub entrypoint: u64,
    pub arg1: u64,
    pub arg2: u64,
    pub is_user_space: bool,
    /// Stack the task's CPU-state frame is built on: the kernel stack for
    /// kernel tasks, the group's user stack for user tasks.
    pub stack_addr: u64,
    pub stack_size: u64,
    /// Every task has a kernel stack for interrupt and syscall handling.
    pub kernel_stack_addr: u64,
    pub kernel_stack_size: u64,
    pub cpu_state: *mut CpuState,
    pub state: TaskState,
    pub cwd: String,
    /// Tasks blocked on this task's exit.
    pub wait_queue: Vec<TaskId>,
    pub group: Arc<TaskGroupData>,
}

// SAFETY: tasks are only ever touched under the task-manager lock; the raw
// frame pointer aims into stacks the task owns.
unsafe impl Send for Task {}

impl Task {
    /// A kernel task: its own freshly allocated stack doubles as the
    /// interrupt stack.
    pub fn make_kernel_task(
        entrypoint: u64,
        name: &str,
        arg1: u64,
        arg2: u64,
        group: Arc<TaskGroupData>,
        cwd: String,
    ) -> Option<Self> {
        let stack = kmalloc(TASK_DEFAULT_STACK_SIZE as usize);
        if stack.is_null() {
            return None;
        }
        Some(Self {
            task_id: 0,
            name: String::from(name),
            entrypoint,
            arg1,
            arg2,
            is_user_space: false,
            stack_addr: stack as u64,
            stack_size: TASK_DEFAULT_STACK_SIZE,
            kernel_stack_addr: stack as u64,
            kernel_stack_size: TASK_DEFAULT_STACK_SIZE,
            cpu_state: core::ptr::null_mut(),
            state: TaskState::Running,
            cwd,
            wait_queue: Vec::new(),
            group,
        })
    }

    /// A user task over a pre-existing user stack inside `group`'s address
    /// space, plus a private kernel stack for ring-0 entries.
    pub fn make_user_task(
        entrypoint: u64,
        name: &str,
        arg1: u64,
        arg2: u64,
        user_stack_addr: u64,
        user_stack_size: u64,
        group: Arc<TaskGroupData>,
        cwd: String,
    ) -> Option<Self> {
        let kernel_stack = kmalloc(TASK_DEFAULT_STACK_SIZE as usize);
        if kernel_stack.is_null() {
            return None;
        }
        Some(Self {
            task_id: 0,
            name: String::from(name),
            entrypoint,
            arg1,
            arg2,
            is_user_space: true,
            stack_addr: user_stack_addr,
            stack_size: user_stack_size,
            kernel_stack_addr: kernel_stack as u64,
            kernel_stack_size: TASK_DEFAULT_STACK_SIZE,
            cpu_state: core::ptr::null_mut(),
            state: TaskState::Running,
            cwd,
            wait_queue: Vec::new(),
            group,
        })
    }

    /// Lay the initial frame on the task stack:
    /// `0 | free stack | CpuState | TaskEpilogue | stack end`.
    /// The epilogue is where the entry function's `ret` lands.
    pub fn prepare(&mut self, task_id: TaskId, exitpoint: u64) {
        let stack_end = self.stack_addr + self.stack_size;

        let epilogue = (stack_end - size_of::<TaskEpilogue>() as u64) as *mut TaskEpilogue;
        // SAFETY: the stack is owned by this task; user stacks are reachable
        // because preparation runs inside the target address space.
        unsafe {
            (*epilogue) = TaskEpilogue { rip: exitpoint };
        }

        let frame_addr = stack_end - size_of::<TaskEpilogue>() as u64 - size_of::<CpuState>() as u64;
        let frame = frame_addr as *mut CpuState;
        unsafe {
            (*frame) = CpuState::initial(
                self.entrypoint,
                epilogue as u64,
                self.arg1,
                self.arg2,
                self.is_user_space,
            );
        }

        self.cpu_state = frame;
        self.task_id = task_id;
    }

    pub fn kernel_stack_top(&self) -> u64 {
        self.kernel_stack_addr + self.kernel_stack_size
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        // The kernel stack is task-owned; a user stack dies with the
        // group's address space instead.
        if self.kernel_stack_addr != 0 {
            kfree(self.kernel_stack_addr as *mut c_void);
            self.kernel_stack_addr = 0;
        }
    }
}
