//! The task manager: arena of live tasks, the run list, wait queues, task
//! groups, and the schedule/terminate paths.
//!
//! Every mutation happens under one interrupt-disabled lock. Handlers may
//! move the caller off the run list and return; the switch itself always
//! happens in `schedule`, driven by the timer ISR or a syscall disposition.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use phobos_abi::addr::PhysAddr;
use phobos_abi::cpu::CpuState;
use phobos_abi::task::{TaskId, TaskState, INVALID_TASK_ID, MAX_TASKS};
use phobos_lib::{klog_debug, klog_info, klog_warn, IrqMutex};
use phobos_mm::paging::load_address_space;

use super::run_list::RunList;
use super::task::{Task, TaskGroupData};
use crate::time::{add_timer_ms, TimerAction};

/// Kernel stack top of the running task; the syscall entry stub loads RSP
/// from here, and the TSS RSP0 mirrors it.
#[unsafe(no_mangle)]
pub static CURRENT_KERNEL_STACK_TOP: AtomicU64 = AtomicU64::new(0);

struct TaskManagerInner {
    tasks: Vec<Option<Task>>,
    run_list: RunList,
    next_task_id: TaskId,
    kernel_group: Option<Arc<TaskGroupData>>,
    context_switches: u64,
    initialized: bool,
}

impl TaskManagerInner {
    const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            run_list: RunList::new(),
            next_task_id: 1,
            kernel_group: None,
            context_switches: 0,
            initialized: false,
        }
    }

    fn slot_of(&self, task_id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|slot| {
            slot.as_ref()
                .map(|task| task.task_id == task_id)
                .unwrap_or(false)
        })
    }

    fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.slot_of(task_id)
            .and_then(|idx| self.tasks[idx].as_ref())
    }

    fn task_mut(&mut self, task_id: TaskId) -> Option<&mut Task> {
        let idx = self.slot_of(task_id)?;
        self.tasks[idx].as_mut()
    }

    fn insert(&mut self, task: Task) -> Option<()> {
        let idx = self.tasks.iter().position(|slot| slot.is_none())?;
        self.tasks[idx] = Some(task);
        Some(())
    }

    fn live_count(&self) -> usize {
        self.tasks.iter().filter(|slot| slot.is_some()).count()
    }

    /// Detach and drop a task. Wakes its waiters first; dropping releases
    /// the kernel stack and the group reference.
    fn destroy_task(&mut self, task_id: TaskId) {
        let Some(idx) = self.slot_of(task_id) else {
            return;
        };
        let Some(mut task) = self.tasks[idx].take() else {
            return;
        };
        self.run_list.remove(task_id);

        let waiters = core::mem::take(&mut task.wait_queue);
        drop(task);
        for waiter in waiters {
            self.enqueue_back(waiter);
        }
    }

    /// Re-queue a task that was parked on a wait list, unless its group is
    /// being torn down, in which case it dies here instead.
    fn enqueue_back(&mut self, task_id: TaskId) {
        let Some(task) = self.task_mut(task_id) else {
            return;
        };
        if task.group.is_termination_pending() {
            klog_debug!("scheduler: task {} died with its group", task_id);
            self.destroy_task(task_id);
            return;
        }
        task.state = TaskState::Running;
        self.run_list.add(task_id);
    }

    /// Take the current task off the run list; the caller parks its id on
    /// some wait list. The switch happens at the next schedule.
    fn dequeue_current(&mut self) -> Option<TaskId> {
        let current = self.run_list.current()?;
        self.run_list.remove(current);
        if let Some(task) = self.task_mut(current) {
            task.state = TaskState::Blocked;
        }
        Some(current)
    }

    /// Refresh the outgoing task's frame pointer. Kernel frames already
    /// live on the task's own stack; user frames are copied down onto the
    /// task's user stack because the kernel stack is reused.
    fn save_current_context(&mut self, frame: *mut CpuState) {
        let Some(current) = self.run_list.current() else {
            return;
        };
        let Some(task) = self.task_mut(current) else {
            return;
        };

        if task.is_user_space {
            let frame_ref = unsafe { &*frame };
            let dst = (frame_ref.rsp - size_of::<CpuState>() as u64) as *mut CpuState;
            // SAFETY: the outgoing task's address space is still loaded;
            // its user stack is writable from ring 0.
            unsafe { *dst = *frame_ref };
            task.cpu_state = dst;
        } else {
            task.cpu_state = frame;
        }
    }

    /// Elect the next task, activate its address space and kernel stack.
    fn pick_next_and_load_address_space(&mut self) -> *mut CpuState {
        let tasks = &self.tasks;
        let next = self
            .run_list
            .pick_next(|id| {
                tasks
                    .iter()
                    .flatten()
                    .any(|task| task.task_id == id && task.state == TaskState::Running)
            })
            .expect("run list empty: the idle task is gone");

        self.context_switches += 1;
        let task = self.task(next).expect("picked task vanished");
        let pml4 = task.group.pml4_phys();
        let kernel_stack_top = task.kernel_stack_top();
        let frame = task.cpu_state;

        CURRENT_KERNEL_STACK_TOP.store(kernel_stack_top, Ordering::Release);
        crate::interrupts::set_interrupt_stack(kernel_stack_top);
        load_address_space(pml4);
        frame
    }
}

static TASK_MANAGER: IrqMutex<TaskManagerInner> = IrqMutex::new(TaskManagerInner::new());

fn with_manager<R>(f: impl FnOnce(&mut TaskManagerInner) -> R) -> R {
    let mut mgr = TASK_MANAGER.lock();
    f(&mut mgr)
}

/// Boot-time setup: the kernel task group and the empty arena.
pub fn task_manager_init(kernel_pml4: PhysAddr) {
    with_manager(|mgr| {
        mgr.tasks = Vec::new();
        mgr.tasks.resize_with(MAX_TASKS, || None);
        mgr.kernel_group = Some(TaskGroupData::kernel_group(kernel_pml4));
        mgr.next_task_id = 1;
        mgr.initialized = true;
    });
    phobos_fs::procfs::register_psinfo_provider(psinfo_snapshot);
    klog_info!("scheduler: task manager ready ({} slots)", MAX_TASKS);
}

pub fn kernel_group() -> Arc<TaskGroupData> {
    with_manager(|mgr| mgr.kernel_group.clone().expect("task manager not initialized"))
}

/// Where the kernel-task entry function's `ret` lands.
extern "C" fn task_finished_trampoline() {
    crate::syscall::int80::exit_current_via_int80();
}

/// Add a prepared task to the arena and the run list.
pub fn task_add(mut task: Task) -> Option<TaskId> {
    with_manager(|mgr| {
        if !mgr.initialized || mgr.live_count() >= MAX_TASKS {
            klog_warn!("scheduler: no free task slot for '{}'", task.name);
            return None;
        }
        let tid = mgr.next_task_id;
        task.prepare(tid, task_finished_trampoline as *const () as usize as u64);
        mgr.insert(task)?;
        mgr.run_list.add(tid);
        mgr.next_task_id += 1;
        Some(tid)
    })
}

/// Convenience wrapper for kernel tasks in the kernel group.
pub fn task_add_kernel_task(entrypoint: u64, name: &str, arg1: u64, arg2: u64) -> Option<TaskId> {
    let group = kernel_group();
    let cwd = current_cwd();
    let task = Task::make_kernel_task(entrypoint, name, arg1, arg2, group, cwd)?;
    task_add(task)
}

/// Add `task` under the current task's id, handing over its waiters. The
/// caller (the ELF loader) exits right after; the group's page tables
/// survive through the shared group handle.
///
/// The caller's own id is retired to a fresh number and its queue position
/// passes to the successor, so every lookup and wait on the original id
/// lands on the new task while the loader runs out its last instructions.
pub fn task_replace_current(mut task: Task) -> Option<TaskId> {
    with_manager(|mgr| {
        let current = mgr.run_list.current()?;

        // Retire the loader under a fresh id first, so the handed-over id
        // names exactly one task at any point.
        let retired_id = mgr.next_task_id;
        mgr.next_task_id += 1;
        let inherited_waiters = {
            let loader = mgr.task_mut(current)?;
            loader.task_id = retired_id;
            core::mem::take(&mut loader.wait_queue)
        };
        mgr.run_list.remove(current);
        mgr.run_list.set_current(Some(retired_id));

        task.prepare(current, task_finished_trampoline as *const () as usize as u64);
        task.wait_queue = inherited_waiters;
        if mgr.insert(task).is_none() {
            // No slot: give the loader its identity back.
            if let Some(loader) = mgr.task_mut(retired_id) {
                loader.task_id = current;
                mgr.next_task_id -= 1;
            }
            mgr.run_list.add(current);
            mgr.run_list.set_current(Some(current));
            return None;
        }
        mgr.run_list.add(current);
        Some(current)
    })
}

/// The scheduling entry point: save the outgoing context, elect the next
/// task, switch address spaces, hand back the frame to resume.
pub fn schedule(frame: *mut CpuState) -> *mut CpuState {
    with_manager(|mgr| {
        if !mgr.initialized || mgr.run_list.count() == 0 {
            return frame;
        }
        mgr.save_current_context(frame);
        mgr.pick_next_and_load_address_space()
    })
}

/// Terminate the running task: wake waiters, release its kernel stack,
/// elect a successor.
pub fn kill_current_task() -> *mut CpuState {
    with_manager(|mgr| {
        if let Some(current) = mgr.run_list.current() {
            klog_debug!("scheduler: task {} exiting", current);
            mgr.destroy_task(current);
            mgr.run_list.set_current(None);
        }
        mgr.pick_next_and_load_address_space()
    })
}

/// Terminate every task in the current task's group. A faulting member of
/// the kernel group only takes itself down; the kernel group never
/// terminates collectively.
pub fn kill_current_task_group() -> *mut CpuState {
    with_manager(|mgr| {
        let Some(current) = mgr.run_list.current() else {
            return mgr.pick_next_and_load_address_space();
        };
        let Some(group) = mgr.task(current).map(|t| t.group.clone()) else {
            return mgr.pick_next_and_load_address_space();
        };

        if group.is_kernel_group() {
            mgr.destroy_task(current);
            mgr.run_list.set_current(None);
            return mgr.pick_next_and_load_address_space();
        }

        group.mark_termination_pending();

        let members: Vec<TaskId> = mgr
            .tasks
            .iter()
            .flatten()
            .filter(|task| Arc::ptr_eq(&task.group, &group))
            .map(|task| task.task_id)
            .collect();

        klog_info!(
            "scheduler: tearing down task group of {} ({} members)",
            current,
            members.len()
        );
        for member in members {
            mgr.destroy_task(member);
        }
        mgr.run_list.set_current(None);
        mgr.pick_next_and_load_address_space()
    })
}

/// Park the caller on `target`'s exit wait queue.
/// Returns false when the target is already gone (caller keeps running).
pub fn task_wait_for(target: TaskId) -> bool {
    with_manager(|mgr| {
        if mgr.slot_of(target).is_none() || mgr.run_list.current() == Some(target) {
            return false;
        }
        let Some(current) = mgr.dequeue_current() else {
            return false;
        };
        if let Some(target_task) = mgr.task_mut(target) {
            target_task.wait_queue.push(current);
            true
        } else {
            // Target vanished between the checks; resume the caller.
            mgr.enqueue_back(current);
            false
        }
    })
}

/// Move the caller off the run list for `ms` milliseconds. Zero
/// milliseconds is a pure yield. Returns true when the caller was parked
/// (the dispatch layer must then reschedule).
pub fn task_sleep_current_ms(ms: u64) -> bool {
    if ms == 0 {
        return false;
    }
    with_manager(|mgr| {
        let Some(current) = mgr.dequeue_current() else {
            return false;
        };
        add_timer_ms(ms, TimerAction::WakeTask(current));
        true
    })
}

/// Park the caller with no timer; a FIFO writer or task exit brings it
/// back through [`enqueue_task_back`].
pub fn block_current_task() -> Option<TaskId> {
    with_manager(|mgr| mgr.dequeue_current())
}

/// Timer and wait-queue wakeup path.
pub fn enqueue_task_back(task_id: TaskId) {
    with_manager(|mgr| mgr.enqueue_back(task_id));
}

pub fn wake_tasks(task_ids: &[TaskId]) {
    for &task_id in task_ids {
        enqueue_task_back(task_id);
    }
}

pub fn task_current_id() -> TaskId {
    with_manager(|mgr| mgr.run_list.current().unwrap_or(INVALID_TASK_ID))
}

pub fn current_group() -> Option<Arc<TaskGroupData>> {
    with_manager(|mgr| {
        let current = mgr.run_list.current()?;
        mgr.task(current).map(|t| t.group.clone())
    })
}

pub fn current_cwd() -> String {
    with_manager(|mgr| {
        mgr.run_list
            .current()
            .and_then(|id| mgr.task(id))
            .map(|task| task.cwd.clone())
            .unwrap_or_else(|| String::from("/"))
    })
}

pub fn set_current_cwd(cwd: &str) {
    with_manager(|mgr| {
        if let Some(task) = mgr.run_list.current().and_then(|id| mgr.task_mut(id)) {
            task.cwd = String::from(cwd);
        }
    });
}

pub fn task_current_name() -> String {
    with_manager(|mgr| {
        mgr.run_list
            .current()
            .and_then(|id| mgr.task(id))
            .map(|task| task.name.clone())
            .unwrap_or_else(|| String::from("?"))
    })
}

/// Syntactic shutdown for exit_group invoked outside the syscall path.
pub fn task_exit_group_current() -> ! {
    crate::syscall::int80::exit_group_current_via_int80();
}

/// `/proc/psinfo` snapshot.
fn psinfo_snapshot() -> String {
    use core::fmt::Write;

    with_manager(|mgr| {
        let mut out = String::new();
        let _ = writeln!(out, "tid state space name");
        for task in mgr.tasks.iter().flatten() {
            let _ = writeln!(
                out,
                "{:3} {} {} {}",
                task.task_id,
                match task.state {
                    TaskState::Running => "run",
                    TaskState::Blocked => "blk",
                },
                if task.is_user_space { "user" } else { "kern" },
                task.name
            );
        }
        let _ = writeln!(out, "context switches: {}", mgr.context_switches);
        out
    })
}
