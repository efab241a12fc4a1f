//! Millisecond timers driven by the PIT tick.
//!
//! Timers live in a delta-encoded list sorted ascending by remaining
//! ticks: the head carries the distance to its deadline, every later entry
//! the distance to its predecessor. Each tick decrements only the head;
//! entries that reach zero fire and drop off.

use alloc::vec::Vec;

use phobos_abi::task::TaskId;
use phobos_lib::IrqMutex;

use phobos_drivers::pit;

#[derive(Clone, Copy, Debug)]
pub enum TimerAction {
    /// Move a sleeping task back onto the run list.
    WakeTask(TaskId),
    /// Plain callback, for boot-time periodic work.
    Callback(fn()),
}

struct Timer {
    delta_ticks: u64,
    action: TimerAction,
}

struct TimerList {
    timers: Vec<Timer>,
}

impl TimerList {
    const fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Insert a one-shot timer `total_ticks` from now, keeping the delta
    /// encoding intact.
    fn insert(&mut self, total_ticks: u64, action: TimerAction) {
        let mut accumulated = 0u64;
        let mut index = self.timers.len();

        for (i, timer) in self.timers.iter().enumerate() {
            if accumulated + timer.delta_ticks > total_ticks {
                index = i;
                break;
            }
            accumulated += timer.delta_ticks;
        }

        let delta = total_ticks - accumulated;
        if index < self.timers.len() {
            self.timers[index].delta_ticks -= delta;
        }
        self.timers.insert(index, Timer { delta_ticks: delta, action });
    }

    /// One tick: decrement the head, collect every timer that expired.
    fn tick(&mut self, fired: &mut Vec<TimerAction>) {
        if let Some(head) = self.timers.first_mut() {
            head.delta_ticks = head.delta_ticks.saturating_sub(1);
        }
        while let Some(head) = self.timers.first() {
            if head.delta_ticks != 0 {
                break;
            }
            fired.push(self.timers.remove(0).action);
        }
    }

    fn cancel_wake(&mut self, task_id: TaskId) {
        if let Some(index) = self.timers.iter().position(|t| {
            matches!(t.action, TimerAction::WakeTask(id) if id == task_id)
        }) {
            let removed = self.timers.remove(index);
            if index < self.timers.len() {
                self.timers[index].delta_ticks += removed.delta_ticks;
            }
        }
    }
}

static TIMERS: IrqMutex<TimerList> = IrqMutex::new(TimerList::new());

pub fn ms_to_ticks(ms: u64) -> u64 {
    (ms * pit::frequency_hz() as u64).div_ceil(1000).max(1)
}

/// Arm a one-shot timer `ms` milliseconds out.
pub fn add_timer_ms(ms: u64, action: TimerAction) {
    TIMERS.lock().insert(ms_to_ticks(ms), action);
}

pub fn cancel_wake_timer(task_id: TaskId) {
    TIMERS.lock().cancel_wake(task_id);
}

/// The PIT ISR body: advance the wheel, run what fired.
pub fn timer_tick() {
    let mut fired = Vec::new();
    TIMERS.lock().tick(&mut fired);

    for action in fired {
        match action {
            TimerAction::WakeTask(task_id) => {
                crate::scheduler::manager::enqueue_task_back(task_id);
            }
            TimerAction::Callback(callback) => callback(),
        }
    }
}

pub fn uptime_ms() -> u64 {
    pit::uptime_ms()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(list: &mut TimerList, ticks: u64) -> std::vec::Vec<TimerAction> {
        let mut all = Vec::new();
        for _ in 0..ticks {
            list.tick(&mut all);
        }
        all
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut list = TimerList::new();
        list.insert(3, TimerAction::WakeTask(3));
        list.insert(1, TimerAction::WakeTask(1));
        list.insert(2, TimerAction::WakeTask(2));

        let fired = drain(&mut list, 3);
        let ids: std::vec::Vec<u32> = fired
            .iter()
            .map(|a| match a {
                TimerAction::WakeTask(id) => *id,
                _ => 0,
            })
            .collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn equal_deadlines_fire_together() {
        let mut list = TimerList::new();
        list.insert(2, TimerAction::WakeTask(1));
        list.insert(2, TimerAction::WakeTask(2));

        let mut fired = Vec::new();
        list.tick(&mut fired);
        assert!(fired.is_empty());
        list.tick(&mut fired);
        assert_eq!(fired.len(), 2);
    }

    #[test]
    fn cancel_repairs_successor_delta() {
        let mut list = TimerList::new();
        list.insert(1, TimerAction::WakeTask(1));
        list.insert(3, TimerAction::WakeTask(3));
        list.cancel_wake(1);

        let fired = drain(&mut list, 3);
        assert_eq!(fired.len(), 1);
        assert!(matches!(fired[0], TimerAction::WakeTask(3)));
    }
}
