//! The round-robin run list: an ordered sequence of task ids plus a cursor
//! naming the next pick. Removal keeps the cursor consistent, so it never
//! lands on a departed task.

use alloc::vec::Vec;

use phobos_abi::task::TaskId;

pub struct RunList {
    queue: Vec<TaskId>,
    /// Index of the next task to pick.
    next_index: usize,
    /// The task currently executing. Stays set even when that task has
    /// been removed from the queue (blocked or dying); the scheduler still
    /// needs it to save the outgoing context.
    current: Option<TaskId>,
}

impl RunList {
    pub const fn new() -> Self {
        Self {
            queue: Vec::new(),
            next_index: 0,
            current: None,
        }
    }

    pub fn count(&self) -> usize {
        self.queue.len()
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.queue.contains(&task_id)
    }

    pub fn add(&mut self, task_id: TaskId) -> bool {
        if self.queue.contains(&task_id) {
            return false;
        }
        // New arrivals go in front of the cursor, so they run after the
        // current round completes.
        self.queue.insert(0, task_id);
        if self.next_index > 0 {
            self.next_index += 1;
        }
        true
    }

    pub fn remove(&mut self, task_id: TaskId) {
        let Some(index) = self.queue.iter().position(|&id| id == task_id) else {
            return;
        };
        self.queue.remove(index);
        // Keep the cursor aimed at the same successor.
        if index < self.next_index {
            self.next_index -= 1;
        }
        if self.next_index >= self.queue.len() {
            self.next_index = 0;
        }
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn set_current(&mut self, task_id: Option<TaskId>) {
        self.current = task_id;
    }

    /// Advance the cursor and return the elected task. `is_runnable` lets
    /// the caller skip tasks that are queued but not in a runnable state;
    /// the idle task keeps this from ever spinning forever.
    pub fn pick_next(&mut self, is_runnable: impl Fn(TaskId) -> bool) -> Option<TaskId> {
        if self.queue.is_empty() {
            return None;
        }

        for _ in 0..self.queue.len() {
            if self.next_index >= self.queue.len() {
                self.next_index = 0;
            }
            let candidate = self.queue[self.next_index];
            self.next_index += 1;
            if is_runnable(candidate) {
                self.current = Some(candidate);
                return Some(candidate);
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.queue.iter().copied()
    }
}

impl Default for RunList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles_through_all() {
        let mut list = RunList::new();
        list.add(1);
        list.add(2);
        list.add(3);

        let mut seen = std::vec::Vec::new();
        for _ in 0..6 {
            seen.push(list.pick_next(|_| true).unwrap());
        }
        // Two full rounds, every task picked twice.
        for id in 1..=3 {
            assert_eq!(seen.iter().filter(|&&t| t == id).count(), 2);
        }
    }

    #[test]
    fn removal_skips_departed_task() {
        let mut list = RunList::new();
        list.add(1);
        list.add(2);
        list.add(3);

        let first = list.pick_next(|_| true).unwrap();
        list.remove(first);
        for _ in 0..4 {
            assert_ne!(list.pick_next(|_| true), Some(first));
        }
    }

    #[test]
    fn current_survives_removal() {
        let mut list = RunList::new();
        list.add(7);
        let picked = list.pick_next(|_| true).unwrap();
        list.remove(picked);
        assert_eq!(list.current(), Some(7));
        assert_eq!(list.count(), 0);
    }

    #[test]
    fn pick_skips_non_runnable() {
        let mut list = RunList::new();
        list.add(1);
        list.add(2);
        let picked = list.pick_next(|id| id != 2);
        assert_eq!(picked, Some(1));
        let picked = list.pick_next(|id| id != 2);
        assert_eq!(picked, Some(1));
    }
}
