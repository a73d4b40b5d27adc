//! # Scheduler
//!
//! Fixed-priority scheduling state: the static TCB table, the tick counter
//! and the ready-selection rule.
//!
//! ## Scheduling Algorithm
//!
//! 1. **Tick**: advance time; every Blocked task whose `wake_at` has passed
//!    becomes Ready (delay end or bounded-wait timeout).
//! 2. **Select**: the Ready task with the highest priority runs next; among
//!    equal priorities, the one that became Ready first.
//! 3. **Finish**: a task that gives control back without blocking or
//!    suspending (a yield) is re-queued behind its peers.
//!
//! This module holds plain data. The [`Kernel`](crate::kernel::Kernel)
//! wraps it in a critical section.

use crate::config::MAX_TASKS;
use crate::error::ConstructionFailure;
use crate::task::{Priority, TaskControlBlock, TaskId, TaskState};
use crate::time::Ticks;

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state.
///
/// - All TCBs are stored inline in a fixed-size array (no heap)
/// - `current` is the task being polled, if any
/// - `seq` orders Ready transitions and waits for FIFO fairness
pub struct Scheduler {
    /// Fixed-size table of TCBs, indexed by [`TaskId`].
    pub tasks: [TaskControlBlock; MAX_TASKS],

    /// Number of allocated slots.
    pub task_count: usize,

    /// Task currently being polled.
    pub current: Option<TaskId>,

    /// Monotonic tick counter.
    pub tick_count: Ticks,

    /// Number of times a different task was selected than the last one.
    pub context_switches: u32,

    last_selected: Option<TaskId>,
    seq: u64,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; MAX_TASKS],
            task_count: 0,
            current: None,
            tick_count: 0,
            context_switches: 0,
            last_selected: None,
            seq: 0,
        }
    }

    /// Next value of the shared ordering sequence.
    pub fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Register a new task, Ready to run.
    pub fn create_task(
        &mut self,
        name: &'static str,
        priority: Priority,
    ) -> Result<TaskId, ConstructionFailure> {
        if self.task_count >= MAX_TASKS {
            return Err(ConstructionFailure::TaskTableFull);
        }

        let id = TaskId::new(self.task_count);
        let seq = self.next_seq();
        self.tasks[id.index()].init(name, priority, seq);
        self.task_count += 1;
        Ok(id)
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskControlBlock> {
        self.tasks[..self.task_count].get(id.index())
    }

    fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskControlBlock> {
        self.tasks[..self.task_count].get_mut(id.index())
    }

    /// Advance time by one tick and release expired waits.
    ///
    /// Returns how many tasks were made Ready.
    pub fn tick(&mut self) -> usize {
        self.tick_count += 1;
        let now = self.tick_count;

        let mut woken = 0;
        for i in 0..self.task_count {
            let expired = self.tasks[i].state == TaskState::Blocked
                && self.tasks[i].wake_at.is_some_and(|at| at <= now);
            if expired {
                let seq = self.next_seq();
                self.tasks[i].make_ready(seq);
                woken += 1;
            }
        }
        woken
    }

    /// Select the next task to run and mark it Running.
    ///
    /// Returns `None` when no task is Ready.
    pub fn schedule(&mut self) -> Option<TaskId> {
        let mut best: Option<usize> = None;
        for i in 0..self.task_count {
            if !self.tasks[i].is_runnable() {
                continue;
            }
            best = match best {
                Some(b) if !self.tasks[i].outranks(&self.tasks[b]) => Some(b),
                _ => Some(i),
            };
        }

        let id = TaskId::new(best?);
        if self.last_selected != Some(id) {
            self.context_switches += 1;
            self.last_selected = Some(id);
        }

        let tcb = &mut self.tasks[id.index()];
        tcb.state = TaskState::Running;
        tcb.activations += 1;
        self.current = Some(id);
        Some(id)
    }

    /// Called after a task has been polled. A task still Running gave
    /// control back voluntarily and goes behind its peers.
    pub fn finish(&mut self, id: TaskId) {
        let seq = self.next_seq();
        if let Some(tcb) = self.get_mut(id) {
            if tcb.state == TaskState::Running {
                tcb.make_ready(seq);
            }
        }
        self.current = None;
    }

    /// Block the current task until woken or until `wake_at`.
    pub fn block_current(&mut self, wake_at: Option<Ticks>) {
        if let Some(id) = self.current {
            let tcb = &mut self.tasks[id.index()];
            tcb.state = TaskState::Blocked;
            tcb.wake_at = wake_at;
        }
    }

    /// Make a Blocked task Ready. Tasks in any other state are untouched.
    pub fn wake(&mut self, id: TaskId) -> bool {
        let seq = self.next_seq();
        match self.get_mut(id) {
            Some(tcb) if tcb.state == TaskState::Blocked => {
                tcb.make_ready(seq);
                true
            }
            _ => false,
        }
    }

    /// Suspend a task, whatever its state. Any pending timeout is dropped;
    /// the task re-checks its wait condition when resumed.
    pub fn suspend(&mut self, id: TaskId) {
        if let Some(tcb) = self.get_mut(id) {
            tcb.state = TaskState::Suspended;
            tcb.wake_at = None;
        }
    }

    /// Resume a suspended task.
    pub fn resume(&mut self, id: TaskId) -> bool {
        let seq = self.next_seq();
        match self.get_mut(id) {
            Some(tcb) if tcb.state == TaskState::Suspended => {
                tcb.make_ready(seq);
                true
            }
            _ => false,
        }
    }

    /// Number of tasks in the given state.
    pub fn count_in(&self, state: TaskState) -> usize {
        self.tasks[..self.task_count]
            .iter()
            .filter(|t| t.active && t.state == state)
            .count()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_empty() {
        let mut sched = Scheduler::new();
        assert_eq!(sched.task_count, 0);
        assert_eq!(sched.schedule(), None);
    }

    #[test]
    fn test_task_table_full() {
        let mut sched = Scheduler::new();
        for _ in 0..MAX_TASKS {
            sched.create_task("t", Priority::LOW).unwrap();
        }
        assert_eq!(
            sched.create_task("extra", Priority::LOW),
            Err(ConstructionFailure::TaskTableFull)
        );
    }

    #[test]
    fn test_priority_order() {
        let mut sched = Scheduler::new();
        let low = sched.create_task("low", Priority::LOW).unwrap();
        let high = sched.create_task("high", Priority::HIGH).unwrap();

        assert_eq!(sched.schedule(), Some(high));
        sched.block_current(None);
        sched.finish(high);

        assert_eq!(sched.schedule(), Some(low));
    }

    #[test]
    fn test_equal_priority_round_robin() {
        let mut sched = Scheduler::new();
        let a = sched.create_task("a", Priority::NORMAL).unwrap();
        let b = sched.create_task("b", Priority::NORMAL).unwrap();

        assert_eq!(sched.schedule(), Some(a));
        sched.finish(a); // yielded, goes behind b
        assert_eq!(sched.schedule(), Some(b));
        sched.finish(b);
        assert_eq!(sched.schedule(), Some(a));
    }

    #[test]
    fn test_block_until_tick() {
        let mut sched = Scheduler::new();
        let t = sched.create_task("t", Priority::LOW).unwrap();

        sched.schedule();
        sched.block_current(Some(2));
        sched.finish(t);
        assert_eq!(sched.get(t).unwrap().state, TaskState::Blocked);

        assert_eq!(sched.tick(), 0);
        assert_eq!(sched.schedule(), None);
        assert_eq!(sched.tick(), 1);
        assert_eq!(sched.schedule(), Some(t));
    }

    #[test]
    fn test_wake_only_blocked() {
        let mut sched = Scheduler::new();
        let t = sched.create_task("t", Priority::LOW).unwrap();
        assert!(!sched.wake(t)); // Ready already

        sched.schedule();
        sched.block_current(None);
        sched.finish(t);
        assert!(sched.wake(t));
        assert_eq!(sched.get(t).unwrap().state, TaskState::Ready);
    }

    #[test]
    fn test_suspend_resume() {
        let mut sched = Scheduler::new();
        let t = sched.create_task("t", Priority::NORMAL).unwrap();
        sched.suspend(t);
        assert_eq!(sched.get(t).unwrap().state, TaskState::Suspended);
        assert_eq!(sched.schedule(), None);

        // Wake does not override an explicit suspend.
        assert!(!sched.wake(t));
        assert!(sched.resume(t));
        assert!(!sched.resume(t));
        assert_eq!(sched.schedule(), Some(t));
    }

    #[test]
    fn test_context_switch_count() {
        let mut sched = Scheduler::new();
        let a = sched.create_task("a", Priority::NORMAL).unwrap();
        let b = sched.create_task("b", Priority::NORMAL).unwrap();
        sched.schedule();
        sched.finish(a);
        sched.schedule();
        sched.finish(b);
        assert_eq!(sched.context_switches, 2);
        assert_eq!(sched.count_in(TaskState::Ready), 2);
    }
}
