//! Wait lists shared by every blocking primitive.
//!
//! Entries are kept unsorted; selection picks the highest priority and,
//! among equal priorities, the lowest sequence number (the task that began
//! waiting first).

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::error::{Error, Result};
use crate::task::{Priority, TaskId};
use crate::time::{Expiry, Ticks};

/// One task blocked on a primitive.
#[derive(Debug)]
pub(crate) struct Waiter<T> {
    pub task: TaskId,
    pub priority: Priority,
    pub seq: u64,
    /// Item carried by the wait: the value a blocked sender wants to
    /// enqueue, or the value handed to a blocked receiver.
    pub payload: Option<T>,
    /// Set when the primitive completed the operation on the waiter's
    /// behalf (ownership or item handed over).
    pub granted: bool,
}

impl<T> Waiter<T> {
    pub fn new(task: TaskId, priority: Priority, seq: u64) -> Self {
        Self {
            task,
            priority,
            seq,
            payload: None,
            granted: false,
        }
    }

    pub fn with_payload(mut self, payload: T) -> Self {
        self.payload = Some(payload);
        self
    }

    fn outranks(&self, other: &Waiter<T>) -> bool {
        self.priority > other.priority
            || (self.priority == other.priority && self.seq < other.seq)
    }
}

/// Fixed-capacity list of waiters. A task waits on at most one primitive
/// at a time, so `MAX_TASKS` entries always suffice.
pub(crate) struct WaitList<T> {
    entries: Vec<Waiter<T>, MAX_TASKS>,
}

impl<T> WaitList<T> {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, waiter: Waiter<T>) -> Result<()> {
        self.entries.push(waiter).map_err(|_| Error::WouldBlock)
    }

    fn position(&self, task: TaskId) -> Option<usize> {
        self.entries.iter().position(|w| w.task == task)
    }

    pub fn remove(&mut self, task: TaskId) -> Option<Waiter<T>> {
        let index = self.position(task)?;
        Some(self.entries.swap_remove(index))
    }

    /// Best waiter that has not been granted yet and passes `eligible`.
    fn best(&self, eligible: impl Fn(&Waiter<T>) -> bool) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, w) in self.entries.iter().enumerate() {
            if w.granted || !eligible(w) {
                continue;
            }
            best = match best {
                Some(b) if !w.outranks(&self.entries[b]) => Some(b),
                _ => Some(i),
            };
        }
        best
    }

    /// Complete the operation of the best waiter: `exchange` moves the
    /// payload in or out, then the waiter is marked granted. The entry stays
    /// in the list until its own task collects it.
    pub fn grant_next(&mut self, exchange: impl FnOnce(&mut Waiter<T>)) -> Option<TaskId> {
        let index = self.best(|_| true)?;
        let waiter = &mut self.entries[index];
        exchange(waiter);
        waiter.granted = true;
        Some(waiter.task)
    }

    /// Mark granted the best waiter that `ready` accepts. Used by
    /// primitives whose waiters retry their operation once woken.
    pub fn grant_next_if(&mut self, ready: impl Fn(&Waiter<T>) -> bool) -> Option<TaskId> {
        let index = self.best(ready)?;
        let waiter = &mut self.entries[index];
        waiter.granted = true;
        Some(waiter.task)
    }

    /// Resolve the wait of `task` after it was woken.
    ///
    /// - `Some(Ok(waiter))`: granted; the entry is removed and returned.
    /// - `Some(Err(Timeout))`: the wait expired; the entry is removed.
    /// - `None`: still waiting.
    pub fn settle(&mut self, task: TaskId, expiry: Expiry, now: Ticks) -> Option<Result<Waiter<T>>> {
        let Some(index) = self.position(task) else {
            return Some(Err(Error::Timeout));
        };
        if self.entries[index].granted {
            return Some(Ok(self.entries.swap_remove(index)));
        }
        if expiry.elapsed(now) {
            self.entries.swap_remove(index);
            return Some(Err(Error::Timeout));
        }
        None
    }
}

/// Progress of a blocking operation future.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Phase {
    Start,
    Waiting { me: TaskId, expiry: Expiry },
    Done,
}
