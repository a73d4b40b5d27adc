//! Plain (non-recursive) mutex.

use super::lock::{Acquire, LockCell};
use crate::error::Result;
use crate::kernel::Kernel;
use crate::task::TaskId;
use crate::time::Wait;
use crate::trace::{ObjectKind, Traced};

/// Control block of a [`Mutex`], placed in an arena block.
pub struct MutexControl {
    lock: LockCell,
}

impl MutexControl {
    pub const fn new() -> Self {
        Self {
            lock: LockCell::new(false),
        }
    }
}

impl Default for MutexControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary ownership token: Free or held by exactly one task.
///
/// Only the holder may release it. A holder that acquires it again blocks
/// on itself; use [`RecursiveMutex`](super::RecursiveMutex) for re-entry.
#[derive(Clone, Copy)]
pub struct Mutex<'a> {
    kernel: &'a Kernel,
    control: &'a MutexControl,
}

impl<'a> Mutex<'a> {
    /// Build the mutex over its claimed control block.
    pub fn new(kernel: &'a Kernel, control: &'a mut MutexControl) -> Self {
        Self { kernel, control }
    }

    /// Take ownership, waiting according to `wait`.
    pub fn acquire(&self, wait: Wait) -> Acquire<'a> {
        self.control.lock.acquire(self.kernel, wait)
    }

    pub fn try_acquire(&self) -> Result<()> {
        self.control.lock.try_take(self.kernel)
    }

    /// Give ownership back. Fails with `NotOwner` for any task but the
    /// holder, leaving the mutex untouched.
    pub fn release(&self) -> Result<()> {
        self.control.lock.give(self.kernel)
    }

    pub fn holder(&self) -> Option<TaskId> {
        self.control.lock.holder()
    }

    pub fn is_locked(&self) -> bool {
        self.holder().is_some()
    }

    /// Number of tasks blocked in `acquire`.
    pub fn waiting(&self) -> usize {
        self.control.lock.waiting()
    }
}

impl Traced for Mutex<'_> {
    const KIND: ObjectKind = ObjectKind::Mutex;

    fn set_trace_name(&self, name: &'static str) {
        self.control.lock.with(|s| s.name = Some(name));
    }

    fn trace_name(&self) -> Option<&'static str> {
        self.control.lock.with(|s| s.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Block;
    use crate::error::Error;
    use crate::executor::Executor;
    use crate::task::Priority;
    use crate::testing::{park, TestStack};
    use core::cell::Cell;
    use core::convert::Infallible;

    async fn hold_for(mutex: Mutex<'_>, kernel: &Kernel, ticks: u64, inside: &Cell<u32>, max: &Cell<u32>) -> Infallible {
        loop {
            mutex.acquire(Wait::Forever).await.unwrap();
            inside.set(inside.get() + 1);
            max.set(max.get().max(inside.get()));
            kernel.delay(ticks).await;
            inside.set(inside.get() - 1);
            mutex.release().unwrap();
            kernel.delay(1).await;
        }
    }

    #[test]
    fn test_at_most_one_holder() {
        let kernel = Kernel::new();
        let control = Block::new(MutexControl::new());
        let stacks = [Block::new(TestStack::new()), Block::new(TestStack::new())];
        let inside = Cell::new(0);
        let max = Cell::new(0);

        let mutex = Mutex::new(&kernel, control.claim().unwrap());
        let mut executor = Executor::new(&kernel);
        executor
            .spawn("a", Priority(2), stacks[0].claim().unwrap(), hold_for(mutex, &kernel, 7, &inside, &max))
            .unwrap();
        executor
            .spawn("b", Priority(1), stacks[1].claim().unwrap(), hold_for(mutex, &kernel, 3, &inside, &max))
            .unwrap();

        executor.start();
        executor.advance(200);
        assert_eq!(max.get(), 1);
    }

    async fn intruder(mutex: Mutex<'_>, kernel: &Kernel, outcome: &Cell<Option<Result<()>>>) -> Infallible {
        kernel.delay(1).await;
        outcome.set(Some(mutex.release()));
        park(kernel).await
    }

    async fn owner(mutex: Mutex<'_>, kernel: &Kernel) -> Infallible {
        mutex.acquire(Wait::Forever).await.unwrap();
        park(kernel).await
    }

    #[test]
    fn test_release_by_non_holder_fails() {
        let kernel = Kernel::new();
        let control = Block::new(MutexControl::new());
        let stacks = [Block::new(TestStack::new()), Block::new(TestStack::new())];
        let outcome = Cell::new(None);

        let mutex = Mutex::new(&kernel, control.claim().unwrap());
        let mut executor = Executor::new(&kernel);
        let a = executor
            .spawn("owner", Priority(1), stacks[0].claim().unwrap(), owner(mutex, &kernel))
            .unwrap();
        executor
            .spawn("intruder", Priority(1), stacks[1].claim().unwrap(), intruder(mutex, &kernel, &outcome))
            .unwrap();

        executor.start();
        executor.advance(1);
        assert_eq!(outcome.get(), Some(Err(Error::NotOwner)));
        assert_eq!(mutex.holder(), Some(a));
    }

    async fn timed(mutex: Mutex<'_>, kernel: &Kernel, wait: Wait, outcome: &Cell<Option<Result<()>>>) -> Infallible {
        kernel.delay(1).await;
        outcome.set(Some(mutex.acquire(wait).await));
        park(kernel).await
    }

    #[test]
    fn test_bounded_wait_times_out() {
        let kernel = Kernel::new();
        let control = Block::new(MutexControl::new());
        let stacks = [Block::new(TestStack::new()), Block::new(TestStack::new())];
        let outcome = Cell::new(None);

        let mutex = Mutex::new(&kernel, control.claim().unwrap());
        let mut executor = Executor::new(&kernel);
        executor
            .spawn("owner", Priority(1), stacks[0].claim().unwrap(), owner(mutex, &kernel))
            .unwrap();
        executor
            .spawn("timed", Priority(1), stacks[1].claim().unwrap(), timed(mutex, &kernel, Wait::For(5), &outcome))
            .unwrap();

        executor.start();
        executor.advance(5);
        assert_eq!(outcome.get(), None);
        assert_eq!(mutex.waiting(), 1);
        executor.advance(1);
        assert_eq!(outcome.get(), Some(Err(Error::Timeout)));
        assert_eq!(mutex.waiting(), 0);
    }

    #[test]
    fn test_no_wait_on_held_mutex() {
        let kernel = Kernel::new();
        let control = Block::new(MutexControl::new());
        let stacks = [Block::new(TestStack::new()), Block::new(TestStack::new())];
        let outcome = Cell::new(None);

        let mutex = Mutex::new(&kernel, control.claim().unwrap());
        let mut executor = Executor::new(&kernel);
        executor
            .spawn("owner", Priority(1), stacks[0].claim().unwrap(), owner(mutex, &kernel))
            .unwrap();
        executor
            .spawn("timed", Priority(1), stacks[1].claim().unwrap(), timed(mutex, &kernel, Wait::NoWait, &outcome))
            .unwrap();

        executor.start();
        executor.advance(1);
        assert_eq!(outcome.get(), Some(Err(Error::WouldBlock)));
    }

    async fn contender(mutex: Mutex<'_>, kernel: &Kernel, tag: u32, order: &Cell<u32>) -> Infallible {
        kernel.delay(u64::from(tag)).await;
        mutex.acquire(Wait::Forever).await.unwrap();
        order.set(order.get() * 10 + tag);
        mutex.release().unwrap();
        park(kernel).await
    }

    async fn gatekeeper(mutex: Mutex<'_>, kernel: &Kernel) -> Infallible {
        mutex.acquire(Wait::Forever).await.unwrap();
        kernel.delay(10).await;
        mutex.release().unwrap();
        park(kernel).await
    }

    #[test]
    fn test_waiters_released_by_priority_then_fifo() {
        let kernel = Kernel::new();
        let control = Block::new(MutexControl::new());
        let stacks = [
            Block::new(TestStack::new()),
            Block::new(TestStack::new()),
            Block::new(TestStack::new()),
            Block::new(TestStack::new()),
        ];
        let order = Cell::new(0);

        let mutex = Mutex::new(&kernel, control.claim().unwrap());
        let mut executor = Executor::new(&kernel);
        executor
            .spawn("gate", Priority(1), stacks[0].claim().unwrap(), gatekeeper(mutex, &kernel))
            .unwrap();
        // Tag doubles as the tick at which each contender starts waiting.
        executor
            .spawn("first", Priority(1), stacks[1].claim().unwrap(), contender(mutex, &kernel, 1, &order))
            .unwrap();
        executor
            .spawn("second", Priority(1), stacks[2].claim().unwrap(), contender(mutex, &kernel, 2, &order))
            .unwrap();
        executor
            .spawn("urgent", Priority(3), stacks[3].claim().unwrap(), contender(mutex, &kernel, 3, &order))
            .unwrap();

        executor.start();
        executor.advance(20);
        assert_eq!(order.get(), 312);
    }
}
