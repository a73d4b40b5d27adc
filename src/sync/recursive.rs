//! Recursive mutex: owner identity plus acquisition depth.

use super::lock::{Acquire, LockCell};
use crate::error::Result;
use crate::kernel::Kernel;
use crate::task::TaskId;
use crate::time::Wait;
use crate::trace::{ObjectKind, Traced};

/// Control block of a [`RecursiveMutex`].
pub struct RecursiveMutexControl {
    lock: LockCell,
}

impl RecursiveMutexControl {
    pub const fn new() -> Self {
        Self {
            lock: LockCell::new(true),
        }
    }
}

impl Default for RecursiveMutexControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutex its holder may take again without blocking.
///
/// Every `acquire` must be matched by a `release`; the mutex is only
/// available to other tasks once the depth is back to zero.
#[derive(Clone, Copy)]
pub struct RecursiveMutex<'a> {
    kernel: &'a Kernel,
    control: &'a RecursiveMutexControl,
}

impl<'a> RecursiveMutex<'a> {
    pub fn new(kernel: &'a Kernel, control: &'a mut RecursiveMutexControl) -> Self {
        Self { kernel, control }
    }

    pub fn acquire(&self, wait: Wait) -> Acquire<'a> {
        self.control.lock.acquire(self.kernel, wait)
    }

    pub fn try_acquire(&self) -> Result<()> {
        self.control.lock.try_take(self.kernel)
    }

    pub fn release(&self) -> Result<()> {
        self.control.lock.give(self.kernel)
    }

    pub fn holder(&self) -> Option<TaskId> {
        self.control.lock.holder()
    }

    /// Outstanding acquisitions by the holder; zero when free.
    pub fn depth(&self) -> u32 {
        self.control.lock.depth()
    }

    pub fn waiting(&self) -> usize {
        self.control.lock.waiting()
    }
}

impl Traced for RecursiveMutex<'_> {
    const KIND: ObjectKind = ObjectKind::RecursiveMutex;

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

    /// Takes the mutex four times, then gives one level back every 10 ticks.
    async fn nester(mutex: RecursiveMutex<'_>, kernel: &Kernel) -> Infallible {
        for _ in 0..4 {
            mutex.acquire(Wait::NoWait).await.unwrap();
        }
        for _ in 0..4 {
            kernel.delay(10).await;
            mutex.release().unwrap();
        }
        park(kernel).await
    }

    async fn latecomer(mutex: RecursiveMutex<'_>, kernel: &Kernel, got_at: &Cell<Option<u64>>) -> Infallible {
        kernel.delay(1).await;
        mutex.acquire(Wait::Forever).await.unwrap();
        got_at.set(Some(kernel.now()));
        park(kernel).await
    }

    #[test]
    fn test_four_acquisitions_need_four_releases() {
        let kernel = Kernel::new();
        let control = Block::new(RecursiveMutexControl::new());
        let stacks = [Block::new(TestStack::new()), Block::new(TestStack::new())];
        let got_at = Cell::new(None);

        let mutex = RecursiveMutex::new(&kernel, control.claim().unwrap());
        let mut executor = Executor::new(&kernel);
        let a = executor
            .spawn("a", Priority(2), stacks[0].claim().unwrap(), nester(mutex, &kernel))
            .unwrap();
        let b = executor
            .spawn("b", Priority(1), stacks[1].claim().unwrap(), latecomer(mutex, &kernel, &got_at))
            .unwrap();

        executor.start();
        assert_eq!(mutex.depth(), 4);

        executor.run_until(39);
        assert_eq!(mutex.depth(), 1);
        assert_eq!(mutex.holder(), Some(a));
        assert_eq!(mutex.waiting(), 1);
        assert_eq!(got_at.get(), None);

        executor.run_until(40);
        assert_eq!(got_at.get(), Some(40));
        assert_eq!(mutex.holder(), Some(b));
        assert_eq!(mutex.depth(), 1);
    }

    async fn unbalanced(mutex: RecursiveMutex<'_>, kernel: &Kernel, outcome: &Cell<Option<Result<()>>>) -> Infallible {
        mutex.acquire(Wait::Forever).await.unwrap();
        mutex.acquire(Wait::Forever).await.unwrap();
        mutex.release().unwrap();
        mutex.release().unwrap();
        outcome.set(Some(mutex.release()));
        park(kernel).await
    }

    #[test]
    fn test_depth_never_negative() {
        let kernel = Kernel::new();
        let control = Block::new(RecursiveMutexControl::new());
        let stack = Block::new(TestStack::new());
        let outcome = Cell::new(None);

        let mutex = RecursiveMutex::new(&kernel, control.claim().unwrap());
        let mut executor = Executor::new(&kernel);
        executor
            .spawn("a", Priority(1), stack.claim().unwrap(), unbalanced(mutex, &kernel, &outcome))
            .unwrap();

        executor.start();
        assert_eq!(outcome.get(), Some(Err(Error::NotOwner)));
        assert_eq!(mutex.depth(), 0);
        assert_eq!(mutex.holder(), None);
    }

    async fn deep_owner(mutex: RecursiveMutex<'_>, kernel: &Kernel) -> Infallible {
        for _ in 0..3 {
            mutex.acquire(Wait::NoWait).await.unwrap();
        }
        park(kernel).await
    }

    async fn stranger(mutex: RecursiveMutex<'_>, kernel: &Kernel, outcome: &Cell<Option<Result<()>>>) -> Infallible {
        kernel.delay(1).await;
        outcome.set(Some(mutex.release()));
        park(kernel).await
    }

    #[test]
    fn test_release_by_other_task_keeps_depth() {
        let kernel = Kernel::new();
        let control = Block::new(RecursiveMutexControl::new());
        let stacks = [Block::new(TestStack::new()), Block::new(TestStack::new())];
        let outcome = Cell::new(None);

        let mutex = RecursiveMutex::new(&kernel, control.claim().unwrap());
        let mut executor = Executor::new(&kernel);
        let a = executor
            .spawn("owner", Priority(1), stacks[0].claim().unwrap(), deep_owner(mutex, &kernel))
            .unwrap();
        executor
            .spawn("stranger", Priority(2), stacks[1].claim().unwrap(), stranger(mutex, &kernel, &outcome))
            .unwrap();

        executor.start();
        executor.advance(1);
        assert_eq!(outcome.get(), Some(Err(Error::NotOwner)));
        assert_eq!(mutex.holder(), Some(a));
        assert_eq!(mutex.depth(), 3);
    }
}
