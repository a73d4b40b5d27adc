//! Ownership lock shared by the plain and the recursive mutex.
//!
//! State is `(holder, depth)`. A plain lock never lets depth exceed 1; a
//! recursive lock lets its holder re-enter. Release at depth 0 hands
//! ownership straight to the best waiter, so a task that is woken already
//! holds the lock.

use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use critical_section::Mutex;

use super::wait::{Phase, WaitList, Waiter};
use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::task::TaskId;
use crate::time::{Expiry, Wait};

pub(crate) struct LockState {
    holder: Option<TaskId>,
    depth: u32,
    recursive: bool,
    waiters: WaitList<()>,
    pub(crate) name: Option<&'static str>,
}

impl LockState {
    /// Take the lock for `me` if that needs no waiting.
    fn try_take(&mut self, me: TaskId) -> bool {
        match self.holder {
            None => {
                self.holder = Some(me);
                self.depth = 1;
                true
            }
            Some(holder) if holder == me && self.recursive => {
                self.depth += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Drop one level of ownership. Returns the task the lock was handed
    /// to, if the release freed it and somebody was waiting.
    fn give(&mut self, me: TaskId) -> Result<Option<TaskId>> {
        if self.holder != Some(me) {
            return Err(Error::NotOwner);
        }
        self.depth -= 1;
        if self.depth > 0 {
            return Ok(None);
        }

        self.holder = self.waiters.grant_next(|_| {});
        if self.holder.is_some() {
            self.depth = 1;
        }
        Ok(self.holder)
    }
}

pub(crate) struct LockCell {
    state: Mutex<RefCell<LockState>>,
}

impl LockCell {
    pub const fn new(recursive: bool) -> Self {
        Self {
            state: Mutex::new(RefCell::new(LockState {
                holder: None,
                depth: 0,
                recursive,
                waiters: WaitList::new(),
                name: None,
            })),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut LockState) -> R) -> R {
        super::critical_section(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    pub fn holder(&self) -> Option<TaskId> {
        self.with(|s| s.holder)
    }

    pub fn depth(&self) -> u32 {
        self.with(|s| s.depth)
    }

    pub fn waiting(&self) -> usize {
        self.with(|s| s.waiters.len())
    }

    pub fn try_take(&self, kernel: &Kernel) -> Result<()> {
        let me = kernel.current().ok_or(Error::NoTask)?;
        if self.with(|s| s.try_take(me)) {
            Ok(())
        } else {
            Err(Error::WouldBlock)
        }
    }

    pub fn give(&self, kernel: &Kernel) -> Result<()> {
        let me = kernel.current().ok_or(Error::NoTask)?;
        let next = self.with(|s| s.give(me)).inspect_err(|_| {
            tracing::warn!(
                "task {} released {} without holding it",
                me.index(),
                self.with(|s| s.name).unwrap_or("a mutex")
            );
        })?;
        if let Some(task) = next {
            tracing::trace!("mutex handed from task {} to task {}", me.index(), task.index());
            kernel.wake(task);
        }
        Ok(())
    }

    pub fn acquire<'a>(&'a self, kernel: &'a Kernel, wait: Wait) -> Acquire<'a> {
        Acquire {
            kernel,
            lock: self,
            wait,
            phase: Phase::Start,
        }
    }
}

/// Future returned by `acquire` on both mutex kinds.
///
/// Dropping it while blocked withdraws the request; if ownership had
/// already been handed over, it is released again.
pub struct Acquire<'a> {
    kernel: &'a Kernel,
    lock: &'a LockCell,
    wait: Wait,
    phase: Phase,
}

impl Future for Acquire<'_> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();
        match this.phase {
            Phase::Start => {
                let Some(me) = this.kernel.current() else {
                    this.phase = Phase::Done;
                    return Poll::Ready(Err(Error::NoTask));
                };
                if this.lock.with(|s| s.try_take(me)) {
                    this.phase = Phase::Done;
                    return Poll::Ready(Ok(()));
                }

                let expiry = this.wait.expiry(this.kernel.now());
                if expiry == Expiry::Immediate {
                    this.phase = Phase::Done;
                    return Poll::Ready(Err(Error::WouldBlock));
                }

                let waiter = Waiter::new(me, this.kernel.priority_of(me), this.kernel.next_seq());
                if let Err(e) = this.lock.with(|s| s.waiters.push(waiter)) {
                    this.phase = Phase::Done;
                    return Poll::Ready(Err(e));
                }
                this.kernel.block_current(expiry.deadline());
                this.phase = Phase::Waiting { me, expiry };
                Poll::Pending
            }
            Phase::Waiting { me, expiry } => {
                let now = this.kernel.now();
                match this.lock.with(|s| s.waiters.settle(me, expiry, now)) {
                    Some(outcome) => {
                        this.phase = Phase::Done;
                        Poll::Ready(outcome.map(|_| ()))
                    }
                    None => {
                        this.kernel.block_current(expiry.deadline());
                        Poll::Pending
                    }
                }
            }
            Phase::Done => panic!("`Acquire` polled after completion"),
        }
    }
}

impl Drop for Acquire<'_> {
    fn drop(&mut self) {
        let Phase::Waiting { me, .. } = self.phase else {
            return;
        };
        let next = self.lock.with(|s| match s.waiters.remove(me) {
            Some(waiter) if waiter.granted => s.give(me).ok().flatten(),
            _ => None,
        });
        if let Some(task) = next {
            self.kernel.wake(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Priority, TaskState};
    use crate::testing::poll_as;
    use core::pin::pin;

    fn task(kernel: &Kernel, name: &'static str) -> TaskId {
        kernel.register(name, Priority::NORMAL).unwrap()
    }

    #[test]
    fn test_plain_lock_does_not_reenter() {
        let kernel = Kernel::new();
        let a = task(&kernel, "a");
        let lock = LockCell::new(false);

        assert!(lock.with(|s| s.try_take(a)));
        assert!(!lock.with(|s| s.try_take(a)));
        assert_eq!(lock.depth(), 1);
    }

    #[test]
    fn test_recursive_lock_counts_depth() {
        let kernel = Kernel::new();
        let a = task(&kernel, "a");
        let lock = LockCell::new(true);

        for _ in 0..3 {
            assert!(lock.with(|s| s.try_take(a)));
        }
        assert_eq!(lock.depth(), 3);
        assert_eq!(lock.with(|s| s.give(a)), Ok(None));
        assert_eq!(lock.with(|s| s.give(a)), Ok(None));
        assert_eq!(lock.with(|s| s.give(a)), Ok(None));
        assert_eq!(lock.holder(), None);
        assert_eq!(lock.with(|s| s.give(a)), Err(Error::NotOwner));
    }

    #[test]
    fn test_release_hands_off_to_waiter() {
        let kernel = Kernel::new();
        let a = task(&kernel, "a");
        let b = task(&kernel, "b");
        let lock = LockCell::new(false);

        assert!(lock.with(|s| s.try_take(a)));
        lock.with(|s| s.waiters.push(Waiter::new(b, Priority::NORMAL, 1)))
            .unwrap();

        assert_eq!(lock.with(|s| s.give(b)), Err(Error::NotOwner));
        assert_eq!(lock.with(|s| s.give(a)), Ok(Some(b)));
        assert_eq!(lock.holder(), Some(b));
        assert_eq!(lock.depth(), 1);
    }

    #[test]
    fn test_dropped_acquire_passes_ownership_on() {
        let kernel = Kernel::new();
        let a = kernel.register("a", Priority::LOW).unwrap();
        let b = kernel.register("b", Priority::HIGH).unwrap();
        let c = kernel.register("c", Priority::NORMAL).unwrap();
        let lock = LockCell::new(false);
        assert!(lock.with(|s| s.try_take(a)));

        let mut c_acquire = pin!(lock.acquire(&kernel, Wait::Forever));
        {
            let mut b_acquire = pin!(lock.acquire(&kernel, Wait::Forever));
            assert_eq!(poll_as(&kernel, b, b_acquire.as_mut()), Poll::Pending);
            assert_eq!(poll_as(&kernel, c, c_acquire.as_mut()), Poll::Pending);
            assert_eq!(lock.waiting(), 2);

            // Handed to b, which goes away before it runs again.
            assert_eq!(lock.with(|s| s.give(a)), Ok(Some(b)));
            assert_eq!(lock.holder(), Some(b));
        }

        assert_eq!(lock.holder(), Some(c));
        assert_eq!(lock.waiting(), 1);
        assert_eq!(kernel.task_state(c), Some(TaskState::Ready));
        assert_eq!(poll_as(&kernel, c, c_acquire.as_mut()), Poll::Ready(Ok(())));
        assert_eq!(lock.waiting(), 0);
    }

    #[test]
    fn test_dropped_acquire_withdraws_wait() {
        let kernel = Kernel::new();
        let a = kernel.register("a", Priority::LOW).unwrap();
        let b = kernel.register("b", Priority::HIGH).unwrap();
        let lock = LockCell::new(false);
        assert!(lock.with(|s| s.try_take(a)));

        {
            let mut acquire = pin!(lock.acquire(&kernel, Wait::Forever));
            assert_eq!(poll_as(&kernel, b, acquire.as_mut()), Poll::Pending);
            assert_eq!(lock.waiting(), 1);
        }

        assert_eq!(lock.waiting(), 0);
        assert_eq!(lock.with(|s| s.give(a)), Ok(None));
        assert_eq!(lock.holder(), None);
    }

    #[test]
    fn test_operations_outside_a_task_fail() {
        let kernel = Kernel::new();
        let lock = LockCell::new(false);
        assert_eq!(lock.try_take(&kernel), Err(Error::NoTask));
        assert_eq!(lock.give(&kernel), Err(Error::NoTask));
    }
}
