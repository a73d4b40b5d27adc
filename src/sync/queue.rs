//! Bounded FIFO of fixed-size items over arena storage.
//!
//! Items are copied in and out by value. When a receiver is already
//! waiting, `send` hands the item straight to it instead of going through
//! the ring; when a slot frees up, the best blocked sender's item is
//! admitted in the same critical section. Either way FIFO order holds.
//!
//! An item handed to a receiver keeps a slot reserved until that receiver
//! collects it, so a cancelled receive can always put the item back.

use core::cell::RefCell;
use core::future::Future;
use core::mem::MaybeUninit;
use core::pin::Pin;
use core::task::{Context, Poll};

use critical_section::Mutex;
use heapless::Vec;

use super::wait::{Phase, WaitList, Waiter};
use crate::arena::QueueStorage;
use crate::config::MAX_TASKS;
use crate::error::{ConstructionFailure, Error, Result};
use crate::kernel::Kernel;
use crate::task::TaskId;
use crate::time::{Expiry, Wait};
use crate::trace::{ObjectKind, Traced};

/// Read position and fill level of the ring. Slots `head..head + len`
/// (modulo capacity) are initialized.
#[derive(Debug, Clone, Copy)]
struct Ring {
    head: usize,
    len: usize,
}

impl Ring {
    fn push_back<T: Copy>(&mut self, slots: &mut [MaybeUninit<T>], item: T) {
        let tail = (self.head + self.len) % slots.len();
        slots[tail].write(item);
        self.len += 1;
    }

    fn push_front<T: Copy>(&mut self, slots: &mut [MaybeUninit<T>], item: T) {
        self.head = (self.head + slots.len() - 1) % slots.len();
        slots[self.head].write(item);
        self.len += 1;
    }

    fn front<T: Copy>(&self, slots: &[MaybeUninit<T>]) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        // Safety: the head slot is inside the initialized window.
        Some(unsafe { slots[self.head].assume_init() })
    }

    fn pop_front<T: Copy>(&mut self, slots: &[MaybeUninit<T>]) -> Option<T> {
        let item = self.front(slots)?;
        self.head = (self.head + 1) % slots.len();
        self.len -= 1;
        Some(item)
    }
}

struct QueueState<T> {
    ring: Ring,
    /// Items handed to receivers that have not collected them yet.
    handed: usize,
    senders: WaitList<T>,
    receivers: WaitList<T>,
    name: Option<&'static str>,
}

impl<T> QueueState<T> {
    /// Slots neither filled nor reserved for a handed item.
    fn free(&self, n: usize) -> usize {
        n - self.ring.len - self.handed
    }
}

/// Control block of a [`Queue`]: ring indices and the two wait lists.
pub struct QueueControl<T> {
    state: Mutex<RefCell<QueueState<T>>>,
}

impl<T> QueueControl<T> {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(QueueState {
                ring: Ring { head: 0, len: 0 },
                handed: 0,
                senders: WaitList::new(),
                receivers: WaitList::new(),
                name: None,
            })),
        }
    }
}

impl<T> Default for QueueControl<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a queue of at most `N` items of type `T`.
pub struct Queue<'a, T, const N: usize> {
    kernel: &'a Kernel,
    control: &'a QueueControl<T>,
    storage: &'a QueueStorage<T, N>,
}

impl<T, const N: usize> Clone for Queue<'_, T, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, const N: usize> Copy for Queue<'_, T, N> {}

impl<'a, T: Copy, const N: usize> Queue<'a, T, N> {
    /// Build the queue over its claimed control and storage blocks.
    pub fn new(
        kernel: &'a Kernel,
        control: &'a mut QueueControl<T>,
        storage: &'a mut QueueStorage<T, N>,
    ) -> Result<Self, ConstructionFailure> {
        if N == 0 {
            return Err(ConstructionFailure::InvalidSize("queue length must be non-zero"));
        }
        tracing::debug!("queue created: {} slots of {} bytes", N, core::mem::size_of::<T>());
        Ok(Self {
            kernel,
            control,
            storage,
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut QueueState<T>, &mut [MaybeUninit<T>]) -> R) -> R {
        super::critical_section(|cs| {
            let mut state = self.control.state.borrow_ref_mut(cs);
            let mut slots = self.storage.slots.borrow_mut();
            f(&mut state, &mut slots[..])
        })
    }

    // -----------------------------------------------------------------------
    // Blocking operations
    // -----------------------------------------------------------------------

    /// Enqueue `item`, waiting for space according to `wait`.
    pub fn send(&self, item: T, wait: Wait) -> QueueSend<'a, T, N> {
        QueueSend {
            queue: *self,
            item,
            wait,
            phase: Phase::Start,
        }
    }

    /// Dequeue the oldest item, waiting for one according to `wait`.
    pub fn receive(&self, wait: Wait) -> QueueReceive<'a, T, N> {
        QueueReceive {
            queue: *self,
            wait,
            phase: Phase::Start,
        }
    }

    // -----------------------------------------------------------------------
    // Non-blocking operations
    // -----------------------------------------------------------------------

    pub fn try_send(&self, item: T) -> Result<()> {
        let (accepted, woken) = self.with(|state, slots| offer(state, slots, item));
        if let Some(task) = woken {
            self.kernel.wake(task);
        }
        if accepted {
            Ok(())
        } else {
            Err(Error::WouldBlock)
        }
    }

    pub fn try_receive(&self) -> Result<T> {
        let (item, woken) = self.with(take).ok_or(Error::WouldBlock)?;
        if let Some(task) = woken {
            self.kernel.wake(task);
        }
        Ok(item)
    }

    /// Copy of the oldest item, left in place.
    pub fn peek(&self) -> Option<T> {
        self.with(|state, slots| state.ring.front(slots))
    }

    /// Discard every queued item.
    ///
    /// Blocked receivers keep waiting on the now-empty queue. Blocked
    /// senders are admitted into the freed slots in priority order.
    pub fn reset(&self) {
        let admitted = self.with(|state, slots| {
            state.ring = Ring { head: 0, len: 0 };
            let mut admitted: Vec<TaskId, MAX_TASKS> = Vec::new();
            while state.free(N) > 0 {
                let QueueState { ring, senders, .. } = &mut *state;
                let granted = senders.grant_next(|w| {
                    if let Some(item) = w.payload.take() {
                        ring.push_back(slots, item);
                    }
                });
                match granted {
                    // A task waits on one primitive at a time, so this
                    // never overflows.
                    Some(task) => {
                        let _ = admitted.push(task);
                    }
                    None => break,
                }
            }
            admitted
        });
        tracing::trace!("queue reset, {} blocked sender(s) admitted", admitted.len());
        for task in admitted {
            self.kernel.wake(task);
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.with(|state, _| state.ring.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// No slot is free; slots reserved for handed items count as taken.
    pub fn is_full(&self) -> bool {
        self.spaces() == 0
    }

    /// Slots a send can fill without blocking.
    pub fn spaces(&self) -> usize {
        self.with(|state, _| state.free(N))
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

/// Enqueue `item`, handing it to a waiting receiver when there is one.
/// Returns whether the item was accepted and which task to wake.
fn offer<T: Copy>(state: &mut QueueState<T>, slots: &mut [MaybeUninit<T>], item: T) -> (bool, Option<TaskId>) {
    if state.free(slots.len()) == 0 {
        return (false, None);
    }
    if let Some(task) = state.receivers.grant_next(|w| w.payload = Some(item)) {
        state.handed += 1;
        return (true, Some(task));
    }
    state.ring.push_back(slots, item);
    (true, None)
}

/// Dequeue the oldest item, then admit one blocked sender into the freed
/// slot. Returns the item and the sender to wake.
fn take<T: Copy>(state: &mut QueueState<T>, slots: &mut [MaybeUninit<T>]) -> Option<(T, Option<TaskId>)> {
    let QueueState { ring, senders, .. } = state;
    let item = ring.pop_front(slots)?;
    let woken = senders.grant_next(|w| {
        if let Some(next) = w.payload.take() {
            ring.push_back(slots, next);
        }
    });
    Some((item, woken))
}

impl<T, const N: usize> Traced for Queue<'_, T, N> {
    const KIND: ObjectKind = ObjectKind::Queue;

    fn set_trace_name(&self, name: &'static str) {
        super::critical_section(|cs| self.control.state.borrow_ref_mut(cs).name = Some(name));
    }

    fn trace_name(&self) -> Option<&'static str> {
        super::critical_section(|cs| self.control.state.borrow_ref(cs).name)
    }
}

// ---------------------------------------------------------------------------
// Futures
// ---------------------------------------------------------------------------

/// Future returned by [`Queue::send`].
pub struct QueueSend<'a, T: Copy, const N: usize> {
    queue: Queue<'a, T, N>,
    item: T,
    wait: Wait,
    phase: Phase,
}

// The item is only ever copied out; nothing points into the future.
impl<T: Copy, const N: usize> Unpin for QueueSend<'_, T, N> {}

impl<T: Copy, const N: usize> Future for QueueSend<'_, T, N> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();
        let kernel = this.queue.kernel;
        match this.phase {
            Phase::Start => {
                let item = this.item;
                let (accepted, woken) = this.queue.with(|state, slots| offer(state, slots, item));
                if accepted {
                    if let Some(task) = woken {
                        kernel.wake(task);
                    }
                    this.phase = Phase::Done;
                    return Poll::Ready(Ok(()));
                }

                let expiry = this.wait.expiry(kernel.now());
                if expiry == Expiry::Immediate {
                    this.phase = Phase::Done;
                    return Poll::Ready(Err(Error::WouldBlock));
                }
                let Some(me) = kernel.current() else {
                    this.phase = Phase::Done;
                    return Poll::Ready(Err(Error::NoTask));
                };

                let waiter = Waiter::new(me, kernel.priority_of(me), kernel.next_seq()).with_payload(item);
                if let Err(e) = this.queue.with(|state, _| state.senders.push(waiter)) {
                    this.phase = Phase::Done;
                    return Poll::Ready(Err(e));
                }
                kernel.block_current(expiry.deadline());
                this.phase = Phase::Waiting { me, expiry };
                Poll::Pending
            }
            Phase::Waiting { me, expiry } => {
                let now = kernel.now();
                match this.queue.with(|state, _| state.senders.settle(me, expiry, now)) {
                    Some(outcome) => {
                        this.phase = Phase::Done;
                        Poll::Ready(outcome.map(|_| ()))
                    }
                    None => {
                        kernel.block_current(expiry.deadline());
                        Poll::Pending
                    }
                }
            }
            Phase::Done => panic!("`QueueSend` polled after completion"),
        }
    }
}

impl<T: Copy, const N: usize> Drop for QueueSend<'_, T, N> {
    fn drop(&mut self) {
        if let Phase::Waiting { me, .. } = self.phase {
            super::critical_section(|cs| self.queue.control.state.borrow_ref_mut(cs).senders.remove(me));
        }
    }
}

/// Future returned by [`Queue::receive`].
pub struct QueueReceive<'a, T: Copy, const N: usize> {
    queue: Queue<'a, T, N>,
    wait: Wait,
    phase: Phase,
}

impl<T: Copy, const N: usize> Future for QueueReceive<'_, T, N> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<T>> {
        let this = self.get_mut();
        let kernel = this.queue.kernel;
        match this.phase {
            Phase::Start => {
                if let Some((item, woken)) = this.queue.with(take) {
                    if let Some(task) = woken {
                        kernel.wake(task);
                    }
                    this.phase = Phase::Done;
                    return Poll::Ready(Ok(item));
                }

                let expiry = this.wait.expiry(kernel.now());
                if expiry == Expiry::Immediate {
                    this.phase = Phase::Done;
                    return Poll::Ready(Err(Error::WouldBlock));
                }
                let Some(me) = kernel.current() else {
                    this.phase = Phase::Done;
                    return Poll::Ready(Err(Error::NoTask));
                };

                let waiter = Waiter::new(me, kernel.priority_of(me), kernel.next_seq());
                if let Err(e) = this.queue.with(|state, _| state.receivers.push(waiter)) {
                    this.phase = Phase::Done;
                    return Poll::Ready(Err(e));
                }
                kernel.block_current(expiry.deadline());
                this.phase = Phase::Waiting { me, expiry };
                Poll::Pending
            }
            Phase::Waiting { me, expiry } => {
                let now = kernel.now();
                let settled = this.queue.with(|state, _| {
                    let outcome = state.receivers.settle(me, expiry, now);
                    if let Some(Ok(Waiter { payload: Some(_), .. })) = outcome {
                        state.handed -= 1;
                    }
                    outcome
                });
                match settled {
                    Some(outcome) => {
                        this.phase = Phase::Done;
                        // A granted receiver always carries the handed item.
                        Poll::Ready(outcome.and_then(|w| w.payload.ok_or(Error::Timeout)))
                    }
                    None => {
                        kernel.block_current(expiry.deadline());
                        Poll::Pending
                    }
                }
            }
            Phase::Done => panic!("`QueueReceive` polled after completion"),
        }
    }
}

impl<T: Copy, const N: usize> Drop for QueueReceive<'_, T, N> {
    fn drop(&mut self) {
        let Phase::Waiting { me, .. } = self.phase else {
            return;
        };
        let passed_on = self.queue.with(|state, slots| {
            let item = state.receivers.remove(me)?.payload?;
            // Another receiver still waiting means the ring is empty: the
            // item and its reservation move to that receiver.
            if let Some(task) = state.receivers.grant_next(|w| w.payload = Some(item)) {
                return Some(task);
            }
            // Otherwise the reserved slot takes it back, ahead of anything
            // sent after the handoff.
            state.handed -= 1;
            state.ring.push_front(slots, item);
            None
        });
        if let Some(task) = passed_on {
            self.queue.kernel.wake(task);
        }
    }
}
