//! # Executor
//!
//! Runs the task bodies. Each task is an `async fn` that never returns; its
//! future is moved into the task's [`TaskStack`] block at spawn time and
//! polled in place for the rest of the program.
//!
//! A task is polled only while the scheduler has it Ready. It runs until it
//! reaches a suspension point (a blocking primitive call, a delay or a
//! self-suspend), which records the new state in the kernel and returns
//! `Pending`. Wake-ups are routed by [`TaskId`] through the kernel, so the
//! `Waker` passed to the futures is a no-op.
//!
//! Dropping the executor drops every task body in place. The tasks stay
//! registered with the kernel but will never be polled again.

use core::convert::Infallible;
use core::future::Future;
use core::pin::Pin;
use core::ptr;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use crate::arena::TaskStack;
use crate::config::{MAX_TASKS, POLL_BUDGET};
use crate::error::ConstructionFailure;
use crate::kernel::Kernel;
use crate::task::{Priority, TaskId};
use crate::time::Ticks;

type TaskBody<'a> = Pin<&'a mut (dyn Future<Output = Infallible> + 'a)>;

/// Static executor: one pinned future per registered task.
pub struct Executor<'a> {
    kernel: &'a Kernel,
    bodies: [Option<TaskBody<'a>>; MAX_TASKS],
}

impl<'a> Executor<'a> {
    pub fn new(kernel: &'a Kernel) -> Self {
        Self {
            kernel,
            bodies: core::array::from_fn(|_| None),
        }
    }

    pub fn kernel(&self) -> &'a Kernel {
        self.kernel
    }

    /// Register a task and place its body in `stack`.
    pub fn spawn<F, const N: usize>(
        &mut self,
        name: &'static str,
        priority: Priority,
        stack: &'a mut TaskStack<N>,
        body: F,
    ) -> Result<TaskId, ConstructionFailure>
    where
        F: Future<Output = Infallible> + 'a,
    {
        let id = self.kernel.register(name, priority)?;
        let body = stack.emplace(body);
        // Safety: the stack block is borrowed for 'a and the future is never
        // moved out of it.
        let body: TaskBody<'a> = unsafe { Pin::new_unchecked(body) };
        self.bodies[id.index()] = Some(body);
        Ok(id)
    }

    /// Poll Ready tasks, highest priority first, until none is left.
    ///
    /// Returns the number of polls performed.
    pub fn run_until_idle(&mut self) -> usize {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut polls = 0;
        while polls < POLL_BUDGET {
            let Some(id) = self.kernel.schedule() else {
                break;
            };
            if let Some(body) = self.bodies[id.index()].as_mut() {
                match body.as_mut().poll(&mut cx) {
                    Poll::Ready(never) => match never {},
                    Poll::Pending => {}
                }
            }
            self.kernel.finish(id);
            polls += 1;
        }
        polls
    }

    /// Run the tasks that are Ready at the current tick.
    pub fn start(&mut self) -> usize {
        self.run_until_idle()
    }

    /// Advance `ticks` ticks, running every task that becomes Ready.
    pub fn advance(&mut self, ticks: Ticks) {
        for _ in 0..ticks {
            let woken = self.kernel.tick();
            if woken > 0 {
                tracing::trace!("tick {}: {} task(s) woken", self.kernel.now(), woken);
            }
            self.run_until_idle();
        }
    }

    /// Advance time until the kernel reaches tick `at`.
    pub fn run_until(&mut self, at: Ticks) {
        let now = self.kernel.now();
        if at > now {
            self.advance(at - now);
        }
    }

    /// Firmware main loop: run, wait for the next hardware tick, repeat.
    pub fn run_forever(&mut self, mut wait_for_tick: impl FnMut()) -> ! {
        loop {
            self.run_until_idle();
            wait_for_tick();
            self.kernel.tick();
        }
    }
}

impl Drop for Executor<'_> {
    fn drop(&mut self) {
        for slot in &mut self.bodies {
            if let Some(body) = slot.take() {
                // Safety: the body is never polled or moved again; dropping
                // it where it lies keeps the pinning promise made in `spawn`.
                unsafe { ptr::drop_in_place(Pin::into_inner_unchecked(body) as *mut _) };
            }
        }
    }
}

// ---------------------------------------------------------------------------
// No-op waker
// ---------------------------------------------------------------------------

const NOOP_VTABLE: RawWakerVTable = RawWakerVTable::new(noop_clone, noop, noop, noop);

fn noop_clone(_: *const ()) -> RawWaker {
    RawWaker::new(ptr::null(), &NOOP_VTABLE)
}

fn noop(_: *const ()) {}

pub(crate) fn noop_waker() -> Waker {
    // Safety: every vtable entry ignores the data pointer.
    unsafe { Waker::from_raw(RawWaker::new(ptr::null(), &NOOP_VTABLE)) }
}
