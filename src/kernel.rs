//! # Kernel
//!
//! The scheduler services tasks and primitives call into: time, identity of
//! the running task, delay, suspend/resume and block/wake.
//!
//! All scheduler state sits behind one critical section, so the kernel can
//! be shared by reference (or be a `static`) and used from every task and
//! every primitive.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset (cortex-m-rt)
//!   └─► main()
//!         ├─► Executor::new(&kernel)
//!         ├─► coordinator::initialize() ← primitives, then tasks
//!         └─► Executor::run_forever()   ← poll / wait for tick / tick (no return)
//! ```

use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use critical_section::Mutex;

use crate::error::ConstructionFailure;
use crate::scheduler::Scheduler;
use crate::task::{Priority, TaskId, TaskState};
use crate::time::Ticks;

/// Shared handle to the scheduler.
pub struct Kernel {
    scheduler: Mutex<RefCell<Scheduler>>,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            scheduler: Mutex::new(RefCell::new(Scheduler::new())),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        crate::sync::critical_section(|cs| f(&mut self.scheduler.borrow_ref_mut(cs)))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Ticks elapsed since start.
    pub fn now(&self) -> Ticks {
        self.with(|s| s.tick_count)
    }

    /// Task currently being polled, if any.
    pub fn current(&self) -> Option<TaskId> {
        self.with(|s| s.current)
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.with(|s| s.get(id).map(|t| t.state))
    }

    pub fn task_name(&self, id: TaskId) -> Option<&'static str> {
        self.with(|s| s.get(id).map(|t| t.name))
    }

    pub fn priority_of(&self, id: TaskId) -> Priority {
        self.with(|s| s.get(id).map_or(Priority::IDLE, |t| t.priority))
    }

    pub fn task_count(&self) -> usize {
        self.with(|s| s.task_count)
    }

    pub fn context_switches(&self) -> u32 {
        self.with(|s| s.context_switches)
    }

    // -----------------------------------------------------------------------
    // Task control
    // -----------------------------------------------------------------------

    /// Wait `ticks` ticks. A zero delay yields to tasks of equal priority.
    pub fn delay(&self, ticks: Ticks) -> Delay<'_> {
        Delay {
            kernel: self,
            ticks,
            deadline: None,
        }
    }

    /// Give control back to the scheduler without blocking.
    pub fn yield_now(&self) -> Delay<'_> {
        self.delay(0)
    }

    /// Suspend the calling task until another task resumes it.
    pub fn suspend_self(&self) -> SuspendSelf<'_> {
        SuspendSelf {
            kernel: self,
            parked: false,
        }
    }

    /// Suspend any task. Takes effect at its next scheduling decision.
    pub fn suspend(&self, id: TaskId) {
        tracing::trace!("suspend task {}", id.index());
        self.with(|s| s.suspend(id));
    }

    /// Resume a suspended task. Returns `false` if it was not suspended.
    pub fn resume(&self, id: TaskId) -> bool {
        let resumed = self.with(|s| s.resume(id));
        if resumed {
            tracing::trace!("resume task {}", id.index());
        }
        resumed
    }

    /// Advance time by one tick, releasing expired delays and timeouts.
    pub fn tick(&self) -> usize {
        self.with(|s| s.tick())
    }

    // -----------------------------------------------------------------------
    // Crate-internal services for the executor and primitives
    // -----------------------------------------------------------------------

    pub(crate) fn register(
        &self,
        name: &'static str,
        priority: Priority,
    ) -> Result<TaskId, ConstructionFailure> {
        let id = self.with(|s| s.create_task(name, priority))?;
        tracing::debug!("task {} registered as {} (priority {})", id.index(), name, priority.0);
        Ok(id)
    }

    pub(crate) fn schedule(&self) -> Option<TaskId> {
        self.with(|s| s.schedule())
    }

    pub(crate) fn finish(&self, id: TaskId) {
        self.with(|s| s.finish(id))
    }

    pub(crate) fn block_current(&self, wake_at: Option<Ticks>) {
        self.with(|s| s.block_current(wake_at))
    }

    pub(crate) fn suspend_current(&self) {
        self.with(|s| {
            if let Some(id) = s.current {
                s.suspend(id);
            }
        })
    }

    pub(crate) fn wake(&self, id: TaskId) -> bool {
        self.with(|s| s.wake(id))
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.with(|s| s.next_seq())
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Futures
// ---------------------------------------------------------------------------

/// Future returned by [`Kernel::delay`].
pub struct Delay<'a> {
    kernel: &'a Kernel,
    ticks: Ticks,
    deadline: Option<Ticks>,
}

impl Future for Delay<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let now = this.kernel.now();
        match this.deadline {
            None if this.ticks == 0 => {
                // Still Running after the poll: the executor re-queues us.
                this.deadline = Some(now);
                Poll::Pending
            }
            None => {
                let deadline = now.saturating_add(this.ticks);
                this.deadline = Some(deadline);
                this.kernel.block_current(Some(deadline));
                Poll::Pending
            }
            Some(deadline) if now >= deadline => Poll::Ready(()),
            Some(deadline) => {
                this.kernel.block_current(Some(deadline));
                Poll::Pending
            }
        }
    }
}

/// Future returned by [`Kernel::suspend_self`].
pub struct SuspendSelf<'a> {
    kernel: &'a Kernel,
    parked: bool,
}

impl Future for SuspendSelf<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.parked {
            return Poll::Ready(());
        }
        this.parked = true;
        this.kernel.suspend_current();
        Poll::Pending
    }
}
