//! Host-side helpers shared by the unit tests.

use core::cell::Cell;
use core::convert::Infallible;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use crate::arena::TaskStack;
use crate::board::{Board, Led};
use crate::executor::noop_waker;
use crate::kernel::Kernel;
use crate::task::TaskId;

/// Stack block roomy enough for any test body.
pub(crate) type TestStack = TaskStack<1024>;

/// Ends a test body: the task suspends itself for good.
pub(crate) async fn park(kernel: &Kernel) -> Infallible {
    loop {
        kernel.suspend_self().await;
    }
}

/// Poll `fut` once on behalf of task `id`, the way the executor does.
/// `id` must be the task the scheduler picks next.
pub(crate) fn poll_as<F: Future + ?Sized>(kernel: &Kernel, id: TaskId, fut: Pin<&mut F>) -> Poll<F::Output> {
    assert_eq!(kernel.schedule(), Some(id), "another task is ahead of {:?}", id);
    let waker = noop_waker();
    let poll = fut.poll(&mut Context::from_waker(&waker));
    kernel.finish(id);
    poll
}

/// Board that counts what the tasks asked of the hardware.
#[derive(Default)]
pub(crate) struct RecordingBoard {
    pub led1_toggles: Cell<u32>,
    pub led2_toggles: Cell<u32>,
    pub busy_ms: Cell<u32>,
}

impl Board for RecordingBoard {
    fn toggle(&self, led: Led) {
        let counter = match led {
            Led::Led1 => &self.led1_toggles,
            Led::Led2 => &self.led2_toggles,
        };
        counter.set(counter.get() + 1);
    }

    fn busy_wait_ms(&self, ms: u32) {
        self.busy_ms.set(self.busy_ms.get() + ms);
    }
}
