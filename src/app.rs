//! # Application Tasks
//!
//! The three task bodies of the demo firmware and the context they share.
//!
//! | Task      | Priority | Behavior                                            |
//! |-----------|----------|-----------------------------------------------------|
//! | `mytask1` | 2        | Exercises every primitive once per iteration        |
//! | `mytask2` | 1        | Suspended until task1's fifth iteration, then LED2  |
//! | `mytask3` | 1        | Drains the stream buffer three bytes at a time      |
//!
//! One task1 iteration takes 32 ticks: 10 delay, 20 holding `mymutex1`, 1
//! holding `recmutex` four levels deep, 1 between filling and draining
//! `my_q1`. Every fifth iteration (the first included) ends with a burst of
//! 320 bytes into `sb1`, which task3 drains as soon as task1 blocks.

use core::convert::Infallible;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::board::{Board, Led};
use crate::error::Result;
use crate::kernel::Kernel;
use crate::sync::{Mutex, Queue, RecursiveMutex, StreamBuffer};
use crate::task::{Priority, TaskId};
use crate::time::Wait;

// ---------------------------------------------------------------------------
// Application constants
// ---------------------------------------------------------------------------

pub const TASK1_NAME: &str = "mytask1";
pub const TASK2_NAME: &str = "mytask2";
pub const TASK3_NAME: &str = "mytask3";

pub const TASK1_PRIORITY: Priority = Priority(2);
pub const TASK2_PRIORITY: Priority = Priority(1);
pub const TASK3_PRIORITY: Priority = Priority(1);

pub const MUTEX1_NAME: &str = "mymutex1";
pub const MUTEX2_NAME: &str = "recmutex";
pub const Q1_NAME: &str = "my_q1";
pub const SB1_NAME: &str = "sb1";

/// Slots in `my_q1`; items are `u64`.
pub const Q1_LENGTH: usize = 10;

/// Usable bytes in `sb1`.
pub const STREAM_BUFFER_SIZE: usize = 1000;
/// Storage of `sb1`: one byte more than the usable size.
pub const SB1_STORAGE_BYTES: usize = STREAM_BUFFER_SIZE + 1;
pub const SB1_TRIGGER_LEVEL: usize = 1;

/// Levels task1 takes `recmutex` to.
pub const RECURSION_DEPTH: usize = 4;
pub const Q1_SENDS: usize = 5;
pub const Q1_RECEIVES: usize = 2;

/// task1 bursts into `sb1` on iterations where `count % BURST_EVERY == 0`.
pub const BURST_EVERY: u32 = 5;
pub const BURST_SENDS: usize = 20;
pub const BURST_CHUNK: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

/// task1 resumes task2 once it has completed this many iterations.
pub const RESUME_AFTER_ITERATIONS: u32 = 5;

/// Bytes task3 asks for per receive.
pub const RX_CHUNK: usize = 3;

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Progress counters updated by the tasks.
#[derive(Debug, Default)]
pub struct Telemetry {
    task1_iterations: AtomicU32,
    task2_iterations: AtomicU32,
    bytes_drained: AtomicU32,
    errors: AtomicU32,
}

/// Point-in-time copy of [`Telemetry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetrySnapshot {
    pub task1_iterations: u32,
    pub task2_iterations: u32,
    pub bytes_drained: u32,
    pub errors: u32,
}

impl Telemetry {
    pub const fn new() -> Self {
        Self {
            task1_iterations: AtomicU32::new(0),
            task2_iterations: AtomicU32::new(0),
            bytes_drained: AtomicU32::new(0),
            errors: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            task1_iterations: self.task1_iterations.load(Ordering::Relaxed),
            task2_iterations: self.task2_iterations.load(Ordering::Relaxed),
            bytes_drained: self.bytes_drained.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Task context
// ---------------------------------------------------------------------------

/// Everything a task body may touch, built by the coordinator and passed
/// by value to each task.
#[derive(Clone, Copy)]
pub struct AppContext<'a> {
    pub kernel: &'a Kernel,
    pub board: &'a dyn Board,
    pub mutex1: Mutex<'a>,
    pub mutex2: RecursiveMutex<'a>,
    pub q1: Queue<'a, u64, Q1_LENGTH>,
    pub sb1: StreamBuffer<'a, SB1_STORAGE_BYTES>,
    pub telemetry: &'a Telemetry,
}

impl AppContext<'_> {
    /// Count a failed primitive call. The tasks do not retry.
    fn note<T>(&self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.telemetry.errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("primitive call failed: {}", e);
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Task bodies
// ---------------------------------------------------------------------------

pub async fn task1(ctx: AppContext<'_>, task2: TaskId) -> Infallible {
    let mut count: u32 = 0;
    loop {
        ctx.kernel.delay(10).await;
        ctx.board.toggle(Led::Led1);

        ctx.note(ctx.mutex1.acquire(Wait::Forever).await);
        ctx.kernel.delay(20).await;
        ctx.note(ctx.mutex1.release());

        for _ in 0..RECURSION_DEPTH {
            ctx.note(ctx.mutex2.acquire(Wait::NoWait).await);
        }
        ctx.kernel.delay(1).await;
        for _ in 0..RECURSION_DEPTH {
            ctx.note(ctx.mutex2.release());
        }

        for _ in 0..Q1_SENDS {
            ctx.note(ctx.q1.send(0, Wait::NoWait).await);
        }
        ctx.kernel.delay(1).await;
        for _ in 0..Q1_RECEIVES {
            ctx.note(ctx.q1.receive(Wait::NoWait).await);
        }
        ctx.q1.reset();

        if count % BURST_EVERY == 0 {
            for _ in 0..BURST_SENDS {
                ctx.note(ctx.sb1.send(&BURST_CHUNK, Wait::NoWait).await);
            }
        }

        count += 1;
        ctx.telemetry.task1_iterations.fetch_add(1, Ordering::Relaxed);
        if count == RESUME_AFTER_ITERATIONS {
            tracing::debug!("{} resuming {}", TASK1_NAME, TASK2_NAME);
            ctx.kernel.resume(task2);
        }
    }
}

pub async fn task2(ctx: AppContext<'_>) -> Infallible {
    ctx.kernel.suspend_self().await;

    loop {
        ctx.kernel.delay(5).await;
        ctx.board.toggle(Led::Led2);

        ctx.note(ctx.mutex1.acquire(Wait::Forever).await);
        ctx.board.busy_wait_ms(10);
        ctx.note(ctx.mutex1.release());

        ctx.telemetry.task2_iterations.fetch_add(1, Ordering::Relaxed);
    }
}

pub async fn task3(ctx: AppContext<'_>) -> Infallible {
    let mut rx = [0u8; RX_CHUNK];
    loop {
        if let Some(n) = ctx.note(ctx.sb1.receive(&mut rx, Wait::Forever).await) {
            ctx.telemetry.bytes_drained.fetch_add(n as u32, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::coordinator::{initialize, StaticResources};
    use crate::task::TaskState;
    use crate::testing::RecordingBoard;

    #[test]
    fn test_task2_suspended_until_fifth_iteration() {
        let res = StaticResources::new();
        let board = RecordingBoard::default();
        let mut system = initialize(&res, &board).unwrap();

        system.executor.start();
        system.executor.run_until(159);
        let seen = res.telemetry.snapshot();
        assert_eq!(seen.task1_iterations, 4);
        assert_eq!(seen.task2_iterations, 0);
        assert_eq!(board.led2_toggles.get(), 0);
        assert_eq!(board.busy_ms.get(), 0);
        assert_eq!(res.kernel.task_state(system.task2), Some(TaskState::Suspended));

        system.executor.run_until(160);
        assert_eq!(res.telemetry.snapshot().task1_iterations, 5);
        assert_eq!(res.kernel.task_state(system.task2), Some(TaskState::Blocked));

        system.executor.run_until(165);
        assert_eq!(res.telemetry.snapshot().task2_iterations, 1);
        assert_eq!(board.led2_toggles.get(), 1);
        assert_eq!(board.busy_ms.get(), 10);
    }

    #[test]
    fn test_task1_iteration_timing() {
        let res = StaticResources::new();
        let board = RecordingBoard::default();
        let mut system = initialize(&res, &board).unwrap();

        system.executor.start();
        system.executor.run_until(31);
        assert_eq!(res.telemetry.snapshot().task1_iterations, 0);
        assert_eq!(board.led1_toggles.get(), 1);
        assert_eq!(system.context.q1.len(), 5);

        system.executor.run_until(32);
        assert_eq!(res.telemetry.snapshot().task1_iterations, 1);
        assert!(system.context.q1.is_empty());
        assert_eq!(system.context.mutex2.depth(), 0);
        assert_eq!(system.context.mutex1.holder(), None);
    }

    #[test]
    fn test_bursts_drained_by_task3() {
        let res = StaticResources::new();
        let board = RecordingBoard::default();
        let mut system = initialize(&res, &board).unwrap();

        system.executor.start();
        system.executor.run_until(32);
        assert_eq!(res.telemetry.snapshot().bytes_drained, 320);
        assert!(system.context.sb1.is_empty());

        system.executor.run_until(191);
        assert_eq!(res.telemetry.snapshot().bytes_drained, 320);
        system.executor.run_until(192);
        assert_eq!(res.telemetry.snapshot().bytes_drained, 640);
    }

    #[test]
    fn test_steady_state_has_no_errors() {
        let res = StaticResources::new();
        let board = RecordingBoard::default();
        let mut system = initialize(&res, &board).unwrap();

        system.executor.start();
        system.executor.run_until(1000);
        let seen = res.telemetry.snapshot();
        assert_eq!(seen.errors, 0);
        assert_eq!(seen.task1_iterations, 31);
        assert!(seen.task2_iterations > 0);
        assert_eq!(board.busy_ms.get(), seen.task2_iterations * 10);
        assert_eq!(system.context.mutex1.holder(), None);
    }
}
