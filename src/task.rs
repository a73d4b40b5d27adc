//! # Task Control Block
//!
//! Defines the task model. Each task is an independent logical thread of
//! control whose body is an unbounded loop; it is created once by the
//! coordinator and never destroyed.
//!
//! The control block lives in the scheduler's static table, one slot per
//! task; the task's body lives in its own [`TaskStack`](crate::arena::TaskStack)
//! block.

use crate::time::Ticks;

// ---------------------------------------------------------------------------
// Identity and priority
// ---------------------------------------------------------------------------

/// Handle of a registered task: its index in the scheduler's TCB table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u8);

impl TaskId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index as u8)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Task priority. Higher values are more urgent; `0` is the least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    pub const IDLE: Priority = Priority(0);
    pub const LOW: Priority = Priority(1);
    pub const NORMAL: Priority = Priority(2);
    pub const HIGH: Priority = Priority(3);
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///   ┌──────────┐     schedule()      ┌─────────┐
///   │  Ready   │ ──────────────────► │ Running │
///   └──────────┘                     └─────────┘
///     ▲     ▲        yield               │  │
///     │     └────────────────────────────┘  │ block / delay
///     │  wake / timeout    ┌──────────┐     │
///     ├─────────────────── │ Blocked  │ ◄───┘
///     │                    └──────────┘
///     │  resume            ┌───────────┐
///     └─────────────────── │ Suspended │ ◄── suspend (any state)
///                          └───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Runnable, waiting for the scheduler to pick it.
    Ready,
    /// Currently being polled.
    Running,
    /// Waiting for a primitive or a delay; resolves on its own.
    Blocked,
    /// Parked until another task calls `resume`.
    Suspended,
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Per-task scheduling record. Stored inline in the scheduler's fixed
/// table; there is no heap allocation.
#[derive(Debug, Clone, Copy)]
pub struct TaskControlBlock {
    /// Human-readable name, also used as the trace label.
    pub name: &'static str,

    /// Static priority, fixed at creation.
    pub priority: Priority,

    /// Current execution state.
    pub state: TaskState,

    /// Tick at which a Blocked task is made Ready regardless of its wait
    /// condition (delay end or bounded-wait timeout).
    pub wake_at: Option<Ticks>,

    /// Order in which the task last became Ready. Ties between equal
    /// priorities go to the lowest value.
    pub ready_seq: u64,

    /// Number of times the task has been polled.
    pub activations: u32,

    /// Whether this slot is allocated.
    pub active: bool,
}

impl TaskControlBlock {
    /// An unallocated slot. Used to initialize the static table.
    pub const EMPTY: TaskControlBlock = TaskControlBlock {
        name: "",
        priority: Priority::IDLE,
        state: TaskState::Suspended,
        wake_at: None,
        ready_seq: 0,
        activations: 0,
        active: false,
    };

    /// Allocate this slot for a new task, Ready to run.
    pub fn init(&mut self, name: &'static str, priority: Priority, ready_seq: u64) {
        *self = Self {
            name,
            priority,
            state: TaskState::Ready,
            wake_at: None,
            ready_seq,
            activations: 0,
            active: true,
        };
    }

    /// Move to Ready, queued behind every task that became Ready earlier.
    pub fn make_ready(&mut self, ready_seq: u64) {
        self.state = TaskState::Ready;
        self.wake_at = None;
        self.ready_seq = ready_seq;
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.active && self.state == TaskState::Ready
    }

    /// Whether `self` should run before `other`.
    pub fn outranks(&self, other: &TaskControlBlock) -> bool {
        self.priority > other.priority
            || (self.priority == other.priority && self.ready_seq < other.ready_seq)
    }
}
