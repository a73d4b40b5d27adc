//! # Arenos: Arena Operating System
//!
//! A statically allocated task coordination kernel for ARM Cortex-M4
//! microcontrollers.
//!
//! ## Overview
//!
//! A fixed set of tasks cooperates through four primitives: a mutex, a
//! recursive mutex, a bounded typed queue and a byte stream buffer. Every
//! control block, stack and backing buffer is carved out of a static arena
//! before the system starts; nothing is allocated or freed afterwards.
//!
//! - **Highest priority runs first**, equal priorities take turns
//! - **Waiters are served by priority**, then in the order they began waiting
//! - **Every blocking call takes a wait policy**: no wait, bounded, forever
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │        Application Tasks (app.rs) · mytask1/2/3        │
//! ├────────────────────────────────────────────────────────┤
//! │          Coordinator (coordinator.rs)                  │
//! │   primitives in order ─► tasks in order ─► System      │
//! ├──────────────────────────┬─────────────────────────────┤
//! │  Sync Primitives         │  Kernel (kernel.rs)         │
//! │  sync/                   │  ─ delay() · suspend_self() │
//! │  ─ Mutex                 │  ─ resume() · tick()        │
//! │  ─ RecursiveMutex        ├─────────────────────────────┤
//! │  ─ Queue                 │  Scheduler (scheduler.rs)   │
//! │  ─ StreamBuffer          │  Executor  (executor.rs)    │
//! ├──────────────────────────┴─────────────────────────────┤
//! │      Static Resource Arena (arena.rs) · Block<T>       │
//! │   TaskStack · QueueStorage · StreamStorage             │
//! ├────────────────────────────────────────────────────────┤
//! │     Arch Port (arch/cortex_m4.rs) · SysTick · cycles   │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Execution Model
//!
//! Task bodies are `async fn`s that never return. Each one is moved into
//! its own [`TaskStack`](arena::TaskStack) block when spawned and polled in
//! place by the [`Executor`](executor::Executor). A task runs until it
//! reaches a blocking call, a delay or a self-suspend; that is where the
//! scheduler may switch to another task. A higher-priority task made Ready
//! by a release or a send runs at the releasing task's next such point.
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **No `alloc`**: pure `core` only
//! - **Fixed-size TCB table**: `[TaskControlBlock; MAX_TASKS]`
//! - **Arena blocks**: each handed to exactly one owner through `Block::claim`
//! - **Critical sections**: `critical_section::Mutex<RefCell<_>>` for shared state

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod error;
pub mod time;
pub mod arena;
pub mod task;
pub mod scheduler;
pub mod kernel;
pub mod executor;
pub mod sync;
pub mod trace;
pub mod board;
pub mod arch;
pub mod app;
pub mod coordinator;

#[cfg(test)]
mod testing;

pub use arena::{Block, QueueStorage, StreamStorage, TaskStack};
pub use coordinator::{exit_code, initialize, InitError, Resource, StaticResources, System};
pub use error::{ConstructionFailure, Error, Result};
pub use executor::Executor;
pub use kernel::Kernel;
pub use task::{Priority, TaskId, TaskState};
pub use time::{Ticks, Wait};
