//! # Synchronization Primitives
//!
//! Blocking primitives built on arena blocks: a plain mutex, a recursive
//! mutex, a bounded typed queue and a byte stream buffer.
//!
//! Every primitive keeps its state in a `critical_section::Mutex<RefCell<_>>`
//! control block. Operations that may block return a future; awaiting it
//! inside a task is the suspension point. Waiters are served highest
//! priority first, then in the order they started waiting.
//!
//! ```text
//!   task ──acquire/send/receive──► primitive (critical section)
//!                                     │ available ─► Ready(Ok)
//!                                     │ NoWait    ─► Ready(Err(WouldBlock))
//!                                     └ otherwise ─► wait list + block
//!   release/send/receive by another task ─► hand off / signal ─► wake
//!   tick past the deadline ───────────────► wake ─► Err(Timeout)
//! ```

use ::critical_section::CriticalSection;

mod lock;
pub mod mutex;
pub mod queue;
pub mod recursive;
pub mod stream;
mod wait;

pub use lock::Acquire;
pub use mutex::{Mutex, MutexControl};
pub use queue::{Queue, QueueControl, QueueReceive, QueueSend};
pub use recursive::{RecursiveMutex, RecursiveMutexControl};
pub use stream::{StreamBuffer, StreamControl, StreamReceive, StreamSend};

/// Execute a closure within a critical section.
///
/// On the firmware target this masks interrupts (single-core
/// implementation from `cortex-m`); on the host it takes a global lock.
/// Sections nest, but a `RefCell` reached from inside must not already be
/// borrowed by an enclosing section.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}
