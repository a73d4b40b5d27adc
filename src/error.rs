//! # Error Taxonomy
//!
//! Primitive-level errors are returned to the calling task and never cross
//! task boundaries. Construction failures only occur while the coordinator
//! builds the system and are fatal: restart is the only recovery path.

use thiserror::Error;

/// Outcome of a primitive operation that did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// A bounded wait elapsed. The primitive's state is unchanged.
    #[error("bounded wait elapsed")]
    Timeout,
    /// The resource was unavailable and the caller asked not to wait.
    #[error("resource unavailable and the wait policy forbids blocking")]
    WouldBlock,
    /// A mutex release was attempted by a task that does not hold it.
    #[error("release attempted by a task that does not hold the mutex")]
    NotOwner,
    /// The operation needs a task identity but no task is running.
    #[error("operation requires a running task")]
    NoTask,
}

/// Reason a resource could not be constructed from its arena block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConstructionFailure {
    /// The arena block was already handed to another owner.
    #[error("arena block already claimed")]
    BlockClaimed,
    /// Every slot of the static task table is in use.
    #[error("task table is full")]
    TaskTableFull,
    /// The block or a parameter has a size the resource cannot use.
    #[error("invalid size: {0}")]
    InvalidSize(&'static str),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
