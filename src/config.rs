//! # Arenos Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! compile time. There is no dynamic allocation.

/// Maximum number of tasks the kernel can manage.
/// This bounds the static TCB table and the capacity of every wait list,
/// since a task can wait on at most one primitive at a time.
pub const MAX_TASKS: usize = 8;

/// Tick frequency in Hz. One tick is the unit of every delay and
/// bounded wait.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Per-task stack depth in 32-bit words, matching the original
/// firmware's `STACK_SIZE` of 200 `StackType_t` entries.
pub const STACK_WORDS: usize = 200;

/// Per-task stack size in bytes. A task's future is placed in a block of
/// this size; a body that does not fit fails to build.
pub const STACK_SIZE: usize = STACK_WORDS * 4;

/// Alignment of every task stack block.
pub const STACK_ALIGN: usize = 8;

/// Upper bound on task polls in one `run_until_idle` pass. Guards the
/// tick loop against a task that keeps yielding without ever blocking.
pub const POLL_BUDGET: usize = 256;
