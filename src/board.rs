//! Hardware the task bodies drive: two LEDs and a blocking busy delay.
//!
//! These calls are the representative workload of the tasks. They carry no
//! synchronization meaning; a busy wait burns CPU time without giving
//! control back to the scheduler.

/// LEDs toggled by the application tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    Led1,
    Led2,
}

pub trait Board {
    fn toggle(&self, led: Led);

    /// Spin for `ms` milliseconds without yielding.
    fn busy_wait_ms(&self, ms: u32);
}
