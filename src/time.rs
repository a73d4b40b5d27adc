//! Ticks and wait policies.

/// Kernel time, in ticks since start.
pub type Ticks = u64;

/// Caller-specified blocking behavior of a primitive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Fail immediately with `WouldBlock` if the resource is unavailable.
    NoWait,
    /// Block for at most this many ticks, then fail with `Timeout`.
    For(Ticks),
    /// Block until the resource becomes available.
    Forever,
}

impl Wait {
    /// Resolve the policy against the current time.
    pub(crate) fn expiry(self, now: Ticks) -> Expiry {
        match self {
            Wait::NoWait | Wait::For(0) => Expiry::Immediate,
            Wait::For(ticks) => Expiry::At(now.saturating_add(ticks)),
            Wait::Forever => Expiry::Never,
        }
    }
}

/// Absolute form of a [`Wait`], fixed when the wait begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expiry {
    Immediate,
    At(Ticks),
    Never,
}

impl Expiry {
    pub(crate) fn elapsed(self, now: Ticks) -> bool {
        match self {
            Expiry::Immediate => true,
            Expiry::At(deadline) => now >= deadline,
            Expiry::Never => false,
        }
    }

    /// Tick at which the scheduler must wake a task blocked on this expiry.
    pub(crate) fn deadline(self) -> Option<Ticks> {
        match self {
            Expiry::At(deadline) => Some(deadline),
            Expiry::Immediate | Expiry::Never => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_bounded_wait_is_no_wait() {
        assert_eq!(Wait::For(0).expiry(7), Expiry::Immediate);
        assert_eq!(Wait::NoWait.expiry(7), Expiry::Immediate);
    }

    #[test]
    fn test_bounded_wait_is_absolute() {
        let expiry = Wait::For(5).expiry(10);
        assert_eq!(expiry, Expiry::At(15));
        assert!(!expiry.elapsed(14));
        assert!(expiry.elapsed(15));
        assert_eq!(expiry.deadline(), Some(15));
    }

    #[test]
    fn test_forever_never_elapses() {
        let expiry = Wait::Forever.expiry(0);
        assert!(!expiry.elapsed(Ticks::MAX));
        assert_eq!(expiry.deadline(), None);
    }
}
