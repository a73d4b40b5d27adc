//! # Static Resource Arena
//!
//! Compile-time-sized storage for everything the kernel and its primitives
//! need: task stacks, control blocks, and queue/stream backing buffers.
//! Nothing here is ever freed.
//!
//! A [`Block`] wraps one such region and hands out a single `&mut` to it.
//! The owner obtained from [`Block::claim`] is the only one that will ever
//! see the storage, so two primitives can never alias the same block: a
//! second claim fails with [`ConstructionFailure::BlockClaimed`].
//!
//! ```text
//! static RESOURCES: StaticResources = StaticResources::new();
//!
//!   ┌──────────────┐ claim() ┌───────────────┐
//!   │ Block<T>     │ ──────► │ &mut T (owner) │  exactly once
//!   └──────────────┘         └───────────────┘
//! ```

use core::cell::{RefCell, UnsafeCell};
use core::marker::PhantomData;
use core::mem::{align_of, size_of, MaybeUninit};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::STACK_ALIGN;
use crate::error::ConstructionFailure;

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A statically sized region owned by exactly one entity once claimed.
pub struct Block<T> {
    claimed: AtomicBool,
    value: UnsafeCell<T>,
}

// Safety: the value is only reachable through the single `&mut T` returned
// by the first successful `claim`, and that claim is decided inside a
// critical section.
unsafe impl<T: Send> Sync for Block<T> {}

impl<T> Block<T> {
    pub const fn new(value: T) -> Self {
        Self {
            claimed: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Hand the block to its one and only owner.
    #[allow(clippy::mut_from_ref)]
    pub fn claim(&self) -> Result<&mut T, ConstructionFailure> {
        let first = crate::sync::critical_section(|_cs| {
            if self.claimed.load(Ordering::Acquire) {
                false
            } else {
                self.claimed.store(true, Ordering::Release);
                true
            }
        });
        if !first {
            return Err(ConstructionFailure::BlockClaimed);
        }
        // Safety: `claimed` flipped exactly once, so no other reference to
        // the value exists or ever will.
        Ok(unsafe { &mut *self.value.get() })
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Task stacks
// ---------------------------------------------------------------------------

/// Stack region of one task: raw, aligned bytes that receive the task's
/// body (its future) when the task is spawned.
#[repr(C, align(8))]
pub struct TaskStack<const N: usize> {
    bytes: [MaybeUninit<u8>; N],
}

impl<const N: usize> TaskStack<N> {
    pub const fn new() -> Self {
        Self {
            bytes: [MaybeUninit::uninit(); N],
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Move `value` into the stack and return the in-place reference.
    ///
    /// A value that is larger than `N` bytes, or more strictly aligned than
    /// the block, is rejected at build time.
    pub fn emplace<F>(&mut self, value: F) -> &mut F {
        #[allow(clippy::let_unit_value)]
        let () = Fits::<F, N>::OK;
        let slot = self.bytes.as_mut_ptr().cast::<F>();
        // Safety: `Fits` guarantees size and alignment, and `&mut self`
        // guarantees the block is not shared.
        unsafe {
            slot.write(value);
            &mut *slot
        }
    }
}

impl<const N: usize> Default for TaskStack<N> {
    fn default() -> Self {
        Self::new()
    }
}

struct Fits<F, const N: usize>(PhantomData<F>);

impl<F, const N: usize> Fits<F, N> {
    const OK: () = assert!(
        size_of::<F>() <= N && align_of::<F>() <= STACK_ALIGN,
        "task body does not fit its stack block"
    );
}

// ---------------------------------------------------------------------------
// Queue and stream storage
// ---------------------------------------------------------------------------

/// Backing storage of a typed queue: `N` slots of `size_of::<T>()` bytes.
pub struct QueueStorage<T, const N: usize> {
    pub(crate) slots: RefCell<[MaybeUninit<T>; N]>,
}

impl<T: Copy, const N: usize> QueueStorage<T, N> {
    pub const fn new() -> Self {
        Self {
            slots: RefCell::new([MaybeUninit::uninit(); N]),
        }
    }
}

impl<T: Copy, const N: usize> Default for QueueStorage<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Backing storage of a stream buffer. One byte is kept free to tell a
/// full ring from an empty one, so the usable capacity is `N - 1`.
pub struct StreamStorage<const N: usize> {
    pub(crate) bytes: RefCell<[u8; N]>,
}

impl<const N: usize> StreamStorage<N> {
    pub const fn new() -> Self {
        Self {
            bytes: RefCell::new([0u8; N]),
        }
    }
}

impl<const N: usize> Default for StreamStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_is_claimed_once() {
        let block = Block::new(7u32);
        assert!(!block.is_claimed());

        let owner = block.claim().unwrap();
        *owner += 1;
        assert_eq!(*owner, 8);
        assert!(block.is_claimed());

        assert_eq!(block.claim().err(), Some(ConstructionFailure::BlockClaimed));
    }

    #[test]
    fn test_emplace_places_value_inside_stack() {
        let mut stack = TaskStack::<64>::new();
        let base = stack.bytes.as_ptr() as usize;
        let value = stack.emplace([1u64, 2, 3]);
        assert_eq!(value, &mut [1u64, 2, 3]);
        assert_eq!(value.as_ptr() as usize, base);
    }

    #[test]
    fn test_stack_is_aligned() {
        let stack = TaskStack::<24>::new();
        assert_eq!(core::mem::align_of_val(&stack), STACK_ALIGN);
        assert_eq!(stack.capacity(), 24);
    }

    #[test]
    fn test_queue_storage_is_item_sized() {
        assert_eq!(size_of::<QueueStorage<u64, 10>>(), 10 * 8 + size_of::<isize>());
    }
}
