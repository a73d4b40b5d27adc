//! Byte stream buffer.
//!
//! An unframed byte ring with a trigger level. Writers copy in as much as
//! fits and readers copy out as much as is there; short counts are normal.
//! A blocked reader is woken once enough bytes are buffered for it, a
//! blocked writer once any space frees. Woken tasks retry their operation.

use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use critical_section::Mutex;

use super::wait::{WaitList, Waiter};
use crate::arena::StreamStorage;
use crate::error::{ConstructionFailure, Error, Result};
use crate::kernel::Kernel;
use crate::task::TaskId;
use crate::time::{Expiry, Wait};
use crate::trace::{ObjectKind, Traced};

struct StreamState {
    read: usize,
    write: usize,
    trigger: usize,
    /// Payload: the length of the reader's buffer. Its threshold is
    /// `min(trigger, len)`, taken at the current trigger level.
    readers: WaitList<usize>,
    writers: WaitList<()>,
    name: Option<&'static str>,
}

impl StreamState {
    fn available(&self, n: usize) -> usize {
        (self.write + n - self.read) % n
    }

    fn spaces(&self, n: usize) -> usize {
        n - 1 - self.available(n)
    }

    fn write_from(&mut self, bytes: &mut [u8], src: &[u8]) -> usize {
        let n = bytes.len();
        let count = src.len().min(self.spaces(n));
        let first = count.min(n - self.write);
        bytes[self.write..self.write + first].copy_from_slice(&src[..first]);
        bytes[..count - first].copy_from_slice(&src[first..count]);
        self.write = (self.write + count) % n;
        count
    }

    fn read_into(&mut self, bytes: &[u8], dst: &mut [u8]) -> usize {
        let n = bytes.len();
        let count = dst.len().min(self.available(n));
        let first = count.min(n - self.read);
        dst[..first].copy_from_slice(&bytes[self.read..self.read + first]);
        dst[first..count].copy_from_slice(&bytes[..count - first]);
        self.read = (self.read + count) % n;
        count
    }

    fn threshold(&self, len: usize) -> usize {
        self.trigger.min(len)
    }

    /// Pick the reader and the writer that can now make progress.
    fn signal(&mut self, n: usize) -> [Option<TaskId>; 2] {
        let available = self.available(n);
        let trigger = self.trigger;
        let reader = if available > 0 {
            self.readers
                .grant_next_if(|w| w.payload.is_some_and(|len| trigger.min(len) <= available))
        } else {
            None
        };
        let writer = if self.spaces(n) > 0 {
            self.writers.grant_next_if(|_| true)
        } else {
            None
        };
        [reader, writer]
    }
}

/// Control block of a [`StreamBuffer`].
pub struct StreamControl {
    state: Mutex<RefCell<StreamState>>,
}

impl StreamControl {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(StreamState {
                read: 0,
                write: 0,
                trigger: 1,
                readers: WaitList::new(),
                writers: WaitList::new(),
                name: None,
            })),
        }
    }
}

impl Default for StreamControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a stream buffer over `N` bytes of storage (`N - 1` usable).
pub struct StreamBuffer<'a, const N: usize> {
    kernel: &'a Kernel,
    control: &'a StreamControl,
    storage: &'a StreamStorage<N>,
}

impl<const N: usize> Clone for StreamBuffer<'_, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<const N: usize> Copy for StreamBuffer<'_, N> {}

impl<'a, const N: usize> StreamBuffer<'a, N> {
    /// Build the buffer over its claimed blocks. A trigger level of 0 is
    /// treated as 1.
    pub fn new(
        kernel: &'a Kernel,
        control: &'a mut StreamControl,
        storage: &'a mut StreamStorage<N>,
        trigger: usize,
    ) -> Result<Self, ConstructionFailure> {
        if N < 2 {
            return Err(ConstructionFailure::InvalidSize("stream buffer has no usable capacity"));
        }
        if trigger > N - 1 {
            return Err(ConstructionFailure::InvalidSize("trigger level exceeds stream capacity"));
        }
        super::critical_section(|cs| control.state.borrow_ref_mut(cs).trigger = trigger.max(1));
        tracing::debug!("stream buffer created: {} bytes, trigger {}", N - 1, trigger.max(1));
        Ok(Self {
            kernel,
            control,
            storage,
        })
    }

    fn with<R>(&self, f: impl FnOnce(&mut StreamState, &mut [u8]) -> R) -> R {
        super::critical_section(|cs| {
            let mut state = self.control.state.borrow_ref_mut(cs);
            let mut bytes = self.storage.bytes.borrow_mut();
            f(&mut state, &mut bytes[..])
        })
    }

    fn wake(&self, tasks: [Option<TaskId>; 2]) {
        for task in tasks.into_iter().flatten() {
            self.kernel.wake(task);
        }
    }

    /// Copy as much of `src` as fits, then wake whoever can progress.
    fn write_some(&self, src: &[u8]) -> usize {
        let (count, woken) = self.with(|state, bytes| {
            let count = state.write_from(bytes, src);
            (count, state.signal(N))
        });
        self.wake(woken);
        count
    }

    /// Copy out up to `dst.len()` bytes, but only once the reader's
    /// threshold is buffered. `at_least_one` drops the threshold to 1.
    fn read_some(&self, dst: &mut [u8], at_least_one: bool) -> usize {
        let (count, woken) = self.with(|state, bytes| {
            let wanted = if at_least_one { 1 } else { state.threshold(dst.len()) };
            if state.available(N) < wanted {
                return (0, [None, None]);
            }
            let count = state.read_into(bytes, dst);
            (count, state.signal(N))
        });
        self.wake(woken);
        count
    }

    // -----------------------------------------------------------------------
    // Blocking operations
    // -----------------------------------------------------------------------

    /// Write `data`, waiting for space according to `wait` if none is
    /// free. Resolves to the number of bytes written.
    pub fn send<'b>(&self, data: &'b [u8], wait: Wait) -> StreamSend<'a, 'b, N> {
        StreamSend {
            stream: *self,
            data,
            wait,
            waiting: None,
        }
    }

    /// Read into `buf` once `min(trigger level, buf.len())` bytes are
    /// buffered. On expiry of the wait, whatever is buffered is returned.
    pub fn receive<'b>(&self, buf: &'b mut [u8], wait: Wait) -> StreamReceive<'a, 'b, N> {
        StreamReceive {
            stream: *self,
            buf,
            wait,
            waiting: None,
        }
    }

    // -----------------------------------------------------------------------
    // Non-blocking operations
    // -----------------------------------------------------------------------

    pub fn try_send(&self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        match self.write_some(data) {
            0 => Err(Error::WouldBlock),
            count => Ok(count),
        }
    }

    /// Read whatever is buffered, up to `buf.len()` bytes.
    pub fn try_receive(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.read_some(buf, true) {
            0 => Err(Error::WouldBlock),
            count => Ok(count),
        }
    }

    /// Empty the buffer. Refused while any task is blocked on it.
    pub fn reset(&self) -> bool {
        self.with(|state, _| {
            if !state.readers.is_empty() || !state.writers.is_empty() {
                return false;
            }
            state.read = 0;
            state.write = 0;
            true
        })
    }

    /// Change the trigger level. 0 is treated as 1; a level above the
    /// capacity is refused.
    pub fn set_trigger_level(&self, level: usize) -> bool {
        if level > N - 1 {
            return false;
        }
        let woken = self.with(|state, _| {
            state.trigger = level.max(1);
            state.signal(N)
        });
        self.wake(woken);
        true
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn trigger_level(&self) -> usize {
        self.with(|state, _| state.trigger)
    }

    /// Bytes waiting to be read.
    pub fn available(&self) -> usize {
        self.with(|state, _| state.available(N))
    }

    /// Bytes that can be written without blocking.
    pub fn spaces(&self) -> usize {
        self.with(|state, _| state.spaces(N))
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn is_full(&self) -> bool {
        self.spaces() == 0
    }

    pub const fn capacity(&self) -> usize {
        N - 1
    }
}

impl<const N: usize> Traced for StreamBuffer<'_, N> {
    const KIND: ObjectKind = ObjectKind::StreamBuffer;

    fn set_trace_name(&self, name: &'static str) {
        super::critical_section(|cs| self.control.state.borrow_ref_mut(cs).name = Some(name));
    }

    fn trace_name(&self) -> Option<&'static str> {
        super::critical_section(|cs| self.control.state.borrow_ref(cs).name)
    }
}

// ---------------------------------------------------------------------------
// Futures
// ---------------------------------------------------------------------------

/// A registered wait: who waits, since when, and until when.
#[derive(Debug, Clone, Copy)]
struct Registration {
    me: TaskId,
    seq: u64,
    expiry: Expiry,
}

/// How a woken waiter should proceed.
enum Wake {
    Retry,
    Expired,
    Sleep,
}

/// Future returned by [`StreamBuffer::send`].
pub struct StreamSend<'a, 'b, const N: usize> {
    stream: StreamBuffer<'a, N>,
    data: &'b [u8],
    wait: Wait,
    waiting: Option<Registration>,
}

impl<const N: usize> StreamSend<'_, '_, N> {
    fn settle(&self, reg: Registration) -> Wake {
        let now = self.stream.kernel.now();
        self.stream.with(|state, _| match state.writers.settle(reg.me, reg.expiry, now) {
            Some(Ok(_)) => Wake::Retry,
            Some(Err(_)) => Wake::Expired,
            None => Wake::Sleep,
        })
    }

    fn block(&mut self, reg: Registration) -> Result<()> {
        let kernel = self.stream.kernel;
        let waiter = Waiter::new(reg.me, kernel.priority_of(reg.me), reg.seq);
        self.stream.with(|state, _| state.writers.push(waiter))?;
        kernel.block_current(reg.expiry.deadline());
        self.waiting = Some(reg);
        Ok(())
    }
}

impl<const N: usize> Future for StreamSend<'_, '_, N> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<usize>> {
        let this = self.get_mut();
        let kernel = this.stream.kernel;

        let reg = match this.waiting {
            None => {
                if this.data.is_empty() {
                    return Poll::Ready(Ok(0));
                }
                let count = this.stream.write_some(this.data);
                if count > 0 {
                    return Poll::Ready(Ok(count));
                }
                let expiry = this.wait.expiry(kernel.now());
                if expiry == Expiry::Immediate {
                    return Poll::Ready(Err(Error::WouldBlock));
                }
                let Some(me) = kernel.current() else {
                    return Poll::Ready(Err(Error::NoTask));
                };
                let reg = Registration {
                    me,
                    seq: kernel.next_seq(),
                    expiry,
                };
                return match this.block(reg) {
                    Ok(()) => Poll::Pending,
                    Err(e) => Poll::Ready(Err(e)),
                };
            }
            Some(reg) => reg,
        };

        match this.settle(reg) {
            Wake::Sleep => {
                kernel.block_current(reg.expiry.deadline());
                Poll::Pending
            }
            Wake::Expired => {
                this.waiting = None;
                Poll::Ready(Err(Error::Timeout))
            }
            Wake::Retry => {
                this.waiting = None;
                let count = this.stream.write_some(this.data);
                if count > 0 {
                    return Poll::Ready(Ok(count));
                }
                if reg.expiry.elapsed(kernel.now()) {
                    return Poll::Ready(Err(Error::Timeout));
                }
                match this.block(reg) {
                    Ok(()) => Poll::Pending,
                    Err(e) => Poll::Ready(Err(e)),
                }
            }
        }
    }
}

impl<const N: usize> Drop for StreamSend<'_, '_, N> {
    fn drop(&mut self) {
        if let Some(reg) = self.waiting {
            let woken = self.stream.with(|state, _| {
                state.writers.remove(reg.me);
                state.signal(N)
            });
            self.stream.wake(woken);
        }
    }
}

/// Future returned by [`StreamBuffer::receive`].
pub struct StreamReceive<'a, 'b, const N: usize> {
    stream: StreamBuffer<'a, N>,
    buf: &'b mut [u8],
    wait: Wait,
    waiting: Option<Registration>,
}

impl<const N: usize> StreamReceive<'_, '_, N> {
    fn settle(&self, reg: Registration) -> Wake {
        let now = self.stream.kernel.now();
        self.stream.with(|state, _| match state.readers.settle(reg.me, reg.expiry, now) {
            Some(Ok(_)) => Wake::Retry,
            Some(Err(_)) => Wake::Expired,
            None => Wake::Sleep,
        })
    }

    fn block(&mut self, reg: Registration) -> Result<()> {
        let kernel = self.stream.kernel;
        let waiter = Waiter::new(reg.me, kernel.priority_of(reg.me), reg.seq).with_payload(self.buf.len());
        self.stream.with(|state, _| state.readers.push(waiter))?;
        kernel.block_current(reg.expiry.deadline());
        self.waiting = Some(reg);
        Ok(())
    }

    /// Wait is over without reaching the threshold: return what is there.
    fn partial(&mut self, empty: Error) -> Poll<Result<usize>> {
        match self.stream.read_some(self.buf, true) {
            0 => Poll::Ready(Err(empty)),
            count => Poll::Ready(Ok(count)),
        }
    }
}

impl<const N: usize> Future for StreamReceive<'_, '_, N> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<usize>> {
        let this = self.get_mut();
        let kernel = this.stream.kernel;

        let reg = match this.waiting {
            None => {
                if this.buf.is_empty() {
                    return Poll::Ready(Ok(0));
                }
                let count = this.stream.read_some(this.buf, false);
                if count > 0 {
                    return Poll::Ready(Ok(count));
                }
                let expiry = this.wait.expiry(kernel.now());
                if expiry == Expiry::Immediate {
                    return this.partial(Error::WouldBlock);
                }
                let Some(me) = kernel.current() else {
                    return Poll::Ready(Err(Error::NoTask));
                };
                let reg = Registration {
                    me,
                    seq: kernel.next_seq(),
                    expiry,
                };
                return match this.block(reg) {
                    Ok(()) => Poll::Pending,
                    Err(e) => Poll::Ready(Err(e)),
                };
            }
            Some(reg) => reg,
        };

        match this.settle(reg) {
            Wake::Sleep => {
                kernel.block_current(reg.expiry.deadline());
                Poll::Pending
            }
            Wake::Expired => {
                this.waiting = None;
                this.partial(Error::Timeout)
            }
            Wake::Retry => {
                this.waiting = None;
                let count = this.stream.read_some(this.buf, false);
                if count > 0 {
                    return Poll::Ready(Ok(count));
                }
                if reg.expiry.elapsed(kernel.now()) {
                    return this.partial(Error::Timeout);
                }
                match this.block(reg) {
                    Ok(()) => Poll::Pending,
                    Err(e) => Poll::Ready(Err(e)),
                }
            }
        }
    }
}

impl<const N: usize> Drop for StreamReceive<'_, '_, N> {
    fn drop(&mut self) {
        if let Some(reg) = self.waiting {
            let woken = self.stream.with(|state, _| {
                state.readers.remove(reg.me);
                state.signal(N)
            });
            self.stream.wake(woken);
        }
    }
}
