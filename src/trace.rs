//! Diagnostic names for trace tooling.
//!
//! Attaching a name never changes how an object behaves. The name is kept
//! in the object's control block so a debugger or a trace recorder can find
//! it, and the registration is also emitted through `tracing::trace!`.

/// Kind of kernel object a trace name is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Mutex,
    RecursiveMutex,
    Queue,
    StreamBuffer,
}

impl ObjectKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Mutex => "mutex",
            ObjectKind::RecursiveMutex => "recursive mutex",
            ObjectKind::Queue => "queue",
            ObjectKind::StreamBuffer => "stream buffer",
        }
    }
}

/// Object that can carry a trace name.
pub trait Traced {
    const KIND: ObjectKind;

    fn set_trace_name(&self, name: &'static str);

    fn trace_name(&self) -> Option<&'static str>;
}

/// Attach `name` to `object`.
pub fn register<O: Traced>(object: &O, name: &'static str) {
    object.set_trace_name(name);
    tracing::trace!("{} registered as \"{}\"", O::KIND.as_str(), name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Block, StreamStorage};
    use crate::kernel::Kernel;
    use crate::sync::{Mutex, MutexControl, StreamBuffer, StreamControl};

    #[test]
    fn test_names_are_stored_per_object() {
        let kernel = Kernel::new();
        let m1 = Block::new(MutexControl::new());
        let m2 = Block::new(MutexControl::new());
        let a = Mutex::new(&kernel, m1.claim().unwrap());
        let b = Mutex::new(&kernel, m2.claim().unwrap());

        assert_eq!(a.trace_name(), None);
        register(&a, "mymutex1");
        assert_eq!(a.trace_name(), Some("mymutex1"));
        assert_eq!(b.trace_name(), None);
    }

    #[test]
    fn test_naming_leaves_behavior_alone() {
        let kernel = Kernel::new();
        let control = Block::new(StreamControl::new());
        let storage = Block::new(StreamStorage::<9>::new());
        let sb = StreamBuffer::new(&kernel, control.claim().unwrap(), storage.claim().unwrap(), 1).unwrap();

        sb.try_send(b"abc").unwrap();
        register(&sb, "sb1");
        assert_eq!(sb.available(), 3);
        assert_eq!(<StreamBuffer<'_, 9> as Traced>::KIND, ObjectKind::StreamBuffer);
    }
}
