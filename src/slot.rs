use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Capability contract between a ring element and the [`RingWriter`](crate::RingWriter).
///
/// A slot is a per-element state machine: Free -> Writing -> Ready, with an
/// orthogonal discarded flag that can be raised on a Ready or Writing slot.
/// At most one writer owns a slot at a time; the reader count only decreases
/// through explicit [`reader_leave`](Slot::reader_leave).
///
/// The reader-facing operations must be internally thread-safe: any number of
/// reader contexts call them while the writer advances elsewhere, and the
/// writer's backpressure decision depends on their result.
pub trait Slot: Send + Sync {
    /// Idempotent allocation/clear. Called once at construction and again
    /// when the slot is recycled through the pool.
    fn init(&self);

    /// Clears the payload for reuse. The caller guarantees the slot has zero
    /// attached readers.
    fn reset(&self);

    /// Attempts the Free/Ready -> Writing transition.
    ///
    /// Refuses (returns `false`) iff the slot still has one or more attached
    /// readers. This refusal is the sole backpressure signal the writer
    /// observes. Idempotent when called again on a slot the writer already
    /// owns as Writing. Never blocks.
    fn start_write(&self) -> bool;

    /// Writing -> Ready. Makes the sequence and payload visible and wakes any
    /// reader blocked waiting on this slot.
    fn mark_ready(&self);

    /// Raises the discarded flag. The writer calls this when it evicts a
    /// still-read slot from the active window; any reader blocked on the slot
    /// is woken so it can resynchronize.
    fn discard(&self);

    /// Unconditional attach; increments the reader count.
    fn reader_enter(&self);

    /// Non-blocking attach. Fails if the slot is discarded or not yet Ready.
    fn reader_try_enter(&self) -> bool;

    /// Detach; decrements the reader count. A discarded slot whose count
    /// reaches zero becomes eligible for writer-side reclamation (the writer's
    /// responsibility, not automatic).
    fn reader_leave(&self);

    /// Sets the monotonic publish tag. The writer assigns it before
    /// [`mark_ready`](Slot::mark_ready).
    fn set_sequence(&self, seq: u64);

    /// Returns the publish tag.
    fn sequence(&self) -> u64;

    /// True once the writer has evicted this slot from the active window.
    /// A reader observing this must resynchronize against the writer's
    /// current node instead of continuing to follow `next()`.
    fn is_discarded(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Free,
    Writing,
    Ready,
}

struct Inner<T> {
    write: WriteState,
    payload: Option<T>,
}

/// Provided [`Slot`] implementation holding one frame payload of `T`.
///
/// The write-state machine and payload sit behind a mutex with a condvar for
/// the reader's blocking wait; the reader count, discarded flag, and sequence
/// are atomics so the hot checks stay lock-free. [`mark_ready`](Slot::mark_ready)
/// and [`discard`](Slot::discard) broadcast to waiting readers.
pub struct FrameSlot<T> {
    inner: Mutex<Inner<T>>,
    readable: Condvar,
    readers: AtomicI32,
    discarded: AtomicBool,
    sequence: AtomicU64,
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                write: WriteState::Free,
                payload: None,
            }),
            readable: Condvar::new(),
            readers: AtomicI32::new(0),
            discarded: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
        }
    }

    /// A poisoned slot mutex means a holder panicked mid-update; the state
    /// machine fields are still valid, so keep going.
    fn lock_inner(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the payload. Producer-side, on the writer's current slot.
    ///
    /// Not asserted against the write state: a disposal racing the producer
    /// may have already published this slot, in which case the value is
    /// simply never observed.
    pub fn fill(&self, value: T) {
        self.lock_inner().payload = Some(value);
    }

    /// Number of currently attached readers.
    pub fn reader_count(&self) -> i32 {
        self.readers.load(Ordering::Acquire)
    }
}

impl<T: Clone> FrameSlot<T> {
    /// Blocks until the slot is Ready, then returns a copy of the payload.
    ///
    /// Returns `None` if the slot was discarded before becoming Ready, or if
    /// it was published empty (the disposal path publishes the final slot
    /// without a payload, which readers treat as end-of-stream).
    pub fn read(&self) -> Option<T> {
        let mut inner = self.lock_inner();
        loop {
            if inner.write == WriteState::Ready {
                return inner.payload.clone();
            }
            if self.discarded.load(Ordering::Acquire) {
                return None;
            }
            inner = self
                .readable
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync> Slot for FrameSlot<T> {
    fn init(&self) {
        self.discarded.store(false, Ordering::Release);
    }

    fn reset(&self) {
        self.lock_inner().payload = None;
    }

    fn start_write(&self) -> bool {
        // The lock serializes this against reader_try_enter, so a reader
        // cannot slip in between the count check and the state transition.
        let mut inner = self.lock_inner();
        if self.readers.load(Ordering::Acquire) > 0 {
            return false;
        }
        inner.write = WriteState::Writing;
        true
    }

    fn mark_ready(&self) {
        let mut inner = self.lock_inner();
        inner.write = WriteState::Ready;
        drop(inner);
        self.readable.notify_all();
    }

    fn discard(&self) {
        // Taken under the lock so a reader between its wait-condition check
        // and the actual wait cannot miss the wakeup.
        let inner = self.lock_inner();
        self.discarded.store(true, Ordering::Release);
        drop(inner);
        self.readable.notify_all();
    }

    fn reader_enter(&self) {
        self.readers.fetch_add(1, Ordering::AcqRel);
    }

    fn reader_try_enter(&self) -> bool {
        let inner = self.lock_inner();
        if self.discarded.load(Ordering::Acquire) || inner.write != WriteState::Ready {
            return false;
        }
        self.readers.fetch_add(1, Ordering::AcqRel);
        true
    }

    fn reader_leave(&self) {
        let prev = self.readers.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "reader_leave() without a matching enter");
    }

    fn set_sequence(&self, seq: u64) {
        self.sequence.store(seq, Ordering::Release);
    }

    fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_write_cycle() {
        let slot = FrameSlot::<u32>::new();
        assert!(slot.start_write());
        slot.fill(7);
        slot.set_sequence(1);
        slot.mark_ready();

        assert_eq!(slot.read(), Some(7));
        assert_eq!(slot.sequence(), 1);
    }

    #[test]
    fn test_start_write_refused_while_read() {
        let slot = FrameSlot::<u32>::new();
        assert!(slot.start_write());
        slot.fill(1);
        slot.mark_ready();

        slot.reader_enter();
        assert!(!slot.start_write(), "attached reader must refuse the writer");

        slot.reader_leave();
        assert!(slot.start_write());
    }

    #[test]
    fn test_start_write_idempotent() {
        let slot = FrameSlot::<u32>::new();
        assert!(slot.start_write());
        assert!(slot.start_write());
    }

    #[test]
    fn test_try_enter_requires_ready() {
        let slot = FrameSlot::<u32>::new();
        assert!(!slot.reader_try_enter(), "Free slot is not readable");

        slot.start_write();
        assert!(!slot.reader_try_enter(), "Writing slot is not readable");

        slot.mark_ready();
        assert!(slot.reader_try_enter());
        assert_eq!(slot.reader_count(), 1);
    }

    #[test]
    fn test_try_enter_refuses_discarded() {
        let slot = FrameSlot::<u32>::new();
        slot.start_write();
        slot.mark_ready();
        slot.discard();
        assert!(!slot.reader_try_enter());
        assert!(slot.is_discarded());
    }

    #[test]
    fn test_init_clears_discard() {
        let slot = FrameSlot::<u32>::new();
        slot.discard();
        slot.init();
        assert!(!slot.is_discarded());
    }

    #[test]
    fn test_mark_ready_wakes_blocked_reader() {
        let slot = Arc::new(FrameSlot::<u32>::new());
        slot.start_write();

        let reader = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.read())
        };

        thread::sleep(Duration::from_millis(20));
        slot.fill(42);
        slot.mark_ready();

        assert_eq!(reader.join().unwrap(), Some(42));
    }

    #[test]
    fn test_discard_wakes_blocked_reader() {
        let slot = Arc::new(FrameSlot::<u32>::new());
        slot.start_write();

        let reader = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.read())
        };

        thread::sleep(Duration::from_millis(20));
        slot.discard();

        assert_eq!(reader.join().unwrap(), None);
    }
}
