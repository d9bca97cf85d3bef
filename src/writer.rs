use crate::invariants::{debug_assert_pool_len, debug_assert_window_len};
use crate::{MetricsSnapshot, NodeId, Ring, RingConfig, RingReader, Slot};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// WRITER / DISPOSAL RACE
// =============================================================================
//
// `step`, `grow`, `reduce` belong to one producer context and are never called
// concurrently with each other; that is caller discipline, enforced by `&mut
// self`. `dispose` is the one operation designed to run concurrently with at
// most one in-flight `step`, and all coordination goes through a single
// tri-state atomic counter:
//
//     0   idle                (no step in flight, not disposed)
//     1   step in flight
//   < 0   disposed            (dispose subtracts 2, exactly once effective)
//
// Neither side ever blocks or spins: on losing the race each takes a
// pre-defined alternate branch.
//
// - `step` enters with CAS 0 -> 1. Failure means a disposal happened (or is
//   happening): refuse silently, touch nothing.
// - `step` leaves with CAS 1 -> 0. Failure means a disposal landed mid-step
//   (counter is now -1): the step additionally publishes the slot it just
//   advanced to, honoring the disposal guarantee.
// - `dispose` does fetch_sub(2). Observing 0 means no step was in flight and
//   this call owns the final publish; observing 1 defers it to the in-flight
//   step's exit CAS. Either way the final slot is marked Ready exactly once,
//   and no step can begin after a completed disposal (the counter stays
//   negative forever).
//
// The counter is deliberately not a boolean: idle, in-flight, and
// post-dispose are three distinct regions the +1/-2 arithmetic keeps apart.
//
// =============================================================================

/// Error types for ring construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// The active window needs at least one slot.
    #[error("ring requires at least one slot")]
    ZeroCapacity,
}

/// Single-producer publish/advance engine over a growable ring of slots.
///
/// Exactly one slot in the active window is in Writing state: the one at the
/// write pointer. The producer writes its payload into
/// [`current`](RingWriter::current) and then calls [`step`](RingWriter::step);
/// the writer never waits for readers, it grows the window instead
/// ([`grow`](RingWriter::grow) / [`reduce`](RingWriter::reduce)).
///
/// Sustained reader lag keeps growing the window: memory is traded for writer
/// availability, by design.
pub struct RingWriter<F: Slot> {
    ring: Arc<Ring<F>>,
    factory: Box<dyn FnMut() -> F + Send>,
    /// Write pointer. Mirrored into the shared ring for readers.
    head: NodeId,
    /// Active-window length.
    size: usize,
    /// Entry into the pool ring of detached, zero-reader slots.
    pool: Option<NodeId>,
    pool_size: usize,
}

impl<F: Slot> RingWriter<F> {
    /// Builds `n` fresh slots, links them circularly, and starts writing on
    /// the first.
    pub fn new(
        n: usize,
        factory: impl FnMut() -> F + Send + 'static,
    ) -> Result<Self, RingError> {
        Self::with_config(n, RingConfig::default(), factory)
    }

    /// [`new`](RingWriter::new) with an explicit [`RingConfig`].
    pub fn with_config(
        n: usize,
        config: RingConfig,
        factory: impl FnMut() -> F + Send + 'static,
    ) -> Result<Self, RingError> {
        if n == 0 {
            return Err(RingError::ZeroCapacity);
        }
        let mut writer = Self {
            ring: Arc::new(Ring::new(n, config)),
            factory: Box::new(factory),
            head: NodeId(0),
            size: 0,
            pool: None,
            pool_size: 0,
        };
        writer.head = writer.create_ring(n);
        writer.size = n;
        writer.ring.set_head(writer.head);
        writer.ring.set_last(writer.head);

        let first = writer.ring.frame(writer.head);
        first.set_sequence(config.initial_sequence);
        let accepted = first.start_write();
        debug_assert!(accepted, "fresh initial slot refused the writer");
        Ok(writer)
    }

    /// Publishes the just-filled current slot and advances to a writable one.
    ///
    /// Called once per completed frame, after the payload is written into
    /// [`current`](RingWriter::current). When the next slot is still held by
    /// a lagging reader it is evicted and replaced in place, preserving the
    /// window length.
    ///
    /// Returns `true` iff the reuse path was taken (no eviction). Returns
    /// `false` with no state change once a disposal has completed; the caller
    /// must stop producing.
    ///
    /// # Panics
    ///
    /// Panics if a freshly reset or pooled slot refuses `start_write`. That
    /// can only mean the protocol was corrupted elsewhere; retrying cannot
    /// repair a broken invariant.
    pub fn step(&mut self) -> bool {
        if self
            .ring
            .dispose
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // disposed
            return false;
        }

        let previous = self.head;
        self.ring.set_last(previous);
        let next_seq = self.ring.frame(previous).sequence() + 1;

        // The node after the write pointer is the oldest slot in the window.
        let candidate = self.ring.next(previous);
        let normal = self.ring.frame(candidate).start_write();
        if normal {
            self.ring.frame(candidate).reset();
            self.head = candidate;
        } else {
            // A lagging reader still holds the candidate: evict exactly that
            // node and regrow in place.
            self.reduce(1);
            self.head = self.grow(1);
            if !self.ring.frame(self.head).start_write() {
                panic!("pooled slot refused start_write: ring protocol corrupted");
            }
            if self.ring.config.enable_metrics {
                self.ring.metrics.add_eviction();
            }
        }

        self.ring.set_head(self.head);
        self.ring.frame(self.head).set_sequence(next_seq);
        // Published only after the write pointer has advanced, so a reader
        // woken by this finds the next slot already coherent.
        self.ring.frame(previous).mark_ready();

        if self.ring.config.enable_metrics {
            self.ring.metrics.add_step();
        }

        if self
            .ring
            .dispose
            .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // A disposal landed mid-step; it deferred the final publish to us.
            self.ring.frame(self.head).mark_ready();
        }
        normal
    }

    /// Evicts the `count` oldest slots from the active window.
    ///
    /// Each detached slot with no attached reader is flushed (marked Ready)
    /// and returned to the pool; a slot a reader still holds is discarded and
    /// left outside both the window and the pool, kept alive only by that
    /// reader.
    ///
    /// # Panics
    ///
    /// Panics if `count >= size`; the window must keep at least one slot.
    pub fn reduce(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        assert!(
            count < self.size,
            "reduce({count}) must leave at least one slot in a window of {}",
            self.size
        );

        let detached = self.ring.unlink(self.head, count);
        let mut p = detached;
        for _ in 0..count {
            let next = self.ring.next(p);
            self.ring.isolate(p);
            let slot = self.ring.frame(p);
            if slot.start_write() {
                slot.mark_ready();
                self.recycle(p);
            } else {
                // Left to its readers; not reclaimed when they leave (the
                // writer has no cheap way to find it again, see DESIGN.md).
                slot.discard();
                if self.ring.config.enable_metrics {
                    self.ring.metrics.add_orphaned();
                }
            }
            p = next;
        }
        self.size -= count;
        debug_assert_window_len!(self.ring, self.head, self.size);
    }

    /// Grows the active window by `count` slots, spliced immediately after
    /// the write pointer, and returns the first of them.
    ///
    /// Pooled slots are used first; only `count - pool_size` new slots are
    /// constructed when the pool runs short.
    pub fn grow(&mut self, count: usize) -> NodeId {
        assert!(count >= 1, "grow of zero slots");

        let spliced = if count < self.pool_size {
            let entry = self.pool.expect("pool_size > 0 with no pool ring");
            self.pool_size -= count;
            self.ring.unlink(entry, count)
        } else if count == self.pool_size {
            self.pool_size = 0;
            self.pool.take().expect("pool_size > 0 with no pool ring")
        } else {
            let fresh = self.create_ring(count - self.pool_size);
            if let Some(entry) = self.pool.take() {
                self.ring.link(fresh, entry);
            }
            self.pool_size = 0;
            fresh
        };

        self.ring.link(self.head, spliced);
        self.size += count;
        debug_assert_window_len!(self.ring, self.head, self.size);
        debug_assert_pool_len!(self.ring, self.pool, self.pool_size);
        spliced
    }

    /// Requests a graceful shutdown; see the race protocol above.
    ///
    /// Idempotent. Guarantees the slot that is current at the moment the
    /// disposal takes effect is marked Ready exactly once (here, or by the
    /// in-flight `step` losing its exit race), and that no later `step`
    /// performs any transition.
    pub fn dispose(&self) {
        dispose_ring(&self.ring);
    }

    /// The slot at the write pointer, owned by the producer for payload
    /// writes until the next [`step`](RingWriter::step).
    pub fn current(&self) -> &F {
        self.ring.frame(self.head)
    }

    /// The most recently published slot, for a collaborator that needs the
    /// last completed frame without walking the ring.
    pub fn last_frame(&self) -> &F {
        self.ring.frame(self.ring.last())
    }

    /// Active-window length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Detached zero-reader slots available for regrowth.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Aggregate subscriber count diagnostic.
    pub fn reader_count(&self) -> i32 {
        self.ring.reader_count.load(Ordering::Acquire)
    }

    /// True once a disposal has taken effect. [`step`](RingWriter::step)
    /// returns `false` both for an eviction and after disposal; this is how a
    /// producer loop tells the two apart.
    pub fn is_disposed(&self) -> bool {
        self.ring.dispose.load(Ordering::Acquire) < 0
    }

    /// Attaches a reader at the writer's current slot.
    pub fn subscribe(&self) -> RingReader<F> {
        RingReader::attach(Arc::clone(&self.ring))
    }

    /// Cloneable handle for contexts other than the producer: disposal,
    /// subscription, and observation.
    pub fn handle(&self) -> RingHandle<F> {
        RingHandle {
            ring: Arc::clone(&self.ring),
        }
    }

    /// Snapshot of activity counters; all zeros unless
    /// [`RingConfig::enable_metrics`] is set.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.ring.metrics.snapshot()
    }

    fn alloc_slot(&mut self) -> NodeId {
        let slot = (self.factory)();
        slot.init();
        self.ring.alloc(slot)
    }

    /// Builds a standalone closed ring of `count` fresh, initialized slots.
    fn create_ring(&mut self, count: usize) -> NodeId {
        debug_assert!(count >= 1);
        let first = self.alloc_slot();
        for _ in 1..count {
            let id = self.alloc_slot();
            // insert before `first`, keeping allocation order around the circle
            let tail = self.ring.prev(first);
            self.ring.link(tail, id);
        }
        if self.ring.config.enable_metrics {
            self.ring.metrics.add_allocated(count as u64);
        }
        first
    }

    /// Returns an evicted, reader-free slot to the pool.
    fn recycle(&mut self, id: NodeId) {
        let slot = self.ring.frame(id);
        slot.init();
        slot.reset();
        self.pool_size += 1;
        match self.pool {
            None => self.pool = Some(id),
            Some(entry) => self.ring.link(entry, id),
        }
        if self.ring.config.enable_metrics {
            self.ring.metrics.add_recycled();
        }
        debug_assert_pool_len!(self.ring, self.pool, self.pool_size);
    }
}

fn dispose_ring<F: Slot>(ring: &Ring<F>) {
    // Subtracting 2 keeps the counter negative forever; a later step's
    // 0 -> 1 CAS can never succeed again.
    if ring.dispose.fetch_sub(2, Ordering::AcqRel) == 0 {
        ring.frame(ring.head()).mark_ready();
    }
}

/// Shared handle to a ring, detached from the producer's `&mut` discipline.
///
/// Mirrors the split between the producing side and everyone else: disposal
/// may race the producer, subscribers come and go from other threads.
pub struct RingHandle<F: Slot> {
    ring: Arc<Ring<F>>,
}

impl<F: Slot> RingHandle<F> {
    /// See [`RingWriter::dispose`].
    pub fn dispose(&self) {
        dispose_ring(&self.ring);
    }

    /// Attaches a reader at the writer's current slot.
    pub fn subscribe(&self) -> RingReader<F> {
        RingReader::attach(Arc::clone(&self.ring))
    }

    /// The most recently published slot.
    pub fn last_frame(&self) -> &F {
        self.ring.frame(self.ring.last())
    }

    /// Aggregate subscriber count diagnostic.
    pub fn reader_count(&self) -> i32 {
        self.ring.reader_count.load(Ordering::Acquire)
    }

    /// True once a disposal has taken effect.
    pub fn is_disposed(&self) -> bool {
        self.ring.dispose.load(Ordering::Acquire) < 0
    }

    /// Read-only navigation over the shared ring structure.
    pub fn ring(&self) -> &Ring<F> {
        &self.ring
    }

    /// Snapshot of activity counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.ring.metrics.snapshot()
    }
}

impl<F: Slot> Clone for RingHandle<F> {
    fn clone(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
        }
    }
}
