use crate::{Metrics, RingConfig};
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicI32, AtomicIsize, AtomicUsize, Ordering};
use std::sync::OnceLock;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// The circular doubly-linked list is an arena of nodes addressed by stable
// index. "next"/"prev" are index links inside the nodes; the pool is a
// separate closed ring of indices owned by the writer. A node evicted while
// still read is simply an index excluded from both the active window and the
// pool until its readers let go.
//
// ## Single-Writer Invariants
//
// - Link words (`next`/`prev`) are mutated by exactly one thread: the
//   producer driving the `RingWriter`. Readers only load them.
// - The arena only grows. `len` is advanced by the producer after the new
//   node's cell is initialized; a node is never moved or dropped while the
//   ring is alive, so resolving any previously published index is always
//   valid without locking.
//
// ## Memory Ordering Protocol
//
// - Node publication: cell init happens-before the Release store of `len`,
//   and before any Release store of a link word carrying the new index.
//   Readers reach new nodes only through Acquire loads of link words (or of
//   `head`), which synchronizes with that publication.
// - `head` (the writer's current node) and `last` (most recently published
//   node) are Release-stored by the producer, Acquire-loaded by readers.
//   A reader that observes a stale link mid-splice still lands on an
//   initialized node and relies on the slot's discarded flag to resync.
// - `dispose` is the tri-state counter of the writer/disposal race; see
//   `RingWriter::step`.
//
// =============================================================================

/// Upper bound on arena chunks. Chunk `c` holds `initial << c` nodes, so the
/// bound is unreachable before memory is.
const CHUNKS: usize = 48;

/// Stable handle to one ring element.
///
/// A `NodeId` stays valid for the lifetime of the [`Ring`] that issued it,
/// even after the node leaves the active window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// One element of the circular list: a slot plus its index links.
struct Node<F> {
    value: F,
    next: AtomicUsize,
    prev: AtomicUsize,
}

/// Circular doubly-linked arena of slots.
///
/// O(1) neighbor navigation and splice. The list is always circular with
/// length >= 1. Also carries the observation points shared between the
/// producer, readers, and the disposal path: the writer's current node, the
/// most recently published node, the disposal counter, and the aggregate
/// reader-count diagnostic.
pub struct Ring<F> {
    // === ARENA === (append-only, chunked so nodes never move)
    chunks: [OnceLock<Box<[OnceLock<Node<F>>]>>; CHUNKS],
    len: AtomicUsize,
    /// Capacity of chunk 0; chunk `c` holds `chunk0 << c` nodes.
    chunk0: usize,

    // === SHARED OBSERVATION POINTS === (128-byte aligned, see protocol above)
    head: CachePadded<AtomicUsize>,
    last: CachePadded<AtomicUsize>,
    pub(crate) dispose: CachePadded<AtomicIsize>,

    // === DIAGNOSTICS ===
    pub(crate) reader_count: AtomicI32,
    pub(crate) metrics: Metrics,
    pub(crate) config: RingConfig,
}

impl<F> Ring<F> {
    pub(crate) fn new(initial: usize, config: RingConfig) -> Self {
        Self {
            chunks: std::array::from_fn(|_| OnceLock::new()),
            len: AtomicUsize::new(0),
            chunk0: initial.max(1),
            head: CachePadded::new(AtomicUsize::new(0)),
            last: CachePadded::new(AtomicUsize::new(0)),
            dispose: CachePadded::new(AtomicIsize::new(0)),
            reader_count: AtomicI32::new(0),
            metrics: Metrics::new(),
            config,
        }
    }

    /// Maps an arena index to (chunk, offset). Chunk `c` covers indices
    /// `[chunk0 * (2^c - 1), chunk0 * (2^(c+1) - 1))`.
    fn locate(&self, idx: usize) -> (usize, usize) {
        let q = idx / self.chunk0 + 1;
        let c = (usize::BITS - 1 - q.leading_zeros()) as usize;
        let off = idx - self.chunk0 * ((1 << c) - 1);
        (c, off)
    }

    fn node(&self, id: NodeId) -> &Node<F> {
        let (c, off) = self.locate(id.0);
        self.chunks[c]
            .get()
            .and_then(|chunk| chunk[off].get())
            .expect("NodeId outside arena")
    }

    /// Appends a new self-linked node. Producer-only.
    pub(crate) fn alloc(&self, value: F) -> NodeId {
        let idx = self.len.load(Ordering::Relaxed);
        let (c, off) = self.locate(idx);
        let chunk = self.chunks[c].get_or_init(|| {
            let cap = self.chunk0 << c;
            (0..cap).map(|_| OnceLock::new()).collect::<Vec<_>>().into_boxed_slice()
        });
        let node = Node {
            value,
            next: AtomicUsize::new(idx),
            prev: AtomicUsize::new(idx),
        };
        if chunk[off].set(node).is_err() {
            panic!("arena index {idx} initialized twice");
        }
        self.len.store(idx + 1, Ordering::Release);
        NodeId(idx)
    }

    /// Number of nodes ever allocated (active window + pool + orphans).
    pub fn allocated(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------------
    // NAVIGATION (any thread)
    // ---------------------------------------------------------------------

    /// The slot held by `id`.
    #[inline]
    pub fn frame(&self, id: NodeId) -> &F {
        &self.node(id).value
    }

    /// O(1) successor lookup. Never fails.
    #[inline]
    pub fn next(&self, id: NodeId) -> NodeId {
        NodeId(self.node(id).next.load(Ordering::Acquire))
    }

    /// O(1) predecessor lookup. Never fails.
    #[inline]
    pub fn prev(&self, id: NodeId) -> NodeId {
        NodeId(self.node(id).prev.load(Ordering::Acquire))
    }

    /// The writer's current node. Readers resynchronize against this when
    /// they observe a discarded slot.
    #[inline]
    pub fn head(&self) -> NodeId {
        NodeId(self.head.load(Ordering::Acquire))
    }

    /// The most recently published node.
    #[inline]
    pub fn last(&self) -> NodeId {
        NodeId(self.last.load(Ordering::Acquire))
    }

    // ---------------------------------------------------------------------
    // SPLICE (producer-only)
    // ---------------------------------------------------------------------

    #[inline]
    fn set_next(&self, id: NodeId, to: NodeId) {
        self.node(id).next.store(to.0, Ordering::Release);
    }

    #[inline]
    fn set_prev(&self, id: NodeId, to: NodeId) {
        self.node(id).prev.store(to.0, Ordering::Release);
    }

    pub(crate) fn set_head(&self, id: NodeId) {
        self.head.store(id.0, Ordering::Release);
    }

    pub(crate) fn set_last(&self, id: NodeId) {
        self.last.store(id.0, Ordering::Release);
    }

    /// Splices the closed ring containing `other` immediately after `at`.
    /// O(1); the result is one merged circular list.
    pub(crate) fn link(&self, at: NodeId, other: NodeId) {
        let after = self.next(at);
        let other_last = self.prev(other);
        self.set_next(at, other);
        self.set_prev(other, at);
        self.set_next(other_last, after);
        self.set_prev(after, other_last);
    }

    /// Detaches the `count` nodes immediately following `at`, re-closes the
    /// remainder, and returns the detached nodes as a standalone closed ring.
    ///
    /// The caller must leave at least one node behind (`count` strictly less
    /// than the ring's length).
    pub(crate) fn unlink(&self, at: NodeId, count: usize) -> NodeId {
        debug_assert!(count >= 1, "unlink of zero nodes");
        let first = self.next(at);
        let mut last = first;
        for _ in 1..count {
            last = self.next(last);
        }
        debug_assert!(last != at, "unlink must leave at least one node");
        let after = self.next(last);
        self.set_next(at, after);
        self.set_prev(after, at);
        self.set_next(last, first);
        self.set_prev(first, last);
        first
    }

    /// Re-closes `id` as a ring of one. Used on eviction so a reader that
    /// still holds the node cannot wander a detached sub-ring.
    pub(crate) fn isolate(&self, id: NodeId) {
        self.set_next(id, id);
        self.set_prev(id, id);
    }
}
