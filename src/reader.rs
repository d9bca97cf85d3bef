use crate::{NodeId, Ring, Slot};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Consumer cursor trailing behind the writer at its own pace.
///
/// A reader holds exactly one node at a time. It attaches with
/// `reader_enter`, reads the slot's payload and sequence, and follows
/// `next()`; a slot that becomes discarded mid-read is a signal to
/// resynchronize against the writer's current node instead of following stale
/// links. While the reader holds a slot the writer will evict rather than
/// overwrite it, so readers never see a frame change under them.
///
/// Dropping the reader releases its slot and the aggregate subscriber count.
pub struct RingReader<F: Slot> {
    ring: Arc<Ring<F>>,
    at: NodeId,
}

impl<F: Slot> RingReader<F> {
    pub(crate) fn attach(ring: Arc<Ring<F>>) -> Self {
        let at = ring.head();
        ring.frame(at).reader_enter();
        ring.reader_count.fetch_add(1, Ordering::AcqRel);
        Self { ring, at }
    }

    /// The slot the reader currently holds.
    pub fn frame(&self) -> &F {
        self.ring.frame(self.at)
    }

    /// Handle of the held node.
    pub fn node(&self) -> NodeId {
        self.at
    }

    /// Moves to the following slot and returns it.
    ///
    /// The next slot is entered before the current one is released, so there
    /// is no instant where the reader holds nothing. A discarded current slot
    /// redirects the move to the writer's current node.
    pub fn advance(&mut self) -> &F {
        let next = self.target();
        self.ring.frame(next).reader_enter();
        self.ring.frame(self.at).reader_leave();
        self.at = next;
        self.frame()
    }

    /// Non-blocking variant of [`advance`](RingReader::advance): only moves
    /// onto a slot that is already Ready and not discarded.
    pub fn try_advance(&mut self) -> bool {
        let next = self.target();
        if next == self.at {
            return false;
        }
        if !self.ring.frame(next).reader_try_enter() {
            return false;
        }
        self.ring.frame(self.at).reader_leave();
        self.at = next;
        true
    }

    fn target(&self) -> NodeId {
        if self.frame().is_discarded() {
            self.ring.head()
        } else {
            self.ring.next(self.at)
        }
    }
}

impl<F: Slot> Drop for RingReader<F> {
    fn drop(&mut self) {
        self.ring.frame(self.at).reader_leave();
        self.ring.reader_count.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use crate::{FrameSlot, RingConfig, RingWriter, Slot};

    fn writer_of(n: usize) -> RingWriter<FrameSlot<u64>> {
        RingWriter::with_config(n, RingConfig::new(0, true), FrameSlot::new).unwrap()
    }

    #[test]
    fn test_subscribe_positions_at_current() {
        let w = writer_of(3);
        let reader = w.subscribe();
        assert_eq!(reader.node(), w.handle().ring().head());
        assert_eq!(reader.frame().reader_count(), 1);
    }

    #[test]
    fn test_reader_follows_publishes() {
        // window of 4 so the writer never wraps onto the parked reader here
        let mut w = writer_of(4);
        let mut reader = w.subscribe();

        for v in [10u64, 20, 30] {
            w.current().fill(v);
            w.step();
        }

        assert_eq!(reader.frame().read(), Some(10));
        assert_eq!(reader.advance().read(), Some(20));
        assert_eq!(reader.advance().read(), Some(30));
    }

    #[test]
    fn test_advance_holds_before_release() {
        let mut w = writer_of(3);
        let handle = w.handle();
        let mut reader = w.subscribe();
        w.step();

        let previous = reader.node();
        reader.advance();
        assert_eq!(handle.ring().frame(previous).reader_count(), 0);
        assert_eq!(reader.frame().reader_count(), 1);
    }

    #[test]
    fn test_discard_resyncs_to_writer() {
        let mut w = writer_of(2);
        let mut reader = w.subscribe();

        w.step();
        w.step(); // wraps onto the reader's slot, evicting it

        assert!(reader.frame().is_discarded());
        reader.advance();
        assert_eq!(
            reader.node(),
            w.handle().ring().head(),
            "discard redirects the reader to the writer's current node"
        );
    }

    #[test]
    fn test_try_advance_refuses_unready() {
        let mut w = writer_of(3);
        let mut reader = w.subscribe();

        assert!(
            !reader.try_advance(),
            "next slot is not yet published"
        );
        w.step();
        assert!(
            !reader.try_advance(),
            "reader sits on the published slot; the next one is mid-write"
        );
        w.step();
        assert!(reader.try_advance(), "one published slot ahead now");
    }

    #[test]
    fn test_drop_releases_slot() {
        let mut w = writer_of(2);
        let reader = w.subscribe();
        assert_eq!(w.reader_count(), 1);

        drop(reader);
        assert_eq!(w.reader_count(), 0);
        // the writer can now wrap over the released slot without evicting
        assert!(w.step());
        assert!(w.step());
        assert_eq!(w.metrics().evictions, 0);
    }
}
