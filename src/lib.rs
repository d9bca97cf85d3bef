//! ringcast - growable single-writer broadcast ring for frame distribution.
//!
//! One producer publishes a continuous sequence of frames; any number of
//! independent readers trail behind at their own pace. The producer never
//! blocks on a slow reader: when the slot it wants to reuse is still held, it
//! evicts that slot from the active window and grows a replacement in place.
//! The trade is deliberate and unbounded: sustained reader lag costs memory,
//! never writer availability.
//!
//! # Architecture
//!
//! - [`Ring`] / [`NodeId`]: circular doubly-linked arena of slots with O(1)
//!   neighbor navigation and splice.
//! - [`Slot`]: the capability contract a ring element must satisfy; a
//!   `start_write` refusal (a reader is still attached) is the sole
//!   backpressure signal the writer observes. [`FrameSlot`] is the provided
//!   implementation.
//! - [`RingWriter`]: sequencing, growth/shrink, and the non-blocking race
//!   between the advancing writer and a graceful [`dispose`](RingWriter::dispose).
//! - [`RingReader`]: consumer cursor that resynchronizes against the writer
//!   when its slot is discarded.
//!
//! # Example
//!
//! ```
//! use ringcast::{FrameSlot, RingWriter};
//!
//! let mut writer = RingWriter::new(3, FrameSlot::<u64>::new).unwrap();
//! let handle = writer.handle();
//! let mut reader = handle.subscribe();
//!
//! writer.current().fill(1);
//! writer.step();
//! assert_eq!(reader.frame().read(), Some(1));
//!
//! reader.advance();
//! handle.dispose();
//! assert_eq!(reader.frame().read(), None); // end of stream
//! ```

mod config;
mod invariants;
mod metrics;
mod reader;
mod ring;
mod slot;
mod writer;

pub use config::RingConfig;
pub use metrics::{Metrics, MetricsSnapshot};
pub use reader::RingReader;
pub use ring::{NodeId, Ring};
pub use slot::{FrameSlot, Slot};
pub use writer::{RingError, RingHandle, RingWriter};
