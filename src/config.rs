/// Configuration for a [`RingWriter`](crate::RingWriter).
#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    /// Sequence number carried by the initial slot. The first published
    /// frame is tagged `initial_sequence + 1`.
    pub initial_sequence: u64,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl RingConfig {
    /// Creates a new configuration with custom settings.
    pub const fn new(initial_sequence: u64, enable_metrics: bool) -> Self {
        Self {
            initial_sequence,
            enable_metrics,
        }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            initial_sequence: 0,
            enable_metrics: false,
        }
    }
}
