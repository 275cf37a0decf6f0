//! Fan-out statistics

/// Counters for one muxer instance, snapshotted on request
#[derive(Debug, Clone, Default)]
pub struct MuxerStats {
    /// Frames accepted on the input path
    pub frames_in: u64,
    /// Merged units delivered to consumers
    pub units_out: u64,
    /// Frames discarded before the all-tracks-ready transition
    pub dropped_pre_ready: u64,
    /// Consumer delivery failures (each one detaches the consumer)
    pub sink_errors: u64,
    /// Attached protocol sinks at snapshot time
    pub sinks: usize,
    /// Active recorders at snapshot time
    pub recorders: usize,
    /// Active RTP push sessions at snapshot time
    pub rtp_senders: usize,
}

impl MuxerStats {
    pub fn new() -> Self {
        Self::default()
    }
}
