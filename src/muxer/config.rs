//! Fan-out configuration

use std::path::PathBuf;

use crate::media::merger::MergeMode;
use crate::media::stamp::StampMode;

/// Configuration for one [`MediaMuxer`](crate::muxer::MediaMuxer) instance
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// Timestamp rewrite mode applied per track
    pub stamp_mode: StampMode,

    /// Encapsulation applied by the per-track frame mergers
    pub merge_mode: MergeMode,

    /// Groups of pictures retained for late-joiner catch-up
    pub gop_count: usize,

    /// Hard cap on retained backlog slots
    pub gop_max_frames: usize,

    /// Broadcast channel capacity; bounds how far a live reader may lag
    pub ring_capacity: usize,

    /// Root directory for recordings with relative paths
    pub record_root: PathBuf,

    /// Allow several concurrent RTP push sessions under one SSRC
    pub allow_duplicate_ssrc: bool,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            stamp_mode: StampMode::Relative,
            merge_mode: MergeMode::H264Prefix,
            gop_count: 2,
            gop_max_frames: 2048,
            ring_capacity: 512,
            record_root: PathBuf::from("./record"),
            allow_duplicate_ssrc: false,
        }
    }
}

impl MuxerConfig {
    /// Set the timestamp rewrite mode
    pub fn stamp_mode(mut self, mode: StampMode) -> Self {
        self.stamp_mode = mode;
        self
    }

    /// Set the merger encapsulation mode
    pub fn merge_mode(mut self, mode: MergeMode) -> Self {
        self.merge_mode = mode;
        self
    }

    /// Set the number of retained GOPs
    pub fn gop_count(mut self, count: usize) -> Self {
        self.gop_count = count.max(1);
        self
    }

    /// Set the backlog slot cap
    pub fn gop_max_frames(mut self, max: usize) -> Self {
        self.gop_max_frames = max.max(1);
        self
    }

    /// Set the broadcast channel capacity
    pub fn ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity.max(1);
        self
    }

    /// Set the recording root directory
    pub fn record_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.record_root = root.into();
        self
    }

    /// Allow coexisting RTP push sessions per SSRC
    pub fn allow_duplicate_ssrc(mut self) -> Self {
        self.allow_duplicate_ssrc = true;
        self
    }
}
