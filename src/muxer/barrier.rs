//! Track readiness barrier
//!
//! Fan-out must not start until every track of the source has reported its
//! essential decode parameters. The barrier collects per-track readiness
//! and fires exactly once when the registered set completes. Sources are
//! expected to register all tracks before marking any of them ready.
//!
//! No timeout lives here: a stream that never completes simply never
//! activates, and an external supervisor reaps it.

use std::collections::HashMap;

use crate::media::frame::TrackType;
use crate::muxer::sink::TrackInfo;

struct TrackEntry {
    info: TrackInfo,
    ready: bool,
}

/// Readiness gate over the registered track set
pub struct TrackBarrier {
    tracks: HashMap<TrackType, TrackEntry>,
    fired: bool,
}

impl TrackBarrier {
    pub fn new() -> Self {
        Self {
            tracks: HashMap::new(),
            fired: false,
        }
    }

    /// Register a track. Returns false once the barrier has fired; a track
    /// of the same type replaces the earlier registration.
    pub fn add_track(&mut self, info: TrackInfo) -> bool {
        if self.fired {
            return false;
        }
        let track_type = info.track_type();
        self.tracks.insert(
            track_type,
            TrackEntry {
                info,
                ready: false,
            },
        );
        true
    }

    /// Mark one track ready. Returns true exactly once: on the call that
    /// completes the set. Repeat calls and unknown tracks are no-ops.
    pub fn set_ready(&mut self, track_type: TrackType) -> bool {
        if self.fired {
            return false;
        }
        match self.tracks.get_mut(&track_type) {
            Some(entry) => entry.ready = true,
            None => return false,
        }
        if !self.tracks.is_empty() && self.tracks.values().all(|t| t.ready) {
            self.fired = true;
            return true;
        }
        false
    }

    /// Whether the all-ready transition has happened
    pub fn is_all_ready(&self) -> bool {
        self.fired
    }

    /// Ready tracks, in registration-independent order
    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.tracks
            .values()
            .filter(|t| t.ready)
            .map(|t| t.info.clone())
            .collect()
    }

    /// Number of registered tracks
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Drop all tracks and re-arm the barrier
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.fired = false;
    }
}

impl Default for TrackBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::frame::CodecId;

    #[test]
    fn test_fires_when_all_tracks_ready() {
        let mut barrier = TrackBarrier::new();
        barrier.add_track(TrackInfo::new(CodecId::H264));
        barrier.add_track(TrackInfo::new(CodecId::Aac));

        assert!(!barrier.set_ready(TrackType::Video));
        assert!(!barrier.is_all_ready());

        assert!(barrier.set_ready(TrackType::Audio));
        assert!(barrier.is_all_ready());
    }

    #[test]
    fn test_fires_exactly_once() {
        let mut barrier = TrackBarrier::new();
        barrier.add_track(TrackInfo::new(CodecId::H264));

        assert!(barrier.set_ready(TrackType::Video));
        // Repeat readiness reports are no-ops
        assert!(!barrier.set_ready(TrackType::Video));
        assert!(barrier.is_all_ready());
    }

    #[test]
    fn test_unknown_track_is_noop() {
        let mut barrier = TrackBarrier::new();
        barrier.add_track(TrackInfo::new(CodecId::H264));

        assert!(!barrier.set_ready(TrackType::Audio));
        assert!(!barrier.is_all_ready());
    }

    #[test]
    fn test_empty_barrier_never_fires() {
        let mut barrier = TrackBarrier::new();
        assert!(!barrier.set_ready(TrackType::Video));
        assert!(!barrier.is_all_ready());
    }

    #[test]
    fn test_no_registration_after_fire() {
        let mut barrier = TrackBarrier::new();
        barrier.add_track(TrackInfo::new(CodecId::H264));
        barrier.set_ready(TrackType::Video);

        assert!(!barrier.add_track(TrackInfo::new(CodecId::Aac)));
        assert_eq!(barrier.track_count(), 1);
    }

    #[test]
    fn test_tracks_lists_only_ready() {
        let mut barrier = TrackBarrier::new();
        barrier.add_track(TrackInfo::new(CodecId::H264));
        barrier.add_track(TrackInfo::new(CodecId::Aac));
        barrier.set_ready(TrackType::Video);

        let ready = barrier.tracks();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].codec, CodecId::H264);
    }

    #[test]
    fn test_reset_rearms() {
        let mut barrier = TrackBarrier::new();
        barrier.add_track(TrackInfo::new(CodecId::H264));
        barrier.set_ready(TrackType::Video);
        assert!(barrier.is_all_ready());

        barrier.reset();
        assert!(!barrier.is_all_ready());
        assert_eq!(barrier.track_count(), 0);
        assert!(barrier.add_track(TrackInfo::new(CodecId::H265)));
    }
}
