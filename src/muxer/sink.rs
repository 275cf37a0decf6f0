//! Consumer capability interface
//!
//! Protocol muxers, file recorders and any other outbound consumer attach
//! to the fan-out orchestrator through one uniform contract: learn the
//! track set once, then accept frames until detached. Concrete muxers and
//! recorders live outside this crate; the orchestrator only manages their
//! lifecycle.

use bytes::Bytes;

use crate::media::frame::{CodecId, MediaFrame, TrackType};
use crate::muxer::error::MuxerError;

/// Description of one elementary-stream track, announced to every consumer
/// before any frame delivery
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// Track codec
    pub codec: CodecId,
    /// Decoder configuration (e.g. parameter sets), when known
    pub config: Option<Bytes>,
}

impl TrackInfo {
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            config: None,
        }
    }

    pub fn with_config(codec: CodecId, config: Bytes) -> Self {
        Self {
            codec,
            config: Some(config),
        }
    }

    /// Track type derived from the codec
    pub fn track_type(&self) -> TrackType {
        self.codec.track_type()
    }
}

/// One outbound consumer of merged frames.
///
/// A sink returning `Err` from [`input_frame`](Self::input_frame) is
/// detached; the error never propagates to other consumers.
pub trait FrameSink: Send + Sync {
    /// Identity used as the consumer key (protocol name, recorder path, ...)
    fn name(&self) -> &str;

    /// Announce the track set; called once, before any frame delivery
    fn on_tracks(&mut self, tracks: &[TrackInfo]);

    /// Accept one merged frame
    fn input_frame(&mut self, frame: &MediaFrame) -> Result<(), MuxerError>;

    /// The source reset or closed; flush and drop any pending state
    fn on_reset(&mut self) {}

    /// Readers this consumer represents (viewers on a protocol muxer)
    fn reader_count(&self) -> usize {
        0
    }
}

/// Listener for the one-time all-tracks-ready transition
pub trait TrackListener: Send + Sync {
    fn on_all_track_ready(&self);
}
