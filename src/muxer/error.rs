//! Muxer control-surface error types
//!
//! These errors resolve through return values and completion callbacks,
//! never through the hot frame path. They are `Clone` because the same type
//! doubles as the detach reason handed to the RTP-push detach listener.

use std::fmt;

/// Error type for fan-out control operations and consumer detach reasons
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxerError {
    /// Operation requires the all-tracks-ready transition first
    NotReady,
    /// The muxer has been closed
    Closed,
    /// An RTP push with this SSRC is already active
    DuplicateSsrc(String),
    /// SSRC string could not be parsed
    InvalidSsrc(String),
    /// No recorder factory registered
    NoRecorderFactory,
    /// Recorder could not be created
    RecorderFailed(String),
    /// Local socket could not be bound
    Bind(String),
    /// Remote endpoint could not be reached
    Connect(String),
    /// Sending on an established session failed
    SendFailed(String),
    /// Reader fell too far behind the writer
    Lagged,
    /// Session classified as timed out
    Timeout,
    /// Consumer refused a frame
    SinkRejected(String),
}

impl fmt::Display for MuxerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxerError::NotReady => write!(f, "Not all tracks are ready"),
            MuxerError::Closed => write!(f, "Muxer is closed"),
            MuxerError::DuplicateSsrc(ssrc) => write!(f, "RTP push already active: {}", ssrc),
            MuxerError::InvalidSsrc(ssrc) => write!(f, "Invalid SSRC: {}", ssrc),
            MuxerError::NoRecorderFactory => write!(f, "No recorder factory registered"),
            MuxerError::RecorderFailed(msg) => write!(f, "Recorder failed: {}", msg),
            MuxerError::Bind(msg) => write!(f, "Bind failed: {}", msg),
            MuxerError::Connect(msg) => write!(f, "Connect failed: {}", msg),
            MuxerError::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            MuxerError::Lagged => write!(f, "Reader lagged behind the stream"),
            MuxerError::Timeout => write!(f, "Session timed out"),
            MuxerError::SinkRejected(msg) => write!(f, "Sink rejected frame: {}", msg),
        }
    }
}

impl std::error::Error for MuxerError {}
