//! Recorder lifecycle types
//!
//! Concrete MP4/HLS recorders are external collaborators implementing
//! [`FrameSink`](crate::muxer::FrameSink); the orchestrator creates them
//! through a registered factory and manages start/stop, catch-up seeding
//! and auto-stop timers.

use std::path::PathBuf;
use std::time::Duration;

use crate::muxer::error::MuxerError;
use crate::muxer::sink::FrameSink;

/// Kind of recorder sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecorderKind {
    /// Single-file MP4 recording
    Mp4,
    /// HLS segment recording
    Hls,
}

impl RecorderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderKind::Mp4 => "mp4",
            RecorderKind::Hls => "hls",
        }
    }
}

impl std::fmt::Display for RecorderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters handed to the recorder factory
#[derive(Debug, Clone)]
pub struct RecordParams {
    /// Output path (file for MP4, directory for HLS)
    pub path: PathBuf,
    /// Stop automatically after this long
    pub max_duration: Option<Duration>,
}

/// Creates recorder sinks on demand
pub type RecorderFactory =
    Box<dyn Fn(RecorderKind, &RecordParams) -> Result<Box<dyn FrameSink>, MuxerError> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        assert_eq!(RecorderKind::Mp4.as_str(), "mp4");
        assert_eq!(RecorderKind::Hls.as_str(), "hls");
        assert_eq!(RecorderKind::Mp4.to_string(), "mp4");
    }
}
