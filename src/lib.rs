//! Live media fan-out core
//!
//! This crate is the republishing heart of a streaming media server: it
//! takes encoded access units from one upstream source and fans them out,
//! synchronized and reassembled, to any number of heterogeneous consumers
//! — protocol muxers, file recorders and outbound RTP push sessions — while
//! retaining a short GOP backlog so new viewers start from the last key
//! frame instead of waiting for the next one.
//!
//! The pipeline per source:
//!
//! ```text
//! ingest ─► Stamp ─► FrameMerger ─► TrackBarrier ─► GopRing ─► consumers
//!          (per track clocks)      (all-ready gate)  (backlog + broadcast)
//! ```
//!
//! Network ingest, concrete protocol muxers and playback clients live
//! outside this crate; they connect through [`muxer::FrameSink`] and the
//! [`muxer::MediaMuxer`] control surface.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use livemux_rs::media::{CodecId, MediaFrame, TrackType};
//! use livemux_rs::muxer::{MediaMuxer, MuxerConfig, TrackInfo};
//!
//! #[tokio::main]
//! async fn main() {
//!     let muxer = MediaMuxer::new(MuxerConfig::default());
//!
//!     muxer.add_track(TrackInfo::new(CodecId::H264)).await;
//!     muxer.add_track(TrackInfo::new(CodecId::Aac)).await;
//!     muxer.set_track_ready(TrackType::Video).await;
//!     muxer.set_track_ready(TrackType::Audio).await;
//!
//!     // Frames from the ingest layer flow to every attached consumer
//!     let frame = MediaFrame::h264(0, 0, Bytes::from_static(&[0, 0, 0, 1, 0x65]));
//!     muxer.input_frame(frame).await;
//! }
//! ```

pub mod media;
pub mod muxer;
pub mod stats;

pub use media::{CodecId, FrameMerger, GopRing, MediaFrame, MergeMode, Stamp, StampMode, TrackType};
pub use muxer::{
    FrameSink, MediaMuxer, MuxerConfig, MuxerError, RecorderKind, SendRtpArgs, TrackInfo,
    TrackListener,
};
pub use stats::MuxerStats;
