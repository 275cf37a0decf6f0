//! Media-layer building blocks
//!
//! This module provides:
//! - Frame and codec types shared across the pipeline
//! - H.264/H.265 NAL classification for boundary detection
//! - Timestamp normalization (`Stamp`)
//! - Access-unit reassembly (`FrameMerger`)
//! - The GOP ring buffer backing fan-out and late-joiner catch-up

pub mod frame;
pub mod gop;
pub mod h264;
pub mod h265;
pub mod merger;
pub mod stamp;

pub use frame::{CodecId, FrameFlags, MediaFrame, TrackType};
pub use gop::GopRing;
pub use merger::{FrameMerger, MergeMode, MAX_FRAME_CACHE};
pub use stamp::{Stamp, StampMode};
