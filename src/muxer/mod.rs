//! Track-synchronized multi-protocol fan-out
//!
//! One [`MediaMuxer`] per live source routes every incoming frame through
//! timestamp normalization, access-unit reassembly and the GOP ring to a
//! runtime-mutable set of consumers.
//!
//! # Architecture
//!
//! ```text
//!                    Arc<MediaMuxer>
//!        ┌──────────────────────────────────────┐
//!        │ per track: Stamp ─► FrameMerger      │
//!        │ TrackBarrier (gates delivery)        │
//!        │ GopRing (backlog + broadcast)        │
//!        │ sinks / recorders / rtp_senders      │
//!        └──────┬──────────┬──────────┬─────────┘
//!               │          │          │
//!               ▼          ▼          ▼
//!        [protocol sink] [recorder] [RTP push task]
//!         input_frame()  input_frame()  ring reader
//! ```
//!
//! Frame payloads are `bytes::Bytes`: the ring, every sink and every push
//! session share one allocation per unit, so fan-out cost is reference
//! counting, not copying.

pub mod barrier;
pub mod config;
pub mod error;
pub mod fanout;
pub mod recorder;
pub mod rtp;
pub mod sink;

pub use barrier::TrackBarrier;
pub use config::MuxerConfig;
pub use error::MuxerError;
pub use fanout::MediaMuxer;
pub use recorder::{RecordParams, RecorderFactory, RecorderKind};
pub use rtp::SendRtpArgs;
pub use sink::{FrameSink, TrackInfo, TrackListener};
