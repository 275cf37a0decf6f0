//! Statistics for fan-out instances

pub mod metrics;

pub use metrics::MuxerStats;
