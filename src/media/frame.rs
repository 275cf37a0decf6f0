//! Media frame types
//!
//! A [`MediaFrame`] is one encoded access unit or fragment as delivered by
//! the ingest layer. Frames are immutable once constructed and cheap to
//! clone: the payload is a reference-counted `Bytes`, so every holder
//! (merger cache, GOP ring slot, consumer) shares one allocation and the
//! payload outlives the producer's buffer.

use bytes::Bytes;

use crate::media::{h264, h265};

/// Codec identifier for an elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// AAC
    Aac,
    /// Opus
    Opus,
    /// MP3
    Mp3,
    /// G.711 A-law
    G711A,
    /// G.711 mu-law
    G711U,
}

impl CodecId {
    /// Track type this codec belongs to
    pub fn track_type(&self) -> TrackType {
        match self {
            CodecId::H264 | CodecId::H265 => TrackType::Video,
            CodecId::Aac | CodecId::Opus | CodecId::Mp3 | CodecId::G711A | CodecId::G711U => {
                TrackType::Audio
            }
        }
    }

    /// Whether frames of this codec may arrive fragmented and need
    /// access-unit reassembly before fan-out
    pub fn needs_merge(&self) -> bool {
        matches!(self, CodecId::H264 | CodecId::H265)
    }

    /// Canonical codec name
    pub fn name(&self) -> &'static str {
        match self {
            CodecId::H264 => "H264",
            CodecId::H265 => "H265",
            CodecId::Aac => "mpeg4-generic",
            CodecId::Opus => "opus",
            CodecId::Mp3 => "mp3",
            CodecId::G711A => "PCMA",
            CodecId::G711U => "PCMU",
        }
    }

    /// Look up a codec by its canonical name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        const ALL: [CodecId; 7] = [
            CodecId::H264,
            CodecId::H265,
            CodecId::Aac,
            CodecId::Opus,
            CodecId::Mp3,
            CodecId::G711A,
            CodecId::G711U,
        ];
        ALL.iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Elementary stream track type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    /// Video track
    Video,
    /// Audio track
    Audio,
    /// Application data track
    Application,
}

impl TrackType {
    /// String form used in logs and lookups
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackType::Video => "video",
            TrackType::Audio => "audio",
            TrackType::Application => "application",
        }
    }

    /// Parse from the string form (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "video" => Some(TrackType::Video),
            "audio" => Some(TrackType::Audio),
            "application" => Some(TrackType::Application),
            _ => None,
        }
    }
}

impl std::fmt::Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification flags derived from a frame's first NAL unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    /// Key frame (IDR/CRA/BLA)
    pub keyframe: bool,
    /// Decoder configuration (parameter sets)
    pub config_frame: bool,
    /// Discardable without breaking later frames (SEI, AUD, filler)
    pub drop_able: bool,
    /// Carries picture data a decoder can consume
    pub decode_able: bool,
}

/// One encoded access unit or fragment
#[derive(Debug, Clone)]
pub struct MediaFrame {
    codec: CodecId,
    dts: i64,
    pts: i64,
    data: Bytes,
    prefix_size: usize,
    flags: FrameFlags,
}

impl MediaFrame {
    /// Create a frame with neutral flags and no embedded prefix
    pub fn new(codec: CodecId, dts: i64, pts: i64, data: Bytes) -> Self {
        Self {
            codec,
            dts,
            pts,
            data,
            prefix_size: 0,
            flags: FrameFlags {
                decode_able: true,
                ..FrameFlags::default()
            },
        }
    }

    /// Create an H.264 frame, scanning the Annex-B prefix and classifying
    /// the first NAL unit to derive flags
    pub fn h264(dts: i64, pts: i64, data: Bytes) -> Self {
        let prefix_size = h264::annexb_prefix_size(&data);
        let flags = data
            .get(prefix_size)
            .map(|b| h264::classify(*b))
            .unwrap_or_default();
        Self {
            codec: CodecId::H264,
            dts,
            pts,
            data,
            prefix_size,
            flags,
        }
    }

    /// Create an H.265 frame, scanning the Annex-B prefix and classifying
    /// the first NAL unit to derive flags
    pub fn h265(dts: i64, pts: i64, data: Bytes) -> Self {
        let prefix_size = h264::annexb_prefix_size(&data);
        let flags = data
            .get(prefix_size)
            .map(|b| h265::classify(*b))
            .unwrap_or_default();
        Self {
            codec: CodecId::H265,
            dts,
            pts,
            data,
            prefix_size,
            flags,
        }
    }

    /// Create an audio frame (pts equals dts, always decode-able)
    pub fn audio(codec: CodecId, dts: i64, data: Bytes) -> Self {
        Self {
            codec,
            dts,
            pts: dts,
            data,
            prefix_size: 0,
            flags: FrameFlags {
                decode_able: true,
                ..FrameFlags::default()
            },
        }
    }

    /// Create a frame with explicit flags and prefix size
    pub fn with_flags(
        codec: CodecId,
        dts: i64,
        pts: i64,
        data: Bytes,
        prefix_size: usize,
        flags: FrameFlags,
    ) -> Self {
        Self {
            codec,
            dts,
            pts,
            data,
            prefix_size,
            flags,
        }
    }

    /// Copy of this frame carrying rewritten timestamps; the payload is
    /// shared, not duplicated
    pub fn restamped(&self, dts: i64, pts: i64) -> Self {
        Self {
            dts,
            pts,
            ..self.clone()
        }
    }

    /// Codec identifier
    pub fn codec(&self) -> CodecId {
        self.codec
    }

    /// Track type of the owning track
    pub fn track_type(&self) -> TrackType {
        self.codec.track_type()
    }

    /// Decode timestamp in milliseconds
    pub fn dts(&self) -> i64 {
        self.dts
    }

    /// Presentation timestamp in milliseconds
    pub fn pts(&self) -> i64 {
        self.pts
    }

    /// Payload bytes, including any embedded start-code prefix
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Size of the embedded start-code prefix (0 if none)
    pub fn prefix_size(&self) -> usize {
        self.prefix_size
    }

    /// Whether this is a key frame
    pub fn keyframe(&self) -> bool {
        self.flags.keyframe
    }

    /// Whether this frame carries decoder configuration (parameter sets)
    pub fn config_frame(&self) -> bool {
        self.flags.config_frame
    }

    /// Whether this frame can be discarded without breaking decode
    pub fn drop_able(&self) -> bool {
        self.flags.drop_able
    }

    /// Whether this frame carries decodable picture data
    pub fn decode_able(&self) -> bool {
        self.flags.decode_able
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_track_types() {
        assert_eq!(CodecId::H264.track_type(), TrackType::Video);
        assert_eq!(CodecId::H265.track_type(), TrackType::Video);
        assert_eq!(CodecId::Aac.track_type(), TrackType::Audio);
        assert_eq!(CodecId::Opus.track_type(), TrackType::Audio);
    }

    #[test]
    fn test_codec_needs_merge() {
        assert!(CodecId::H264.needs_merge());
        assert!(CodecId::H265.needs_merge());
        assert!(!CodecId::Aac.needs_merge());
        assert!(!CodecId::G711A.needs_merge());
    }

    #[test]
    fn test_codec_name_roundtrip() {
        for codec in [CodecId::H264, CodecId::H265, CodecId::Aac, CodecId::Opus] {
            assert_eq!(CodecId::from_name(codec.name()), Some(codec));
        }
        assert_eq!(CodecId::from_name("h264"), Some(CodecId::H264));
        assert_eq!(CodecId::from_name("nope"), None);
    }

    #[test]
    fn test_track_type_strings() {
        assert_eq!(TrackType::Video.as_str(), "video");
        assert_eq!(TrackType::from_name("AUDIO"), Some(TrackType::Audio));
        assert_eq!(TrackType::from_name("data"), None);
    }

    #[test]
    fn test_h264_frame_idr() {
        // 4-byte start code + IDR NAL
        let data = Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84]);
        let frame = MediaFrame::h264(1000, 1000, data);

        assert_eq!(frame.prefix_size(), 4);
        assert!(frame.keyframe());
        assert!(frame.decode_able());
        assert!(!frame.config_frame());
        assert!(!frame.drop_able());
    }

    #[test]
    fn test_h264_frame_sps() {
        // 3-byte start code + SPS NAL
        let data = Bytes::from_static(&[0x00, 0x00, 0x01, 0x67, 0x64, 0x00, 0x1F]);
        let frame = MediaFrame::h264(0, 0, data);

        assert_eq!(frame.prefix_size(), 3);
        assert!(frame.config_frame());
        assert!(!frame.keyframe());
        assert!(!frame.decode_able());
    }

    #[test]
    fn test_h264_frame_no_prefix() {
        // Bare SEI NAL, no start code
        let data = Bytes::from_static(&[0x06, 0x05, 0x0A]);
        let frame = MediaFrame::h264(0, 0, data);

        assert_eq!(frame.prefix_size(), 0);
        assert!(frame.drop_able());
        assert!(!frame.decode_able());
    }

    #[test]
    fn test_h265_frame_idr() {
        // 4-byte start code + IDR_W_RADL (type 19, first byte 19 << 1 = 0x26)
        let data = Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x26, 0x01]);
        let frame = MediaFrame::h265(0, 0, data);

        assert!(frame.keyframe());
        assert!(frame.decode_able());
    }

    #[test]
    fn test_audio_frame() {
        let frame = MediaFrame::audio(CodecId::Aac, 500, Bytes::from_static(&[0xFF, 0xF1]));

        assert_eq!(frame.dts(), 500);
        assert_eq!(frame.pts(), 500);
        assert!(frame.decode_able());
        assert!(!frame.keyframe());
        assert_eq!(frame.track_type(), TrackType::Audio);
    }

    #[test]
    fn test_frame_clone_shares_payload() {
        let data = Bytes::from(vec![1u8; 1024]);
        let frame = MediaFrame::new(CodecId::Aac, 0, 0, data);
        let clone = frame.clone();

        // Same allocation, not a copy
        assert_eq!(clone.data().as_ptr(), frame.data().as_ptr());
    }
}
