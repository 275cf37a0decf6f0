//! H.264/AVC NAL unit classification
//!
//! The ingest layer delivers H.264 as Annex-B byte streams: NAL units
//! prefixed with a 3- or 4-byte start code (`00 00 01` / `00 00 00 01`).
//! The merger and frame constructors only need to know where the prefix
//! ends and what kind of unit follows; full bitstream parsing is left to
//! downstream muxers.

use crate::media::frame::FrameFlags;

/// NAL unit type (H.264, `nal_unit_type` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// Slice data partition A
    SlicePartA = 2,
    /// Slice data partition B
    SlicePartB = 3,
    /// Slice data partition C
    SlicePartC = 4,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    /// End of sequence
    EndSeq = 10,
    /// End of stream
    EndStream = 11,
    /// Filler data
    Filler = 12,
}

impl NaluType {
    /// Extract the NAL type from the first header byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            2 => Some(NaluType::SlicePartA),
            3 => Some(NaluType::SlicePartB),
            4 => Some(NaluType::SlicePartC),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            10 => Some(NaluType::EndSeq),
            11 => Some(NaluType::EndStream),
            12 => Some(NaluType::Filler),
            _ => None,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, NaluType::Idr)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Sps | NaluType::Pps)
    }

    /// Discardable units: dropping them never breaks later decode
    pub fn is_droppable(&self) -> bool {
        matches!(self, NaluType::Sei | NaluType::Aud | NaluType::Filler)
    }

    /// Units carrying picture data a decoder consumes
    pub fn is_decodable(&self) -> bool {
        matches!(
            self,
            NaluType::Slice
                | NaluType::SlicePartA
                | NaluType::SlicePartB
                | NaluType::SlicePartC
                | NaluType::Idr
        )
    }
}

/// Classify the first NAL header byte into frame flags
pub fn classify(first_byte: u8) -> FrameFlags {
    match NaluType::from_byte(first_byte) {
        Some(t) => FrameFlags {
            keyframe: t.is_keyframe(),
            config_frame: t.is_parameter_set(),
            drop_able: t.is_droppable(),
            decode_able: t.is_decodable(),
        },
        None => FrameFlags::default(),
    }
}

/// Length of the Annex-B start code at the head of `data` (0, 3 or 4)
pub fn annexb_prefix_size(data: &[u8]) -> usize {
    if data.len() >= 4 && data[0] == 0 && data[1] == 0 && data[2] == 0 && data[3] == 1 {
        4
    } else if data.len() >= 3 && data[0] == 0 && data[1] == 0 && data[2] == 1 {
        3
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nalu_type() {
        assert_eq!(NaluType::from_byte(0x65), Some(NaluType::Idr));
        assert_eq!(NaluType::from_byte(0x67), Some(NaluType::Sps));
        assert_eq!(NaluType::from_byte(0x68), Some(NaluType::Pps));
        assert_eq!(NaluType::from_byte(0x41), Some(NaluType::Slice));
        assert_eq!(NaluType::from_byte(0x1F), None);
    }

    #[test]
    fn test_nalu_type_flags() {
        assert!(NaluType::Idr.is_keyframe());
        assert!(NaluType::Idr.is_decodable());
        assert!(!NaluType::Slice.is_keyframe());
        assert!(NaluType::Slice.is_decodable());
        assert!(NaluType::Sps.is_parameter_set());
        assert!(!NaluType::Sps.is_decodable());
        assert!(NaluType::Sei.is_droppable());
        assert!(NaluType::Aud.is_droppable());
    }

    #[test]
    fn test_classify() {
        let idr = classify(0x65);
        assert!(idr.keyframe && idr.decode_able && !idr.config_frame && !idr.drop_able);

        let sps = classify(0x67);
        assert!(sps.config_frame && !sps.decode_able);

        let sei = classify(0x06);
        assert!(sei.drop_able && !sei.decode_able);
    }

    #[test]
    fn test_annexb_prefix_size() {
        assert_eq!(annexb_prefix_size(&[0, 0, 0, 1, 0x65]), 4);
        assert_eq!(annexb_prefix_size(&[0, 0, 1, 0x65]), 3);
        assert_eq!(annexb_prefix_size(&[0x65, 0x88]), 0);
        assert_eq!(annexb_prefix_size(&[0, 0]), 0);
        assert_eq!(annexb_prefix_size(&[]), 0);
    }
}
