//! H.265/HEVC NAL unit classification
//!
//! HEVC carries the NAL type in bits 1..6 of the first header byte. Only
//! the classes the fan-out core cares about are distinguished; everything
//! else maps to [`NaluType::Other`].

use crate::media::frame::FrameFlags;

/// Coarse NAL unit class (H.265, `nal_unit_type` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IRAP slice segment (types 0..=15)
    Slice,
    /// BLA slice (types 16..=18)
    Bla,
    /// IDR slice (types 19..=20)
    Idr,
    /// CRA slice (type 21)
    Cra,
    /// Video parameter set (type 32)
    Vps,
    /// Sequence parameter set (type 33)
    Sps,
    /// Picture parameter set (type 34)
    Pps,
    /// Access unit delimiter (type 35)
    Aud,
    /// Prefix or suffix SEI (types 39..=40)
    Sei,
    /// Any other type
    Other,
}

impl NaluType {
    /// Extract the NAL class from the first header byte
    pub fn from_byte(b: u8) -> Self {
        match (b >> 1) & 0x3F {
            0..=15 => NaluType::Slice,
            16..=18 => NaluType::Bla,
            19 | 20 => NaluType::Idr,
            21 => NaluType::Cra,
            32 => NaluType::Vps,
            33 => NaluType::Sps,
            34 => NaluType::Pps,
            35 => NaluType::Aud,
            39 | 40 => NaluType::Sei,
            _ => NaluType::Other,
        }
    }

    /// IRAP pictures a decoder can start from
    pub fn is_keyframe(&self) -> bool {
        matches!(self, NaluType::Idr | NaluType::Bla | NaluType::Cra)
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NaluType::Vps | NaluType::Sps | NaluType::Pps)
    }

    pub fn is_droppable(&self) -> bool {
        matches!(self, NaluType::Sei | NaluType::Aud)
    }

    pub fn is_decodable(&self) -> bool {
        matches!(
            self,
            NaluType::Slice | NaluType::Bla | NaluType::Idr | NaluType::Cra
        )
    }
}

/// Classify the first NAL header byte into frame flags
pub fn classify(first_byte: u8) -> FrameFlags {
    let t = NaluType::from_byte(first_byte);
    FrameFlags {
        keyframe: t.is_keyframe(),
        config_frame: t.is_parameter_set(),
        drop_able: t.is_droppable(),
        decode_able: t.is_decodable(),
    }
}
