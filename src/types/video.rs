//! Reassembled video access units and NAL inspection.

use std::sync::Arc;

/// 4-byte Annex-B start code.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// H.264 NAL unit type, taken from the low five bits of the NAL header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture.
    Slice,
    /// Coded slice of an IDR picture (a key frame).
    IdrSlice,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    Other(u8),
}

impl NalUnitType {
    /// Classify a NAL header byte.
    pub fn from_header(header: u8) -> Self {
        match header & 0x1f {
            1 => NalUnitType::Slice,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::AccessUnitDelimiter,
            other => NalUnitType::Other(other),
        }
    }
}

/// One reassembled group of video fragments.
///
/// The bytes are the exact concatenation of the fragments buffered up to a
/// group boundary. Nothing guarantees the result is a syntactically valid
/// access unit; decoders must tolerate the occasional malformed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Frame bytes (shared, never copied after emission)
    pub data: Arc<[u8]>,

    /// Number of frames emitted before this one
    pub sequence: u64,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, sequence: u64) -> Self {
        Self { data: data.into(), sequence }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// NAL unit types found after each 3- or 4-byte start code, in order.
    pub fn nal_units(&self) -> impl Iterator<Item = NalUnitType> + '_ {
        let data = &self.data[..];
        let mut pos = 0;
        std::iter::from_fn(move || {
            while pos + 3 < data.len() {
                let at = pos;
                pos += 1;
                if data[at] == 0 && data[at + 1] == 0 && data[at + 2] == 1 {
                    pos = at + 4;
                    return Some(NalUnitType::from_header(data[at + 3]));
                }
            }
            None
        })
    }

    /// Whether the frame carries an IDR slice or a sequence parameter set.
    pub fn is_key_frame(&self) -> bool {
        self.nal_units().any(|nal| matches!(nal, NalUnitType::IdrSlice | NalUnitType::Sps))
    }
}

/// Position of the first occurrence of `marker` in `haystack`.
pub(crate) fn find_marker(haystack: &[u8], marker: &[u8]) -> Option<usize> {
    if marker.is_empty() || haystack.len() < marker.len() {
        return None;
    }
    haystack.windows(marker.len()).position(|window| window == marker)
}
