//! Integer codec trait and implementations

mod elias_delta;
mod elias_gamma;
mod qmx;
mod relative10;
mod simple16;
mod simple8b;
mod simple9;
mod uncompressed;
pub mod variable_byte;

pub use elias_delta::EliasDeltaSimd;
pub use elias_gamma::{EliasGammaSimd, EliasGammaSimdVb};
pub use qmx::Qmx;
pub use relative10::Relative10;
pub use simple16::Simple16;
pub use simple8b::Simple8b;
pub use simple9::Simple9;
pub use uncompressed::Uncompressed;
pub use variable_byte::VariableByte;

/// What the decoded buffer contains, and therefore what the traversal must do
/// to recover absolute document ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaMode {
    /// Absolute values; no prefix sum.
    D0,
    /// Per-gap deltas; prefix-sum the decoded buffer.
    D1,
    /// Four-lane deltas, resolved inside the codec; no prefix sum.
    D4,
}

/// A pair of pure functions over runs of 32-bit non-negative integers.
///
/// `decode` writes exactly `n` integers, though block codecs may scribble
/// past `n` up to one block; decode buffers must carry [`DECODE_SLACK`]
/// spare slots.
pub trait Codec: Send + Sync {
    /// Codec name as printed in logs and stats.
    fn name(&self) -> &'static str;

    /// Encode `src` into `dst`, returning the number of bytes written, or
    /// `None` if `dst` is too small.
    fn encode(&self, src: &[u32], dst: &mut [u8]) -> Option<usize>;

    /// Decode exactly `n` integers from `src` into `dst`. The caller must
    /// have checked `src` against [`Codec::min_bytes`]; decode itself does
    /// not validate.
    fn decode(&self, src: &[u8], n: usize, dst: &mut [u32]);

    /// The smallest number of encoded bytes `n` integers can possibly
    /// occupy. A payload shorter than this is corrupt, and the loader
    /// rejects it before decode ever runs.
    fn min_bytes(&self, n: usize) -> usize;

    /// Required byte alignment of an encoded payload's first byte.
    fn alignment(&self) -> usize {
        1
    }

    /// Delta form of the decoded buffer.
    fn deltas(&self) -> DeltaMode {
        DeltaMode::D1
    }
}

/// Spare u32 slots a decode buffer must carry beyond the integer count,
/// because block codecs emit whole blocks.
pub const DECODE_SLACK: usize = 1024;

/// Available codecs, keyed by the one-byte tag stored at offset 0 of
/// `CIpostings.bin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    Uncompressed,
    VariableByte,
    Simple8b,
    Simple9,
    Simple16,
    Relative10,
    Qmx,
    QmxD4,
    QmxD0,
    EliasGammaSimd,
    EliasGammaSimdVb,
    EliasDeltaSimd,
}

impl CodecId {
    /// Parse the tag byte at the head of the postings file.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b's' => Some(Self::Uncompressed),
            b'c' => Some(Self::VariableByte),
            b'8' => Some(Self::Simple8b),
            b'9' => Some(Self::Simple9),
            b'6' => Some(Self::Simple16),
            b'r' => Some(Self::Relative10),
            b'q' => Some(Self::Qmx),
            b'Q' => Some(Self::QmxD4),
            b'R' => Some(Self::QmxD0),
            b'G' => Some(Self::EliasGammaSimd),
            b'g' => Some(Self::EliasGammaSimdVb),
            b'D' => Some(Self::EliasDeltaSimd),
            _ => None,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Self::Uncompressed => b's',
            Self::VariableByte => b'c',
            Self::Simple8b => b'8',
            Self::Simple9 => b'9',
            Self::Simple16 => b'6',
            Self::Relative10 => b'r',
            Self::Qmx => b'q',
            Self::QmxD4 => b'Q',
            Self::QmxD0 => b'R',
            Self::EliasGammaSimd => b'G',
            Self::EliasGammaSimdVb => b'g',
            Self::EliasDeltaSimd => b'D',
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "none" | "uncompressed" => Some(Self::Uncompressed),
            "vbyte" | "variable-byte" | "variable_byte" => Some(Self::VariableByte),
            "simple8b" | "simple-8b" => Some(Self::Simple8b),
            "simple9" | "simple-9" => Some(Self::Simple9),
            "simple16" | "simple-16" => Some(Self::Simple16),
            "relative10" | "relative-10" => Some(Self::Relative10),
            "qmx" => Some(Self::Qmx),
            "qmx-d4" => Some(Self::QmxD4),
            "qmx-d0" => Some(Self::QmxD0),
            "elias-gamma-simd" => Some(Self::EliasGammaSimd),
            "elias-gamma-simd-vb" => Some(Self::EliasGammaSimdVb),
            "elias-delta-simd" => Some(Self::EliasDeltaSimd),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uncompressed => "uncompressed",
            Self::VariableByte => "vbyte",
            Self::Simple8b => "simple8b",
            Self::Simple9 => "simple9",
            Self::Simple16 => "simple16",
            Self::Relative10 => "relative10",
            Self::Qmx => "qmx",
            Self::QmxD4 => "qmx-d4",
            Self::QmxD0 => "qmx-d0",
            Self::EliasGammaSimd => "elias-gamma-simd",
            Self::EliasGammaSimdVb => "elias-gamma-simd-vb",
            Self::EliasDeltaSimd => "elias-delta-simd",
        }
    }

    /// List every codec the crate ships.
    pub fn all() -> &'static [CodecId] {
        &[
            Self::Uncompressed,
            Self::VariableByte,
            Self::Simple8b,
            Self::Simple9,
            Self::Simple16,
            Self::Relative10,
            Self::Qmx,
            Self::QmxD4,
            Self::QmxD0,
            Self::EliasGammaSimd,
            Self::EliasGammaSimdVb,
            Self::EliasDeltaSimd,
        ]
    }
}

/// Create a codec by id.
pub fn create_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::Uncompressed => Box::new(Uncompressed),
        CodecId::VariableByte => Box::new(VariableByte),
        CodecId::Simple8b => Box::new(Simple8b),
        CodecId::Simple9 => Box::new(Simple9),
        CodecId::Simple16 => Box::new(Simple16),
        CodecId::Relative10 => Box::new(Relative10),
        CodecId::Qmx => Box::new(Qmx::d1()),
        CodecId::QmxD4 => Box::new(Qmx::d4()),
        CodecId::QmxD0 => Box::new(Qmx::d0()),
        CodecId::EliasGammaSimd => Box::new(EliasGammaSimd),
        CodecId::EliasGammaSimdVb => Box::new(EliasGammaSimdVb),
        CodecId::EliasDeltaSimd => Box::new(EliasDeltaSimd),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trip() {
        for &id in CodecId::all() {
            assert_eq!(CodecId::from_tag(id.tag()), Some(id));
            assert_eq!(CodecId::from_name(id.as_str()), Some(id));
        }
    }

    #[test]
    fn unknown_tag_rejected() {
        assert_eq!(CodecId::from_tag(b'z'), None);
        assert_eq!(CodecId::from_tag(0), None);
    }

    #[test]
    fn every_codec_round_trips_the_fixture() {
        for &id in CodecId::all() {
            let codec = create_codec(id);
            testing::round_trip(codec.as_ref(), &testing::fixture());
        }
    }
}
