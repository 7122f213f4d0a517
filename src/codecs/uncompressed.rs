//! No-op codec: raw little-endian u32s, absolute document ids

use super::{Codec, DeltaMode};

pub struct Uncompressed;

impl Codec for Uncompressed {
    fn name(&self) -> &'static str {
        "uncompressed"
    }

    fn encode(&self, src: &[u32], dst: &mut [u8]) -> Option<usize> {
        let needed = src.len() * 4;
        if needed > dst.len() {
            return None;
        }
        for (i, &value) in src.iter().enumerate() {
            dst[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
        Some(needed)
    }

    fn decode(&self, src: &[u8], n: usize, dst: &mut [u32]) {
        for (i, slot) in dst.iter_mut().enumerate().take(n) {
            let at = i * 4;
            *slot = u32::from_le_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]]);
        }
    }

    fn min_bytes(&self, n: usize) -> usize {
        4 * n
    }

    fn alignment(&self) -> usize {
        4
    }

    fn deltas(&self) -> DeltaMode {
        DeltaMode::D0
    }
}
