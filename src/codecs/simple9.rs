//! Simple-9 codec
//!
//! 32-bit little-endian words: a four-bit selector in the high bits and nine
//! ways of carving the remaining 28 payload bits into equal-width integers.
//! Values must fit in 28 bits; wider input makes `encode` fail.

use super::{Codec, DeltaMode};

pub struct Simple9;

/// (integers per word, bits per integer)
pub(crate) const TABLE: [(usize, u32); 9] = [
    (28, 1),
    (14, 2),
    (9, 3),
    (7, 4),
    (5, 5),
    (4, 7),
    (3, 9),
    (2, 14),
    (1, 28),
];

impl Codec for Simple9 {
    fn name(&self) -> &'static str {
        "simple9"
    }

    fn encode(&self, src: &[u32], dst: &mut [u8]) -> Option<usize> {
        let mut at = 0;
        let mut out = 0;
        while at < src.len() {
            let remaining = &src[at..];
            let (row, ints, bits) = TABLE.iter().enumerate().find_map(|(row, &(ints, bits))| {
                (ints <= remaining.len()
                    && remaining[..ints].iter().all(|&v| v < (1u32 << bits)))
                .then_some((row, ints, bits))
            })?;

            if out + 4 > dst.len() {
                return None;
            }
            let mut word = (row as u32) << 28;
            for (i, &value) in remaining[..ints].iter().enumerate() {
                word |= value << (i as u32 * bits);
            }
            dst[out..out + 4].copy_from_slice(&word.to_le_bytes());
            out += 4;
            at += ints;
        }
        Some(out)
    }

    fn decode(&self, src: &[u8], n: usize, dst: &mut [u32]) {
        let mut produced = 0;
        for chunk in src.chunks_exact(4) {
            if produced == n {
                break;
            }
            let word = u32::from_le_bytes(chunk.try_into().unwrap());
            let (ints, bits) = TABLE[(word >> 28) as usize];
            let mask = (1u32 << bits) - 1;
            for i in 0..ints {
                if produced == n {
                    break;
                }
                dst[produced] = (word >> (i as u32 * bits)) & mask;
                produced += 1;
            }
        }
        debug_assert_eq!(produced, n, "simple9 payload shorter than its count");
    }

    fn min_bytes(&self, n: usize) -> usize {
        4 * n.div_ceil(28)
    }

    fn alignment(&self) -> usize {
        4
    }

    fn deltas(&self) -> DeltaMode {
        DeltaMode::D1
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{fixture, round_trip};
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fixture_round_trip() {
        round_trip(&Simple9, &fixture());
    }

    #[test]
    fn rejects_values_wider_than_28_bits() {
        let mut buf = [0u8; 64];
        assert_eq!(Simple9.encode(&[1 << 28], &mut buf), None);
        assert!(Simple9.encode(&[(1 << 28) - 1], &mut buf).is_some());
    }

    #[test]
    fn single_word_of_ones() {
        let ones = vec![1u32; 28];
        let mut buf = [0u8; 8];
        assert_eq!(Simple9.encode(&ones, &mut buf), Some(4));
    }

    proptest! {
        #[test]
        fn any_sequence_round_trips(values in proptest::collection::vec(0u32..(1 << 28), 0..400)) {
            round_trip(&Simple9, &values);
        }
    }
}
