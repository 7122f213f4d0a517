//! Simple-8b codec
//!
//! 64-bit little-endian words. The low four bits select one of sixteen
//! packings of the remaining 60 payload bits; the first two selectors encode
//! long runs of the value one with no payload at all, which is exactly the
//! shape of dense docid gap lists.

use super::{Codec, DeltaMode};

pub struct Simple8b;

/// (integers per word, bits per integer). Selectors 0 and 1 pack implicit
/// ones; their bit width is zero.
const TABLE: [(usize, u32); 16] = [
    (240, 0),
    (120, 0),
    (60, 1),
    (30, 2),
    (20, 3),
    (15, 4),
    (12, 5),
    (10, 6),
    (8, 7),
    (7, 8),
    (6, 10),
    (5, 12),
    (4, 15),
    (3, 20),
    (2, 30),
    (1, 60),
];

#[inline]
fn fits(values: &[u32], selector: usize, bits: u32) -> bool {
    if selector < 2 {
        values.iter().all(|&v| v == 1)
    } else {
        values.iter().all(|&v| (v as u64) < (1u64 << bits))
    }
}

impl Codec for Simple8b {
    fn name(&self) -> &'static str {
        "simple8b"
    }

    fn encode(&self, src: &[u32], dst: &mut [u8]) -> Option<usize> {
        let mut at = 0;
        let mut out = 0;
        while at < src.len() {
            let remaining = &src[at..];
            // The table is ordered by decreasing capacity, so the first full
            // packing that fits is the densest.
            let (selector, ints, bits) = TABLE
                .iter()
                .enumerate()
                .find_map(|(selector, &(ints, bits))| {
                    (ints <= remaining.len() && fits(&remaining[..ints], selector, bits))
                        .then_some((selector, ints, bits))
                })?;

            if out + 8 > dst.len() {
                return None;
            }
            let mut word = selector as u64;
            if selector >= 2 {
                for (i, &value) in remaining[..ints].iter().enumerate() {
                    word |= (value as u64) << (4 + i as u32 * bits);
                }
            }
            dst[out..out + 8].copy_from_slice(&word.to_le_bytes());
            out += 8;
            at += ints;
        }
        Some(out)
    }

    fn decode(&self, src: &[u8], n: usize, dst: &mut [u32]) {
        let mut produced = 0;
        for chunk in src.chunks_exact(8) {
            if produced == n {
                break;
            }
            let word = u64::from_le_bytes(chunk.try_into().unwrap());
            let (ints, bits) = TABLE[(word & 0xF) as usize];
            let payload = word >> 4;
            if bits == 0 {
                for _ in 0..ints {
                    if produced == n {
                        break;
                    }
                    dst[produced] = 1;
                    produced += 1;
                }
            } else {
                let mask = (1u64 << bits) - 1;
                for i in 0..ints {
                    if produced == n {
                        break;
                    }
                    dst[produced] = ((payload >> (i as u32 * bits)) & mask) as u32;
                    produced += 1;
                }
            }
        }
        debug_assert_eq!(produced, n, "simple8b payload shorter than its count");
    }

    fn min_bytes(&self, n: usize) -> usize {
        // Selector 0 packs the most: 240 implicit ones per word.
        8 * n.div_ceil(240)
    }

    fn alignment(&self) -> usize {
        8
    }

    fn deltas(&self) -> DeltaMode {
        DeltaMode::D1
    }
}
