//! Relative-10 codec (Anh & Moffat word-aligned relative addressing)
//!
//! The first 32-bit word is plain Simple-9: four selector bits, 28 payload
//! bits. Every later word spends only two selector bits, naming its packing
//! row relative to the previous word's row (one step up, same, one step
//! down, or a reset to the one-integer row), which frees 30 payload bits.

use super::{Codec, DeltaMode};
use super::simple9::TABLE as SIMPLE9_TABLE;

pub struct Relative10;

/// (integers per word, bits per integer) for the 30-bit payload rows.
const R10_TABLE: [(usize, u32); 10] = [
    (1, 30),
    (2, 15),
    (3, 10),
    (4, 7),
    (5, 6),
    (6, 5),
    (7, 4),
    (10, 3),
    (15, 2),
    (30, 1),
];

/// TRANSFER[row][desired_row] is the two-bit selector to emit.
const TRANSFER: [[u8; 10]; 10] = [
    [3, 2, 1, 0, 0, 0, 0, 0, 0, 0],
    [3, 2, 1, 0, 0, 0, 0, 0, 0, 0],
    [3, 2, 1, 0, 0, 0, 0, 0, 0, 0],
    [3, 3, 2, 1, 0, 0, 0, 0, 0, 0],
    [3, 3, 3, 2, 1, 0, 0, 0, 0, 0],
    [3, 3, 3, 3, 2, 1, 0, 0, 0, 0],
    [3, 3, 3, 3, 3, 2, 1, 0, 0, 0],
    [3, 3, 3, 3, 3, 3, 2, 1, 0, 0],
    [3, 3, 3, 3, 3, 3, 3, 2, 1, 0],
    [3, 3, 3, 3, 3, 3, 3, 2, 1, 0],
];

/// DECODE[row][selector] is the next row.
const DECODE: [[u8; 4]; 10] = [
    [3, 2, 1, 0],
    [3, 2, 1, 0],
    [3, 2, 1, 0],
    [4, 3, 2, 0],
    [5, 4, 3, 0],
    [6, 5, 4, 0],
    [7, 6, 5, 0],
    [8, 7, 6, 0],
    [9, 8, 7, 0],
    [9, 8, 7, 0],
];

/// Smallest Simple-9 width that can hold `value`, or `None` above 28 bits.
fn simple9_width(value: u32) -> Option<u32> {
    match 32 - value.leading_zeros() {
        0 | 1 => Some(1),
        2 => Some(2),
        3 => Some(3),
        4 => Some(4),
        5 => Some(5),
        6 | 7 => Some(7),
        8 | 9 => Some(9),
        10..=14 => Some(14),
        15..=28 => Some(28),
        _ => None,
    }
}

/// Smallest Relative-10 width that can hold `value`, or `None` above 30 bits.
fn r10_width(value: u32) -> Option<u32> {
    match 32 - value.leading_zeros() {
        0 | 1 => Some(1),
        2 => Some(2),
        3 => Some(3),
        4 => Some(4),
        5 => Some(5),
        6 => Some(6),
        7 => Some(7),
        8..=10 => Some(10),
        11..=15 => Some(15),
        16..=30 => Some(30),
        _ => None,
    }
}

/// Densest Simple-9 row packing at most `count` integers.
fn simple9_row_for_count(count: usize) -> usize {
    match count {
        28.. => 0,
        14..=27 => 1,
        9..=13 => 2,
        7..=8 => 3,
        5..=6 => 4,
        4 => 5,
        3 => 6,
        2 => 7,
        _ => 8,
    }
}

/// Densest Relative-10 row packing at most `count` integers.
fn r10_row_for_count(count: usize) -> usize {
    match count {
        30.. => 9,
        15..=29 => 8,
        10..=14 => 7,
        7..=9 => 6,
        6 => 5,
        5 => 4,
        4 => 3,
        3 => 2,
        2 => 1,
        _ => 0,
    }
}

/// How many upcoming integers fit one word, given the width function and the
/// payload size.
fn greedy_count(values: &[u32], payload_bits: u32, width: fn(u32) -> Option<u32>) -> Option<usize> {
    let mut needed = 0u32;
    let mut count = 0usize;
    for &value in values.iter().take(payload_bits as usize) {
        needed = needed.max(width(value)?);
        if needed * (count as u32 + 1) > payload_bits {
            break;
        }
        count += 1;
    }
    Some(count.max(1))
}

impl Codec for Relative10 {
    fn name(&self) -> &'static str {
        "relative10"
    }

    fn encode(&self, src: &[u32], dst: &mut [u8]) -> Option<usize> {
        if src.is_empty() {
            return Some(0);
        }

        // First word is absolute Simple-9.
        let count = greedy_count(&src[..src.len().min(28)], 28, simple9_width)?;
        if simple9_width(src[0]).is_none() {
            return None;
        }
        let mut row = simple9_row_for_count(count);
        let (numbers, bits) = SIMPLE9_TABLE[row];
        if dst.len() < 4 {
            return None;
        }
        let mut word = (row as u32) << 28;
        let mut pos = 0;
        for i in 0..numbers.min(src.len()) {
            word |= src[pos] << (i as u32 * bits);
            pos += 1;
        }
        dst[0..4].copy_from_slice(&word.to_le_bytes());
        let mut out = 4;

        // Every later word carries a two-bit relative selector.
        while pos < src.len() {
            let count = greedy_count(&src[pos..], 30, r10_width)?;
            let desired = r10_row_for_count(count);
            let selector = TRANSFER[row][desired];
            row = DECODE[row][selector as usize] as usize;
            let (numbers, bits) = R10_TABLE[row];

            if out + 4 > dst.len() {
                return None;
            }
            let mut word = (selector as u32) << 30;
            for i in 0..numbers {
                if pos == src.len() {
                    break;
                }
                word |= src[pos] << (i as u32 * bits);
                pos += 1;
            }
            dst[out..out + 4].copy_from_slice(&word.to_le_bytes());
            out += 4;
        }
        Some(out)
    }

    fn decode(&self, src: &[u8], n: usize, dst: &mut [u32]) {
        if n == 0 {
            return;
        }
        let mut words = src.chunks_exact(4);
        let first = u32::from_le_bytes(words.next().unwrap().try_into().unwrap());
        let mut row = (first >> 28) as usize;
        let (numbers, bits) = SIMPLE9_TABLE[row];
        let mask = (1u32 << bits) - 1;
        let mut produced = 0;
        for i in 0..numbers {
            if produced == n {
                break;
            }
            dst[produced] = (first >> (i as u32 * bits)) & mask;
            produced += 1;
        }

        for chunk in words {
            if produced == n {
                break;
            }
            let word = u32::from_le_bytes(chunk.try_into().unwrap());
            row = DECODE[row][(word >> 30) as usize] as usize;
            let (numbers, bits) = R10_TABLE[row];
            let mask = if bits == 30 { 0x3FFF_FFFF } else { (1u32 << bits) - 1 };
            for i in 0..numbers {
                if produced == n {
                    break;
                }
                dst[produced] = (word >> (i as u32 * bits)) & mask;
                produced += 1;
            }
        }
        debug_assert_eq!(produced, n, "relative10 payload shorter than its count");
    }

    fn min_bytes(&self, n: usize) -> usize {
        // No word packs more than thirty integers (the first packs 28).
        4 * n.div_ceil(30)
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
    fn transfer_and_decode_tables_agree() {
        // Following any transfer selector must land on a row that packs no
        // more integers than the desired row, at a width at least as wide.
        for row in 0..10 {
            for desired in 0..10 {
                let actual = DECODE[row][TRANSFER[row][desired] as usize] as usize;
                let (want_n, want_b) = R10_TABLE[desired];
                let (got_n, got_b) = R10_TABLE[actual];
                assert!(
                    got_n <= want_n && got_b >= want_b,
                    "row {row} desired {desired} got {actual}"
                );
            }
        }
    }

    #[test]
    fn fixture_round_trip() {
        round_trip(&Relative10, &fixture());
    }

    #[test]
    fn single_value() {
        round_trip(&Relative10, &[(1 << 28) - 1]);
    }

    #[test]
    fn rejects_wide_first_value() {
        let mut buf = [0u8; 64];
        assert_eq!(Relative10.encode(&[1 << 28], &mut buf), None);
    }

    proptest! {
        #[test]
        fn any_sequence_round_trips(values in proptest::collection::vec(0u32..(1 << 28), 0..400)) {
            round_trip(&Relative10, &values);
        }
    }
}
