//! Simple-16 codec
//!
//! Like Simple-9 but with sixteen rows, several of which mix bit widths
//! inside one word so that a single oversized gap in a run of small gaps does
//! not force the whole word onto the wide row. Selector in the high four
//! bits, 28 payload bits, values must fit in 28 bits.

use super::{Codec, DeltaMode};

pub struct Simple16;

/// Each row is a sequence of (count, bits) runs whose widths sum to at most
/// 28 bits.
const ROWS: [&[(usize, u32)]; 16] = [
    &[(28, 1)],
    &[(7, 2), (14, 1)],
    &[(7, 1), (7, 2), (7, 1)],
    &[(14, 1), (7, 2)],
    &[(14, 2)],
    &[(1, 4), (8, 3)],
    &[(1, 3), (4, 4), (3, 3)],
    &[(7, 4)],
    &[(4, 5), (2, 4)],
    &[(2, 4), (4, 5)],
    &[(3, 6), (2, 5)],
    &[(2, 5), (3, 6)],
    &[(4, 7)],
    &[(1, 10), (2, 9)],
    &[(2, 14)],
    &[(1, 28)],
];

fn row_count(row: &[(usize, u32)]) -> usize {
    row.iter().map(|&(count, _)| count).sum()
}

/// Do the next `row_count` values each fit the width of their slot?
fn row_fits(row: &[(usize, u32)], values: &[u32]) -> bool {
    let mut at = 0;
    for &(count, bits) in row {
        for &value in &values[at..at + count] {
            if value >= 1u32 << bits {
                return false;
            }
        }
        at += count;
    }
    true
}

impl Codec for Simple16 {
    fn name(&self) -> &'static str {
        "simple16"
    }

    fn encode(&self, src: &[u32], dst: &mut [u8]) -> Option<usize> {
        let mut at = 0;
        let mut out = 0;
        while at < src.len() {
            let remaining = &src[at..];
            let (selector, row) = ROWS.iter().enumerate().find_map(|(selector, &row)| {
                let count = row_count(row);
                (count <= remaining.len() && row_fits(row, remaining))
                    .then_some((selector, row))
            })?;

            if out + 4 > dst.len() {
                return None;
            }
            let mut word = (selector as u32) << 28;
            let mut shift = 0;
            let mut taken = 0;
            for &(count, bits) in row {
                for &value in &remaining[taken..taken + count] {
                    word |= value << shift;
                    shift += bits;
                }
                taken += count;
            }
            dst[out..out + 4].copy_from_slice(&word.to_le_bytes());
            out += 4;
            at += taken;
        }
        Some(out)
    }

    fn decode(&self, src: &[u8], n: usize, dst: &mut [u32]) {
        let mut produced = 0;
        'words: for chunk in src.chunks_exact(4) {
            if produced == n {
                break;
            }
            let word = u32::from_le_bytes(chunk.try_into().unwrap());
            let row = ROWS[(word >> 28) as usize];
            let mut shift = 0;
            for &(count, bits) in row {
                let mask = (1u32 << bits) - 1;
                for _ in 0..count {
                    if produced == n {
                        break 'words;
                    }
                    dst[produced] = (word >> shift) & mask;
                    produced += 1;
                    shift += bits;
                }
            }
        }
        debug_assert_eq!(produced, n, "simple16 payload shorter than its count");
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
