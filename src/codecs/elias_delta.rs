//! Group Elias-δ codec, SIMD-lane layout
//!
//! Same group shape as the γ codec, but the selector word codes each column
//! width with Elias γ (unary length, then the width's low bits), which is
//! shorter for the wide columns that dominate high-impact quanta. Eleven
//! selector bits cover a 32-bit column where the γ codec would spend 32.

use super::elias_gamma::{column_width, decode_groups, group_floor, BitWriter, LANES};
use super::{Codec, DeltaMode};

pub struct EliasDeltaSimd;

/// Selector bits for a column of width `w` (1..=32): 2·bitlen(w) − 1.
#[inline]
fn selector_cost(width: u32) -> u32 {
    2 * (32 - width.leading_zeros()) - 1
}

fn delta_selector(widths: &[u32]) -> u32 {
    let mut selector = 0u32;
    let mut acc = 0u32;
    for &width in widths {
        let b = 32 - width.leading_zeros();
        // Unary length marker.
        selector |= 1 << (acc + b - 1);
        acc += b;
        // The width without its leading one bit.
        if b > 1 {
            selector |= (width & ((1 << (b - 1)) - 1)) << acc;
            acc += b - 1;
        }
    }
    selector
}

fn parse_delta_selector(selector: u32) -> Vec<u32> {
    let mut widths = Vec::new();
    let mut s = selector;
    while s != 0 {
        let b = s.trailing_zeros() + 1;
        s >>= b;
        let low = s & ((1 << (b - 1)) - 1);
        s >>= b - 1;
        widths.push((1 << (b - 1)) | low);
    }
    widths
}

impl Codec for EliasDeltaSimd {
    fn name(&self) -> &'static str {
        "elias-delta-simd"
    }

    fn encode(&self, src: &[u32], dst: &mut [u8]) -> Option<usize> {
        let mut out = Vec::with_capacity(src.len() * 4);
        let mut at = 0;
        while at < src.len() {
            // Plan columns while the selector has room for their codes.
            let mut widths = Vec::new();
            let mut col_at = at;
            let mut used = 0u32;
            while col_at < src.len() {
                let take = LANES.min(src.len() - col_at);
                let width = column_width(&src[col_at..col_at + take]);
                if used + selector_cost(width) > 32 {
                    break;
                }
                used += selector_cost(width);
                widths.push(width);
                col_at += take;
            }

            out.extend_from_slice(&delta_selector(&widths).to_le_bytes());
            let mut writer = BitWriter::new();
            let mut p = at;
            for &width in &widths {
                for _ in 0..LANES {
                    let value = if p < src.len() { src[p] } else { 0 };
                    writer.put(value, width);
                    p += 1;
                }
            }
            writer.finish_word();
            out.extend_from_slice(&writer.out);
            at = col_at;
        }
        if out.len() > dst.len() {
            return None;
        }
        dst[..out.len()].copy_from_slice(&out);
        Some(out.len())
    }

    fn decode(&self, src: &[u8], n: usize, dst: &mut [u32]) {
        decode_groups(src, n, dst, parse_delta_selector);
    }

    fn min_bytes(&self, n: usize) -> usize {
        group_floor(n)
    }

    fn alignment(&self) -> usize {
        4
    }

    fn deltas(&self) -> DeltaMode {
        DeltaMode::D1
    }
}
