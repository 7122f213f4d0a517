//! Fast byte-level tokenization

use rustc_hash::FxHashMap;

/// Byte-level tokenizer for ASCII text: alphanumeric runs, lowercased.
/// Anything outside the length clamp is dropped on the floor.
pub struct Tokenizer {
    /// Minimum token length
    min_length: usize,
    /// Maximum token length
    max_length: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            min_length: 1,
            max_length: 64,
        }
    }
}

impl Tokenizer {
    pub fn new(min_length: usize, max_length: usize) -> Self {
        Self { min_length, max_length }
    }

    /// Tokenize and count term frequencies, clamped to u16.
    #[inline]
    pub fn tokenize_with_freqs(&self, text: &str) -> FxHashMap<String, u16> {
        let mut freqs: FxHashMap<String, u16> =
            FxHashMap::with_capacity_and_hasher(text.len() / 5 + 1, Default::default());
        self.for_each_token(text, |token| {
            let slot = freqs.entry(token).or_insert(0);
            *slot = slot.saturating_add(1);
        });
        freqs
    }

    /// Distinct query terms in first-appearance order.
    #[inline]
    pub fn tokenize_query(&self, query: &str) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        self.for_each_token(query, |token| {
            if !terms.contains(&token) {
                terms.push(token);
            }
        });
        terms
    }

    fn for_each_token(&self, text: &str, mut emit: impl FnMut(String)) {
        let bytes = text.as_bytes();
        let mut start = 0;
        let mut in_token = false;

        for (i, &b) in bytes.iter().enumerate() {
            if b.is_ascii_alphanumeric() {
                if !in_token {
                    start = i;
                    in_token = true;
                }
            } else if in_token {
                self.emit_if_fits(&bytes[start..i], &mut emit);
                in_token = false;
            }
        }
        if in_token {
            self.emit_if_fits(&bytes[start..], &mut emit);
        }
    }

    #[inline]
    fn emit_if_fits(&self, bytes: &[u8], emit: &mut impl FnMut(String)) {
        if bytes.len() >= self.min_length && bytes.len() <= self.max_length {
            emit(normalize_token(bytes));
        }
    }
}

/// Lowercase an ASCII token.
#[inline]
fn normalize_token(bytes: &[u8]) -> String {
    let mut result = String::with_capacity(bytes.len());
    for &b in bytes {
        result.push(b.to_ascii_lowercase() as char);
    }
    result
}
