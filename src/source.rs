//! Document sources
//!
//! Each source pulls documents out of one input file format and yields
//! `(primary key, content)` pairs for the indexer. A document the source
//! cannot make sense of is logged and skipped; only I/O failures stop the
//! stream.

use std::collections::HashMap;
use std::io::BufRead;

use log::warn;
use serde::Deserialize;

use crate::error::Result;

/// A parsed document ready for tokenization.
#[derive(Debug, Clone)]
pub struct Document {
    /// External primary key (e.g. a TREC DOCNO).
    pub key: String,
    /// Text content to be indexed.
    pub text: String,
}

impl Document {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// A document that arrives pre-weighted (JSON-uniCOIL): term weights are
/// stored impacts, so the quantizer is bypassed.
#[derive(Debug, Clone)]
pub struct VectorDocument {
    pub key: String,
    pub weights: Vec<(String, u32)>,
}

/// TREC-format documents: `<DOC>` ... `</DOC>` with the primary key between
/// `<DOCNO>` tags. Markup is stripped before the text reaches the tokenizer.
pub struct TrecSource<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> TrecSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }

    fn next_line(&mut self) -> Result<bool> {
        self.line.clear();
        Ok(self.reader.read_line(&mut self.line)? != 0)
    }
}

impl<R: BufRead> Iterator for TrecSource<R> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        // Scan forward to the next <DOC>.
        loop {
            match self.next_line() {
                Ok(false) => return None,
                Ok(true) if self.line.contains("<DOC>") => break,
                Ok(true) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        // Accumulate until </DOC>.
        let mut body = String::new();
        loop {
            match self.next_line() {
                Ok(false) => {
                    warn!("input ended inside a <DOC>; dropping the partial document");
                    return None;
                }
                Ok(true) if self.line.contains("</DOC>") => break,
                Ok(true) => body.push_str(&self.line),
                Err(e) => return Some(Err(e)),
            }
        }

        let key = match extract_between(&body, "<DOCNO>", "</DOCNO>") {
            Some(key) => key.trim().to_string(),
            None => {
                warn!("document without a <DOCNO>; skipped");
                return self.next();
            }
        };
        Some(Ok(Document::new(key, strip_tags(&body))))
    }
}

fn extract_between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find(close)? + start;
    Some(&text[start..end])
}

/// Replace `<...>` spans with spaces so tag names never reach the tokenizer.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// FASTA records: a `>` header line holding the primary key, then sequence
/// lines. The indexer cuts the sequence into k-mers.
pub struct FastaSource<R: BufRead> {
    reader: R,
    pending_key: Option<String>,
    line: String,
}

impl<R: BufRead> FastaSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending_key: None,
            line: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for FastaSource<R> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut key = self.pending_key.take();
        let mut sequence = String::new();
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    return key.map(|key| Ok(Document::new(key, sequence)));
                }
                Ok(_) => {
                    let line = self.line.trim_end();
                    if let Some(header) = line.strip_prefix('>') {
                        let next_key = header
                            .split_whitespace()
                            .next()
                            .unwrap_or(header)
                            .to_string();
                        match key.take() {
                            Some(done) => {
                                self.pending_key = Some(next_key);
                                return Some(Ok(Document::new(done, sequence)));
                            }
                            None => key = Some(next_key),
                        }
                    } else if key.is_some() {
                        sequence.push_str(line.trim());
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

#[derive(Deserialize)]
struct UnicoilRecord {
    id: String,
    vector: HashMap<String, f64>,
}

/// JSON-uniCOIL lines: `{"id": "0", "vector": {"term": 94}}`. Weights map
/// straight onto stored impacts, clamped to the 16-bit range.
pub struct UnicoilSource<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> UnicoilSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead> Iterator for UnicoilSource<R> {
    type Item = Result<VectorDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {
                    let line = self.line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<UnicoilRecord>(line) {
                        Ok(record) => {
                            let weights = record
                                .vector
                                .into_iter()
                                .filter(|&(_, weight)| weight >= 1.0)
                                .map(|(term, weight)| {
                                    (term, (weight.round() as u32).min(u16::MAX as u32))
                                })
                                .collect();
                            return Some(Ok(VectorDocument {
                                key: record.id,
                                weights,
                            }));
                        }
                        Err(e) => {
                            warn!("unparsable uniCOIL line skipped: {e}");
                            continue;
                        }
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
