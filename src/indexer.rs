//! In-memory inverted index builder
//!
//! Document ids are handed out from 1 in arrival order (0 is reserved).
//! Term strings are interned into a bump arena so the postings map borrows
//! them for the life of the build and everything is freed in one rewind when
//! the arena drops.

use std::time::Instant;

use bumpalo::Bump;
use log::info;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::source::{Document, VectorDocument};
use crate::stem::Porter;
use crate::tokenizer::Tokenizer;

/// One term's postings under construction: (docid, tf) in arrival order,
/// which is ascending docid by construction.
#[derive(Default)]
pub struct PostingsBuilder {
    pub postings: Vec<(u32, u16)>,
}

impl PostingsBuilder {
    #[inline]
    fn push(&mut self, docid: u32, tf: u16) {
        self.postings.push((docid, tf));
    }
}

/// The finished in-memory index, terms sorted for the serializer.
pub struct CollectedIndex {
    /// (term, postings) in lexicographic term order.
    pub terms: Vec<(String, Vec<(u32, u16)>)>,
    /// Token count per document, indexed by docid − 1.
    pub doc_lengths: Vec<u32>,
    /// External primary keys, indexed by docid − 1.
    pub primary_keys: Vec<String>,
}

impl CollectedIndex {
    pub fn documents(&self) -> usize {
        self.primary_keys.len()
    }
}

pub struct Indexer<'arena> {
    arena: &'arena Bump,
    terms: FxHashMap<&'arena str, PostingsBuilder>,
    doc_lengths: Vec<u32>,
    primary_keys: Vec<String>,
    tokenizer: Tokenizer,
    stemmer: Option<Porter>,
    /// Log a progress line every n documents; 0 disables.
    report_every: usize,
    started: Instant,
}

impl<'arena> Indexer<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Indexer {
            arena,
            terms: FxHashMap::with_capacity_and_hasher(1 << 16, Default::default()),
            doc_lengths: Vec::new(),
            primary_keys: Vec::new(),
            tokenizer: Tokenizer::default(),
            stemmer: None,
            report_every: 0,
            started: Instant::now(),
        }
    }

    pub fn with_stemmer(mut self) -> Self {
        self.stemmer = Some(Porter);
        self
    }

    pub fn report_every(mut self, n: usize) -> Self {
        self.report_every = n;
        self
    }

    pub fn documents(&self) -> usize {
        self.primary_keys.len()
    }

    /// Tokenize and add one document.
    pub fn add_document(&mut self, document: &Document) {
        let freqs = self.tokenize(&document.text);
        self.add_freqs(&document.key, freqs);
    }

    /// Tokenize a batch in parallel, then merge in order.
    pub fn add_batch(&mut self, documents: &[Document]) {
        let tokenizer = &self.tokenizer;
        let stemmer = self.stemmer.as_ref();
        let tokenized: Vec<_> = documents
            .par_iter()
            .map(|doc| apply_stemmer(tokenizer.tokenize_with_freqs(&doc.text), stemmer))
            .collect();
        for (doc, freqs) in documents.iter().zip(tokenized) {
            self.add_freqs(&doc.key, freqs);
        }
    }

    /// Add one FASTA document as overlapping k-mers.
    pub fn add_document_kmers(&mut self, document: &Document, k: usize) {
        let bytes: Vec<u8> = document
            .text
            .bytes()
            .filter(u8::is_ascii_alphanumeric)
            .map(|b| b.to_ascii_lowercase())
            .collect();
        let mut freqs: FxHashMap<String, u16> = FxHashMap::default();
        if bytes.len() >= k {
            for window in bytes.windows(k) {
                let kmer = String::from_utf8(window.to_vec()).expect("k-mer is ASCII");
                let slot = freqs.entry(kmer).or_insert(0);
                *slot = slot.saturating_add(1);
            }
        }
        self.add_freqs(&document.key, freqs);
    }

    /// Add a pre-weighted document; the weights land in the tf slots and the
    /// pass-through quantizer treats them as stored impacts.
    pub fn add_vector(&mut self, document: &VectorDocument) {
        let docid = self.next_docid(&document.key);
        let mut length = 0u32;
        for (term, weight) in &document.weights {
            let weight = (*weight).clamp(1, u16::MAX as u32) as u16;
            length += weight as u32;
            self.posting(term).push(docid, weight);
        }
        self.doc_lengths.push(length);
        self.report();
    }

    fn tokenize(&self, text: &str) -> FxHashMap<String, u16> {
        apply_stemmer(self.tokenizer.tokenize_with_freqs(text), self.stemmer.as_ref())
    }

    fn add_freqs(&mut self, key: &str, freqs: FxHashMap<String, u16>) {
        let docid = self.next_docid(key);
        let length = freqs.values().map(|&tf| tf as u32).sum();
        for (term, tf) in freqs {
            self.posting(&term).push(docid, tf);
        }
        self.doc_lengths.push(length);
        self.report();
    }

    fn next_docid(&mut self, key: &str) -> u32 {
        self.primary_keys.push(key.to_string());
        self.primary_keys.len() as u32
    }

    fn posting(&mut self, term: &str) -> &mut PostingsBuilder {
        if !self.terms.contains_key(term) {
            let interned: &'arena str = self.arena.alloc_str(term);
            self.terms.insert(interned, PostingsBuilder::default());
        }
        self.terms.get_mut(term).expect("inserted above")
    }

    fn report(&self) {
        if self.report_every > 0 && self.documents() % self.report_every == 0 {
            info!(
                "{} documents indexed, {} unique terms, {:.1}s",
                self.documents(),
                self.terms.len(),
                self.started.elapsed().as_secs_f64()
            );
        }
    }

    /// Sort the vocabulary and hand everything to the quantizer/serializer.
    pub fn finish(self) -> CollectedIndex {
        let mut terms: Vec<(String, Vec<(u32, u16)>)> = self
            .terms
            .into_iter()
            .map(|(term, builder)| (term.to_string(), builder.postings))
            .collect();
        terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        info!(
            "index collected: {} documents, {} terms",
            self.primary_keys.len(),
            terms.len()
        );
        CollectedIndex {
            terms,
            doc_lengths: self.doc_lengths,
            primary_keys: self.primary_keys,
        }
    }
}

fn apply_stemmer(
    freqs: FxHashMap<String, u16>,
    stemmer: Option<&Porter>,
) -> FxHashMap<String, u16> {
    match stemmer {
        None => freqs,
        Some(porter) => {
            let mut stemmed: FxHashMap<String, u16> =
                FxHashMap::with_capacity_and_hasher(freqs.len(), Default::default());
            for (term, tf) in freqs {
                let slot = stemmed.entry(porter.stem(&term)).or_insert(0);
                *slot = slot.saturating_add(tf);
            }
            stemmed
        }
    }
}
