//! Score-at-a-Time query processor
//!
//! One `Context` owns all of a query's mutable state (accumulators, heap,
//! quantum schedule, decode scratch), allocated once and reused, so an
//! `Index` shared by reference can serve many worker threads with one
//! context each. The traversal walks every scheduled quantum in descending
//! impact order, adds the quantum's impact into the accumulator of each
//! decoded docid, and stops early when the mode allows it.

use std::io::Write;
use std::time::{Duration, Instant};

use crate::accumulator::{AccumulatorTable, DirtyRowTable, EpochTable};
use crate::codecs::{CodecId, DeltaMode, DECODE_SLACK};
use crate::error::{Error, Result};
use crate::heap::ResultHeap;
use crate::index::{Index, QuantumHeader};
use crate::serialise::POSTINGS_FILE;
use crate::stem::Porter;
use crate::tokenizer::Tokenizer;

/// When the traversal is allowed to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Stop before the quantum that would push the postings count past the
    /// budget. A budget of `u64::MAX` degenerates to exhaustive traversal.
    Anytime { budget: u64 },
    /// Visit every quantum; with `early_exit`, stop once no remaining
    /// quantum can re-order the top-k.
    Exhaustive { early_exit: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub mode: Mode,
    /// Decode a whole quantum into the scratch buffer before scoring it,
    /// instead of interleaving decode and scoring. Only the variable-byte
    /// codec has an interleaved path; every other codec decodes two-phase
    /// regardless of this flag.
    pub decompress_then_process: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            mode: Mode::Exhaustive { early_exit: true },
            decompress_then_process: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    pub docid: u32,
    pub score: u16,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Up to K hits, descending score, ascending docid on ties.
    pub hits: Vec<SearchHit>,
    pub postings_processed: u64,
    pub quanta_processed: u64,
    pub early_terminated: bool,
    /// Accumulator adds that clamped at `u16::MAX`.
    pub saturated: u64,
    pub elapsed: Duration,
}

/// Per-query mutable state; everything sized once at construction.
pub struct Context<A: AccumulatorTable = DirtyRowTable> {
    accumulators: A,
    heap: ResultHeap,
    schedule: Vec<QuantumHeader>,
    scratch: Vec<u32>,
    check: Vec<u16>,
    top_k: usize,
    saturated: u64,
}

impl Context<DirtyRowTable> {
    pub fn new(index: &Index, top_k: usize) -> Self {
        Self::with_table(DirtyRowTable::new(index.documents()), index, top_k)
    }
}

impl Context<EpochTable> {
    /// The query-counter variant, preferable for very large collections.
    pub fn with_epoch_table(index: &Index, top_k: usize) -> Self {
        Self::with_table(EpochTable::new(index.documents()), index, top_k)
    }
}

impl<A: AccumulatorTable> Context<A> {
    pub fn with_table(accumulators: A, index: &Index, top_k: usize) -> Self {
        Context {
            accumulators,
            // K+1 slots so the early-exit check can see the runner-up.
            heap: ResultHeap::new(top_k + 1),
            schedule: Vec::new(),
            scratch: vec![0u32; index.documents() + 1 + DECODE_SLACK],
            check: Vec::with_capacity(top_k + 1),
            top_k,
            saturated: 0,
        }
    }

    /// Evaluate one bag-of-words query. Terms missing from the vocabulary
    /// contribute nothing; a corrupt quantum header is fatal.
    pub fn search(
        &mut self,
        index: &Index,
        terms: &[String],
        options: &SearchOptions,
    ) -> Result<SearchResult> {
        let started = Instant::now();
        self.accumulators.rewind();
        self.heap.clear();
        self.schedule.clear();
        self.saturated = 0;

        for term in terms {
            if let Some(entry) = index.lookup(term) {
                self.schedule.extend(index.quantum_headers(&entry)?);
            }
        }

        // Highest impact first; short quanta first within an impact, since
        // they touch fewer accumulators per unit of budget.
        self.schedule
            .sort_unstable_by(|a, b| b.impact.cmp(&a.impact).then(a.count.cmp(&b.count)));

        let mut remaining_impact: u64 = self.schedule.iter().map(|h| h.impact as u64).sum();
        let mut postings_processed = 0u64;
        let mut quanta_processed = 0u64;
        let mut early_terminated = false;

        for at in 0..self.schedule.len() {
            let header = self.schedule[at];
            if let Mode::Anytime { budget } = options.mode {
                if postings_processed + header.count as u64 > budget {
                    break;
                }
            }
            self.process_quantum(index, &header, options)?;
            postings_processed += header.count as u64;
            quanta_processed += 1;

            if let Mode::Exhaustive { early_exit: true } = options.mode {
                remaining_impact -= header.impact as u64;
                if self.heap.is_full() && self.no_reordering_possible(remaining_impact) {
                    early_terminated = true;
                    break;
                }
            }
        }

        let hits = {
            let Context { accumulators, heap, top_k, .. } = self;
            heap.extract_sorted(|d| accumulators.get(d))
                .into_iter()
                .take(*top_k)
                .map(|docid| SearchHit {
                    docid,
                    score: accumulators.get(docid),
                })
                .collect()
        };
        Ok(SearchResult {
            hits,
            postings_processed,
            quanta_processed,
            early_terminated,
            saturated: self.saturated,
            elapsed: started.elapsed(),
        })
    }

    fn process_quantum(
        &mut self,
        index: &Index,
        header: &QuantumHeader,
        options: &SearchOptions,
    ) -> Result<()> {
        let payload = &index.postings_bytes()[header.start as usize..header.end as usize];
        let count = header.count as usize;
        let impact = header.impact;

        // Interleaved path: score each docid the moment its gap decodes.
        if index.codec_id() == CodecId::VariableByte && !options.decompress_then_process {
            let mut sum = 0u32;
            let mut value = 0u32;
            for &byte in payload {
                value = (value << 7) | (byte & 0x7F) as u32;
                if byte & 0x80 != 0 {
                    sum += value;
                    self.add_rsv(sum + 1, impact);
                    value = 0;
                }
            }
            return Ok(());
        }

        if count + DECODE_SLACK > self.scratch.len() {
            return Err(Error::corrupt(
                POSTINGS_FILE,
                format!("quantum of {count} postings exceeds the collection size"),
            ));
        }
        let mut scratch = std::mem::take(&mut self.scratch);
        index.codec().decode(payload, count, &mut scratch);
        match index.codec().deltas() {
            DeltaMode::D1 => {
                let mut sum = 0u32;
                for &gap in &scratch[..count] {
                    sum += gap;
                    self.add_rsv(sum + 1, impact);
                }
            }
            DeltaMode::D0 | DeltaMode::D4 => {
                for &docid in &scratch[..count] {
                    self.add_rsv(docid + 1, impact);
                }
            }
        }
        self.scratch = scratch;
        Ok(())
    }

    #[inline]
    fn add_rsv(&mut self, docid: u32, impact: u16) {
        let old = self.accumulators.add(docid, impact);
        if old as u32 + impact as u32 > u16::MAX as u32 {
            self.saturated += 1;
        }
        let Context { accumulators, heap, .. } = self;
        if !heap.is_full() {
            if old == 0 {
                heap.push(docid);
                if heap.is_full() {
                    heap.build(|d| accumulators.get(d));
                }
            }
        } else if old == 0 || !heap.promote(docid, |d| accumulators.get(d)) {
            heap.offer(docid, |d| accumulators.get(d));
        }
    }

    /// True when every adjacent gap in the sorted K+1 scores is at least the
    /// impact any document could still gain, so no re-ordering is possible.
    fn no_reordering_possible(&mut self, remaining_impact: u64) -> bool {
        let Context { accumulators, heap, check, .. } = self;
        check.clear();
        check.extend(heap.slots().iter().map(|&d| accumulators.get(d)));
        check.sort_unstable_by(|a, b| b.cmp(a));
        check
            .windows(2)
            .all(|pair| (pair[0] - pair[1]) as u64 >= remaining_impact)
    }
}

/// Parse one query-file line, `QID term term ...`. Returns `None` for a
/// line with no query id; terms go through the same tokenizer (and
/// optionally stemmer) the indexer used.
pub fn parse_query_line(
    line: &str,
    tokenizer: &Tokenizer,
    stemmer: Option<&Porter>,
) -> Option<(String, Vec<String>)> {
    let line = line.trim();
    let qid = line.split_whitespace().next()?.to_string();
    let rest = &line[qid.len()..];
    let mut terms = tokenizer.tokenize_query(rest);
    if let Some(porter) = stemmer {
        let mut stemmed: Vec<String> = Vec::with_capacity(terms.len());
        for term in terms {
            let term = porter.stem(&term);
            if !stemmed.contains(&term) {
                stemmed.push(term);
            }
        }
        terms = stemmed;
    }
    Some((qid, terms))
}

/// TREC run format: `QID Q0 PRIMARYKEY RANK SCORE jass`, ranks from 1.
pub fn write_trec_run<W: Write>(
    out: &mut W,
    qid: &str,
    index: &Index,
    result: &SearchResult,
) -> std::io::Result<()> {
    for (rank, hit) in result.hits.iter().enumerate() {
        writeln!(
            out,
            "{} Q0 {} {} {} jass",
            qid,
            index.primary_key(hit.docid),
            rank + 1,
            hit.score
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::CodecId;
    use crate::quantize::{QuantizedIndex, QuantizedTerm, Quantum};
    use crate::serialise::{IndexWriter, VocabFormat};
    use tempfile::tempdir;

    /// Term "alpha" has impact 8 over {1,3,5}; "beta" impact 4 over {3,5,7}.
    fn two_term_fixture() -> QuantizedIndex {
        QuantizedIndex {
            terms: vec![
                QuantizedTerm {
                    term: "alpha".into(),
                    quanta: vec![Quantum { impact: 8, docids: vec![1, 3, 5] }],
                },
                QuantizedTerm {
                    term: "beta".into(),
                    quanta: vec![Quantum { impact: 4, docids: vec![3, 5, 7] }],
                },
            ],
            primary_keys: (1..=8).map(|i| format!("doc-{i}")).collect(),
        }
    }

    fn open(codec: CodecId, fixture: &QuantizedIndex) -> (tempfile::TempDir, Index) {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path(), codec, VocabFormat::V1)
            .write(fixture)
            .unwrap();
        let index = Index::open(dir.path()).unwrap();
        (dir, index)
    }

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn two_term_query_accumulates_and_ranks() {
        for codec in [CodecId::VariableByte, CodecId::Simple8b, CodecId::QmxD4] {
            let (_dir, index) = open(codec, &two_term_fixture());
            let mut context = Context::new(&index, 3);
            let result = context
                .search(&index, &terms(&["alpha", "beta"]), &SearchOptions::default())
                .unwrap();

            let hits: Vec<(u32, u16)> = result.hits.iter().map(|h| (h.docid, h.score)).collect();
            assert_eq!(hits, vec![(3, 12), (5, 12), (1, 8)], "codec {codec:?}");
            assert_eq!(result.postings_processed, 6);
        }
    }

    #[test]
    fn fourth_hit_is_the_low_scorer() {
        let (_dir, index) = open(CodecId::VariableByte, &two_term_fixture());
        let mut context = Context::new(&index, 4);
        let result = context
            .search(&index, &terms(&["alpha", "beta"]), &SearchOptions::default())
            .unwrap();
        let hits: Vec<(u32, u16)> = result.hits.iter().map(|h| (h.docid, h.score)).collect();
        assert_eq!(hits, vec![(3, 12), (5, 12), (1, 8), (7, 4)]);
    }

    #[test]
    fn missing_terms_produce_empty_output() {
        let (_dir, index) = open(CodecId::VariableByte, &two_term_fixture());
        let mut context = Context::new(&index, 10);
        let result = context
            .search(
                &index,
                &terms(&["aardvark", "unicornicopia"]),
                &SearchOptions::default(),
            )
            .unwrap();
        assert!(result.hits.is_empty());
        assert_eq!(result.postings_processed, 0);
    }

    #[test]
    fn anytime_budget_stops_after_first_quantum() {
        let (_dir, index) = open(CodecId::VariableByte, &two_term_fixture());
        let mut context = Context::new(&index, 10);
        let options = SearchOptions {
            mode: Mode::Anytime { budget: 3 },
            ..Default::default()
        };
        let result = context
            .search(&index, &terms(&["alpha", "beta"]), &options)
            .unwrap();
        // Only the impact-8 quantum fits the budget.
        assert_eq!(result.postings_processed, 3);
        assert_eq!(result.quanta_processed, 1);
        let hits: Vec<(u32, u16)> = result.hits.iter().map(|h| (h.docid, h.score)).collect();
        assert_eq!(hits, vec![(1, 8), (3, 8), (5, 8)]);
    }

    #[test]
    fn infinite_budget_equals_exhaustive() {
        let (_dir, index) = open(CodecId::VariableByte, &two_term_fixture());
        let mut context = Context::new(&index, 5);
        let anytime = context
            .search(
                &index,
                &terms(&["alpha", "beta"]),
                &SearchOptions { mode: Mode::Anytime { budget: u64::MAX }, ..Default::default() },
            )
            .unwrap();
        let exhaustive = context
            .search(
                &index,
                &terms(&["alpha", "beta"]),
                &SearchOptions {
                    mode: Mode::Exhaustive { early_exit: false },
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(anytime.hits, exhaustive.hits);
        assert_eq!(anytime.postings_processed, exhaustive.postings_processed);
    }

    /// A randomized schedule against a brute-force Σ-impacts reference.
    #[test]
    fn matches_brute_force_reference() {
        let fixture = QuantizedIndex {
            terms: vec![
                QuantizedTerm {
                    term: "a".into(),
                    quanta: vec![
                        Quantum { impact: 9, docids: vec![2, 11, 17] },
                        Quantum { impact: 5, docids: vec![1, 7, 9, 19] },
                        Quantum { impact: 1, docids: vec![4, 5, 6, 8] },
                    ],
                },
                QuantizedTerm {
                    term: "b".into(),
                    quanta: vec![
                        Quantum { impact: 7, docids: vec![7, 11] },
                        Quantum { impact: 2, docids: vec![1, 2, 3, 17, 20] },
                    ],
                },
                QuantizedTerm {
                    term: "c".into(),
                    quanta: vec![Quantum { impact: 3, docids: vec![5, 11, 19] }],
                },
            ],
            primary_keys: (1..=20).map(|i| format!("d{i}")).collect(),
        };

        // Reference: sum impacts per document across all three terms.
        let mut reference = vec![0u16; 21];
        for term in &fixture.terms {
            for quantum in &term.quanta {
                for &docid in &quantum.docids {
                    reference[docid as usize] += quantum.impact;
                }
            }
        }
        let mut expected: Vec<(u32, u16)> = (1..=20)
            .filter(|&d| reference[d as usize] > 0)
            .map(|d| (d, reference[d as usize]))
            .collect();
        expected.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        expected.truncate(5);

        for codec in [CodecId::VariableByte, CodecId::EliasGammaSimdVb, CodecId::Qmx] {
            let (_dir, index) = open(codec, &fixture);
            let mut context = Context::new(&index, 5);
            let result = context
                .search(&index, &terms(&["a", "b", "c"]), &SearchOptions::default())
                .unwrap();
            let hits: Vec<(u32, u16)> = result.hits.iter().map(|h| (h.docid, h.score)).collect();
            assert_eq!(hits, expected, "codec {codec:?}");
        }
    }

    #[test]
    fn early_exit_matches_exhaustive_ranking() {
        // A huge leading impact and a trail of tiny quanta invite an exit.
        let fixture = QuantizedIndex {
            terms: vec![
                QuantizedTerm {
                    term: "big".into(),
                    quanta: vec![Quantum { impact: 900, docids: vec![4] }],
                },
                QuantizedTerm {
                    term: "small".into(),
                    quanta: vec![
                        Quantum { impact: 2, docids: vec![1, 2] },
                        Quantum { impact: 1, docids: vec![3, 5, 6] },
                    ],
                },
            ],
            primary_keys: (1..=6).map(|i| format!("d{i}")).collect(),
        };
        let (_dir, index) = open(CodecId::VariableByte, &fixture);
        let mut context = Context::new(&index, 1);
        let lazy = context
            .search(&index, &terms(&["big", "small"]), &SearchOptions::default())
            .unwrap();
        let full = context
            .search(
                &index,
                &terms(&["big", "small"]),
                &SearchOptions {
                    mode: Mode::Exhaustive { early_exit: false },
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(lazy.hits, full.hits);
        assert!(lazy.early_terminated);
        assert!(lazy.postings_processed < full.postings_processed);
    }

    #[test]
    fn epoch_table_context_agrees() {
        let (_dir, index) = open(CodecId::VariableByte, &two_term_fixture());
        let mut dirty = Context::new(&index, 3);
        let mut epoch = Context::with_epoch_table(&index, 3);
        let query = terms(&["alpha", "beta"]);
        let a = dirty.search(&index, &query, &SearchOptions::default()).unwrap();
        let b = epoch.search(&index, &query, &SearchOptions::default()).unwrap();
        assert_eq!(a.hits, b.hits);
    }

    #[test]
    fn contexts_reset_between_queries() {
        let (_dir, index) = open(CodecId::VariableByte, &two_term_fixture());
        let mut context = Context::new(&index, 3);
        let first = context
            .search(&index, &terms(&["alpha", "beta"]), &SearchOptions::default())
            .unwrap();
        let again = context
            .search(&index, &terms(&["alpha", "beta"]), &SearchOptions::default())
            .unwrap();
        assert_eq!(first.hits, again.hits);

        let beta_only = context
            .search(&index, &terms(&["beta"]), &SearchOptions::default())
            .unwrap();
        let hits: Vec<(u32, u16)> = beta_only.hits.iter().map(|h| (h.docid, h.score)).collect();
        assert_eq!(hits, vec![(3, 4), (5, 4), (7, 4)]);
    }

    #[test]
    fn query_line_parsing() {
        let tokenizer = Tokenizer::default();
        let parsed = parse_query_line("701 Hello, world hello", &tokenizer, None).unwrap();
        assert_eq!(parsed.0, "701");
        assert_eq!(parsed.1, vec!["hello", "world"]);

        assert!(parse_query_line("   ", &tokenizer, None).is_none());

        let porter = Porter;
        let parsed = parse_query_line("9 cats cat", &tokenizer, Some(&porter)).unwrap();
        assert_eq!(parsed.1, vec!["cat"]);
    }

    #[test]
    fn trec_run_format() {
        let (_dir, index) = open(CodecId::VariableByte, &two_term_fixture());
        let mut context = Context::new(&index, 2);
        let result = context
            .search(&index, &terms(&["alpha", "beta"]), &SearchOptions::default())
            .unwrap();
        let mut out = Vec::new();
        write_trec_run(&mut out, "42", &index, &result).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "42 Q0 doc-3 1 12 jass\n42 Q0 doc-5 2 12 jass\n");
    }
}
