//! Impact quantization
//!
//! The ATIRE flavour of BM25 scores every (term, document) pair; the scores
//! are then mapped linearly onto the integer range [1, Q]. Because the idf
//! term is ln(N/df) the scores never go negative, so the linear map is the
//! whole story. After this stage the index never needs floats again.

use log::info;

use crate::indexer::CollectedIndex;

/// ATIRE BM25: `ln(N/df) * (k1+1)*tf / (k1*((1-b) + b*dl/avg_dl) + tf)`.
#[derive(Debug, Clone, Copy)]
pub struct AtireBm25 {
    pub k1: f32,
    pub b: f32,
}

impl Default for AtireBm25 {
    fn default() -> Self {
        Self { k1: 0.9, b: 0.4 }
    }
}

impl AtireBm25 {
    #[inline]
    pub fn score(&self, tf: f32, df: f32, doc_len: f32, avg_doc_len: f32, total_docs: f32) -> f32 {
        let idf = (total_docs / df).ln();
        idf * ((self.k1 + 1.0) * tf)
            / (self.k1 * ((1.0 - self.b) + self.b * doc_len / avg_doc_len) + tf)
    }
}

/// One impact segment: every document here earned the same quantized score
/// for the term. Document ids are ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantum {
    pub impact: u16,
    pub docids: Vec<u32>,
}

/// A term and its quanta in descending impact order.
#[derive(Debug, Clone)]
pub struct QuantizedTerm {
    pub term: String,
    pub quanta: Vec<Quantum>,
}

/// The quantized index the serializer writes out.
pub struct QuantizedIndex {
    /// Lexicographic term order, inherited from [`CollectedIndex`].
    pub terms: Vec<QuantizedTerm>,
    pub primary_keys: Vec<String>,
}

impl QuantizedIndex {
    pub fn documents(&self) -> usize {
        self.primary_keys.len()
    }
}

/// Group one term's (docid, impact) pairs into descending-impact quanta.
fn into_quanta(mut scored: Vec<(u32, u16)>) -> Vec<Quantum> {
    scored.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut quanta: Vec<Quantum> = Vec::new();
    for (docid, impact) in scored {
        match quanta.last_mut() {
            Some(quantum) if quantum.impact == impact => quantum.docids.push(docid),
            _ => quanta.push(Quantum {
                impact,
                docids: vec![docid],
            }),
        }
    }
    quanta
}

/// BM25-score then linearly quantize onto [1, max_quantum].
pub fn quantize(index: &CollectedIndex, ranker: AtireBm25, max_quantum: u16) -> QuantizedIndex {
    let total_docs = index.documents() as f32;
    let avg_doc_len =
        index.doc_lengths.iter().map(|&l| l as f64).sum::<f64>() as f32 / total_docs.max(1.0);

    // Pass one: the collection-wide score range.
    let mut smallest = f32::MAX;
    let mut largest = f32::MIN;
    let score_one = |term_postings: &[(u32, u16)], docid: u32, tf: u16| {
        ranker.score(
            tf as f32,
            term_postings.len() as f32,
            index.doc_lengths[docid as usize - 1] as f32,
            avg_doc_len,
            total_docs,
        )
    };
    for (_, postings) in &index.terms {
        for &(docid, tf) in postings {
            let score = score_one(postings, docid, tf);
            smallest = smallest.min(score);
            largest = largest.max(score);
        }
    }
    info!("rsv range [{smallest}, {largest}], quantizing onto [1, {max_quantum}]");

    // Pass two: map and bucket. A flat range collapses onto the ceiling.
    let range = largest - smallest;
    let to_impact = |score: f32| -> u16 {
        if range <= 0.0 {
            max_quantum
        } else {
            let scaled = ((score - smallest) / range) * (max_quantum - 1) as f32;
            ((1 + scaled.round() as u32).min(max_quantum as u32)) as u16
        }
    };
    let terms = index
        .terms
        .iter()
        .map(|(term, postings)| {
            let scored = postings
                .iter()
                .map(|&(docid, tf)| (docid, to_impact(score_one(postings, docid, tf))))
                .collect();
            QuantizedTerm {
                term: term.clone(),
                quanta: into_quanta(scored),
            }
        })
        .collect();

    QuantizedIndex {
        terms,
        primary_keys: index.primary_keys.clone(),
    }
}

/// Treat the stored tf values as impacts (JSON-uniCOIL indexes arrive
/// pre-quantized).
pub fn passthrough(index: &CollectedIndex) -> QuantizedIndex {
    let terms = index
        .terms
        .iter()
        .map(|(term, postings)| QuantizedTerm {
            term: term.clone(),
            quanta: into_quanta(postings.clone()),
        })
        .collect();
    QuantizedIndex {
        terms,
        primary_keys: index.primary_keys.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_index() -> CollectedIndex {
        CollectedIndex {
            terms: vec![
                ("common".into(), vec![(1, 1), (2, 1), (3, 1)]),
                ("rare".into(), vec![(2, 5)]),
            ],
            doc_lengths: vec![10, 10, 10],
            primary_keys: vec!["a".into(), "b".into(), "c".into()],
        }
    }

    #[test]
    fn impacts_span_the_requested_range() {
        let quantized = quantize(&tiny_index(), AtireBm25::default(), 255);
        let rare = &quantized.terms[1];
        assert_eq!(rare.quanta.len(), 1);
        // The highest score in the collection maps to the ceiling.
        assert_eq!(rare.quanta[0].impact, 255);

        let common = &quantized.terms[0];
        // Identical scores share one quantum at the floor.
        assert_eq!(common.quanta.len(), 1);
        assert_eq!(common.quanta[0].impact, 1);
        assert_eq!(common.quanta[0].docids, vec![1, 2, 3]);
    }

    #[test]
    fn quanta_are_descending_and_docids_ascending() {
        let index = CollectedIndex {
            terms: vec![("t".into(), vec![(1, 1), (2, 9), (3, 1), (4, 9)])],
            doc_lengths: vec![5, 5, 5, 5, 5],
            primary_keys: (0..5).map(|i| i.to_string()).collect(),
        };
        let quantized = quantize(&index, AtireBm25::default(), 64);
        let quanta = &quantized.terms[0].quanta;
        assert_eq!(quanta.len(), 2);
        assert!(quanta[0].impact > quanta[1].impact);
        assert_eq!(quanta[0].docids, vec![2, 4]);
        assert_eq!(quanta[1].docids, vec![1, 3]);
    }

    #[test]
    fn passthrough_keeps_weights() {
        let index = CollectedIndex {
            terms: vec![("t".into(), vec![(1, 94), (2, 94), (3, 7)])],
            doc_lengths: vec![1, 1, 1],
            primary_keys: (0..3).map(|i| i.to_string()).collect(),
        };
        let quantized = passthrough(&index);
        let quanta = &quantized.terms[0].quanta;
        assert_eq!(
            quanta,
            &vec![
                Quantum { impact: 94, docids: vec![1, 2] },
                Quantum { impact: 7, docids: vec![3] },
            ]
        );
    }
}
