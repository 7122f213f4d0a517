//! Read-only view over the four on-disk index files
//!
//! The postings file is memory-mapped (it dominates the index size and is
//! touched sparsely); the vocabulary, term strings and doclist are read into
//! owned tables at open time. Everything here is immutable after `open`, so
//! one `Index` can be shared by reference across any number of query
//! threads.

use std::fs::File;
use std::path::Path;

use log::info;
use memmap2::Mmap;

use crate::codecs::{self, variable_byte, Codec, CodecId};
use crate::error::{Error, Result};
use crate::serialise::{DOCLIST_FILE, POSTINGS_FILE, VOCAB_FILE, VOCAB_TERMS_FILE};

/// One vocabulary entry: where the term string lives, where its postings
/// block starts, and how many quanta it has.
#[derive(Debug, Clone, Copy)]
pub struct VocabEntry {
    pub term_offset: u64,
    pub postings_offset: u64,
    pub impacts: u64,
}

/// One parsed quantum header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantumHeader {
    pub impact: u16,
    pub start: u64,
    pub end: u64,
    pub count: u32,
}

pub struct Index {
    postings: Mmap,
    strings: Vec<u8>,
    doclist: Vec<u8>,
    entries: Vec<VocabEntry>,
    key_offsets: Vec<u64>,
    codec_id: CodecId,
    codec: Box<dyn Codec>,
}

#[inline]
fn read_u16_at(buf: &[u8], at: usize, file: &'static str) -> Result<u16> {
    buf.get(at..at + 2)
        .map(|b| u16::from_le_bytes(b.try_into().unwrap()))
        .ok_or_else(|| Error::corrupt(file, format!("short read at offset {at}")))
}

#[inline]
fn read_u32_at(buf: &[u8], at: usize, file: &'static str) -> Result<u32> {
    buf.get(at..at + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
        .ok_or_else(|| Error::corrupt(file, format!("short read at offset {at}")))
}

#[inline]
fn read_u64_at(buf: &[u8], at: usize, file: &'static str) -> Result<u64> {
    buf.get(at..at + 8)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
        .ok_or_else(|| Error::corrupt(file, format!("short read at offset {at}")))
}

impl Index {
    /// Open the four CI files in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let postings_file = File::open(dir.join(POSTINGS_FILE))?;
        // Read-only map of an immutable file.
        let postings = unsafe { Mmap::map(&postings_file)? };
        let strings = std::fs::read(dir.join(VOCAB_TERMS_FILE))?;
        let vocab = std::fs::read(dir.join(VOCAB_FILE))?;
        let doclist = std::fs::read(dir.join(DOCLIST_FILE))?;

        let tag = *postings
            .first()
            .ok_or_else(|| Error::corrupt(POSTINGS_FILE, "empty file"))?;
        let codec_id = CodecId::from_tag(tag).ok_or(Error::UnknownCodec(tag))?;

        let entries = parse_vocabulary(&vocab, strings.len() as u64, postings.len() as u64)?;
        let key_offsets = parse_doclist(&doclist)?;

        info!(
            "index opened: {} terms, {} documents, {} codec",
            entries.len(),
            key_offsets.len(),
            codec_id.as_str()
        );
        Ok(Index {
            postings,
            strings,
            doclist,
            entries,
            key_offsets,
            codec_id,
            codec: codecs::create_codec(codec_id),
        })
    }

    pub fn documents(&self) -> usize {
        self.key_offsets.len()
    }

    pub fn terms(&self) -> usize {
        self.entries.len()
    }

    pub fn codec_id(&self) -> CodecId {
        self.codec_id
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    /// The raw postings bytes (tag byte included; offsets are absolute).
    pub fn postings_bytes(&self) -> &[u8] {
        &self.postings
    }

    /// The NUL-terminated term string starting at `offset`.
    fn term_at(&self, offset: u64) -> &[u8] {
        let start = offset as usize;
        let end = self.strings[start..]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.strings.len(), |nul| start + nul);
        &self.strings[start..end]
    }

    /// Binary-search the vocabulary by byte-wise comparison.
    pub fn lookup(&self, term: &str) -> Option<VocabEntry> {
        self.entries
            .binary_search_by(|entry| self.term_at(entry.term_offset).cmp(term.as_bytes()))
            .ok()
            .map(|at| self.entries[at])
    }

    /// Iterate the vocabulary in file order (ascending term strings).
    pub fn vocabulary(&self) -> impl Iterator<Item = (&[u8], VocabEntry)> + '_ {
        self.entries
            .iter()
            .map(|&entry| (self.term_at(entry.term_offset), entry))
    }

    /// Parse and validate a term's quantum headers, descending impact order.
    pub fn quantum_headers(&self, entry: &VocabEntry) -> Result<Vec<QuantumHeader>> {
        let mut headers: Vec<QuantumHeader> = Vec::with_capacity(entry.impacts as usize);
        for i in 0..entry.impacts {
            let slot = entry.postings_offset + i * 8;
            let at = read_u64_at(&self.postings, slot as usize, POSTINGS_FILE)? as usize;
            let impact = read_u16_at(&self.postings, at, POSTINGS_FILE)?;
            let start = read_u64_at(&self.postings, at + 2, POSTINGS_FILE)?;
            let end = read_u64_at(&self.postings, at + 10, POSTINGS_FILE)?;
            let count = read_u32_at(&self.postings, at + 18, POSTINGS_FILE)?;
            if end < start || end > self.postings.len() as u64 {
                return Err(Error::corrupt(
                    POSTINGS_FILE,
                    format!("quantum payload [{start}, {end}) out of bounds"),
                ));
            }
            if count == 0 || impact == 0 {
                return Err(Error::corrupt(
                    POSTINGS_FILE,
                    "empty quantum inside a header block",
                ));
            }
            if end - start < self.codec.min_bytes(count as usize) as u64 {
                return Err(Error::corrupt(
                    POSTINGS_FILE,
                    format!(
                        "quantum payload of {} bytes cannot hold {count} postings",
                        end - start
                    ),
                ));
            }
            if headers.last().is_some_and(|previous| previous.impact < impact) {
                return Err(Error::corrupt(POSTINGS_FILE, "quantum impacts out of order"));
            }
            headers.push(QuantumHeader {
                impact,
                start,
                end,
                count,
            });
        }
        Ok(headers)
    }

    /// O(1) docid → external primary key. Ids count from 1.
    pub fn primary_key(&self, docid: u32) -> &str {
        let start = self.key_offsets[docid as usize - 1] as usize;
        let end = self.doclist[start..]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.doclist.len(), |nul| start + nul);
        std::str::from_utf8(&self.doclist[start..end]).unwrap_or("")
    }
}

/// Parse `CIvocab.bin`, sniffing the format: a file of valid fixed 24-byte
/// triples is JASS-v1, anything else is parsed as the vbyte JASS-v2 stream.
fn parse_vocabulary(vocab: &[u8], strings_len: u64, postings_len: u64) -> Result<Vec<VocabEntry>> {
    if vocab.is_empty() {
        return Ok(Vec::new());
    }
    if vocab.len() % 24 == 0 {
        if let Some(entries) = try_parse_v1(vocab, strings_len, postings_len) {
            return Ok(entries);
        }
    }
    parse_v2(vocab, strings_len, postings_len)
}

fn entry_is_plausible(
    entry: &VocabEntry,
    previous_term: Option<u64>,
    strings_len: u64,
    postings_len: u64,
) -> bool {
    entry.term_offset < strings_len
        && entry.postings_offset >= 1
        && entry.postings_offset < postings_len
        && entry.impacts >= 1
        && entry.impacts <= u16::MAX as u64 + 1
        && previous_term.map_or(entry.term_offset == 0, |p| entry.term_offset > p)
}

fn try_parse_v1(vocab: &[u8], strings_len: u64, postings_len: u64) -> Option<Vec<VocabEntry>> {
    let mut entries = Vec::with_capacity(vocab.len() / 24);
    let mut previous_term = None;
    for triple in vocab.chunks_exact(24) {
        let entry = VocabEntry {
            term_offset: u64::from_le_bytes(triple[0..8].try_into().unwrap()),
            postings_offset: u64::from_le_bytes(triple[8..16].try_into().unwrap()),
            impacts: u64::from_le_bytes(triple[16..24].try_into().unwrap()),
        };
        if !entry_is_plausible(&entry, previous_term, strings_len, postings_len) {
            return None;
        }
        previous_term = Some(entry.term_offset);
        entries.push(entry);
    }
    Some(entries)
}

fn parse_v2(vocab: &[u8], strings_len: u64, postings_len: u64) -> Result<Vec<VocabEntry>> {
    let mut entries = Vec::new();
    let mut at = 0;
    let mut previous_term = None;
    while at < vocab.len() {
        let mut field = [0u64; 3];
        for slot in &mut field {
            let (value, used) = variable_byte::read(&vocab[at..])
                .ok_or_else(|| Error::corrupt(VOCAB_FILE, "truncated vbyte triple"))?;
            *slot = value;
            at += used;
        }
        let entry = VocabEntry {
            term_offset: field[0],
            postings_offset: field[1],
            impacts: field[2],
        };
        if !entry_is_plausible(&entry, previous_term, strings_len, postings_len) {
            return Err(Error::corrupt(
                VOCAB_FILE,
                format!("implausible vocabulary entry at byte {at}"),
            ));
        }
        previous_term = Some(entry.term_offset);
        entries.push(entry);
    }
    Ok(entries)
}

/// Parse `CIdoclist.bin`: keys, then a u64 offset per document, then the
/// u64 document count.
fn parse_doclist(doclist: &[u8]) -> Result<Vec<u64>> {
    if doclist.len() < 8 {
        return Err(Error::corrupt(DOCLIST_FILE, "missing document count"));
    }
    let count = read_u64_at(doclist, doclist.len() - 8, DOCLIST_FILE)?;
    let table_bytes = count
        .checked_mul(8)
        .and_then(|b| b.checked_add(8))
        .ok_or_else(|| Error::corrupt(DOCLIST_FILE, "document count overflow"))?;
    if table_bytes > doclist.len() as u64 {
        return Err(Error::corrupt(
            DOCLIST_FILE,
            format!("document count {count} larger than the file"),
        ));
    }
    let keys_end = doclist.len() as u64 - table_bytes;
    let mut offsets = Vec::with_capacity(count as usize);
    for i in 0..count {
        let offset = read_u64_at(doclist, (keys_end + i * 8) as usize, DOCLIST_FILE)?;
        if offset >= keys_end {
            return Err(Error::corrupt(
                DOCLIST_FILE,
                format!("primary key offset {offset} past the key block"),
            ));
        }
        offsets.push(offset);
    }
    Ok(offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::{QuantizedIndex, QuantizedTerm, Quantum};
    use crate::serialise::{IndexWriter, VocabFormat};
    use tempfile::tempdir;

    fn fixture() -> QuantizedIndex {
        QuantizedIndex {
            terms: vec![
                QuantizedTerm {
                    term: "alpha".into(),
                    quanta: vec![
                        Quantum { impact: 8, docids: vec![1, 3, 5] },
                        Quantum { impact: 2, docids: vec![2] },
                    ],
                },
                QuantizedTerm {
                    term: "beta".into(),
                    quanta: vec![Quantum { impact: 4, docids: vec![3, 5, 7] }],
                },
            ],
            primary_keys: (1..=7).map(|i| format!("doc-{i}")).collect(),
        }
    }

    fn write_and_open(codec: CodecId, vocab: VocabFormat) -> (tempfile::TempDir, Index) {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path(), codec, vocab)
            .write(&fixture())
            .unwrap();
        let index = Index::open(dir.path()).unwrap();
        (dir, index)
    }

    #[test]
    fn round_trip_both_vocab_formats() {
        for vocab in [VocabFormat::V1, VocabFormat::V2] {
            let (_dir, index) = write_and_open(CodecId::VariableByte, vocab);
            assert_eq!(index.terms(), 2);
            assert_eq!(index.documents(), 7);
            assert_eq!(index.codec_id(), CodecId::VariableByte);

            let alpha = index.lookup("alpha").unwrap();
            assert_eq!(alpha.impacts, 2);
            let headers = index.quantum_headers(&alpha).unwrap();
            assert_eq!(headers.len(), 2);
            assert_eq!(headers[0].impact, 8);
            assert_eq!(headers[0].count, 3);
            assert_eq!(headers[1].impact, 2);

            assert!(index.lookup("aardvark").is_none());
            assert!(index.lookup("zebra").is_none());
            assert_eq!(index.primary_key(1), "doc-1");
            assert_eq!(index.primary_key(7), "doc-7");
        }
    }

    #[test]
    fn vocabulary_iterates_in_sorted_order() {
        let (_dir, index) = write_and_open(CodecId::VariableByte, VocabFormat::V1);
        let terms: Vec<&[u8]> = index.vocabulary().map(|(term, _)| term).collect();
        assert_eq!(terms, vec![b"alpha".as_slice(), b"beta".as_slice()]);
        let mut sorted = terms.clone();
        sorted.sort();
        assert_eq!(terms, sorted);
    }

    #[test]
    fn payload_decodes_through_the_tagged_codec() {
        for codec in [CodecId::Uncompressed, CodecId::Simple8b, CodecId::Qmx] {
            let (_dir, index) = write_and_open(codec, VocabFormat::V1);
            let beta = index.lookup("beta").unwrap();
            let headers = index.quantum_headers(&beta).unwrap();
            let header = headers[0];
            let payload = &index.postings_bytes()[header.start as usize..header.end as usize];
            let mut decoded = vec![0u32; header.count as usize + crate::codecs::DECODE_SLACK];
            index.codec().decode(payload, header.count as usize, &mut decoded);
            let docids: Vec<u32> = match index.codec().deltas() {
                crate::codecs::DeltaMode::D1 => {
                    let mut sum = 0;
                    decoded[..3]
                        .iter()
                        .map(|&gap| {
                            sum += gap;
                            sum + 1
                        })
                        .collect()
                }
                _ => decoded[..3].iter().map(|&d| d + 1).collect(),
            };
            assert_eq!(docids, vec![3, 5, 7], "codec {codec:?}");
        }
    }

    #[test]
    fn bad_codec_tag_is_fatal() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path(), CodecId::VariableByte, VocabFormat::V1)
            .write(&fixture())
            .unwrap();
        let path = dir.path().join(POSTINGS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] = b'z';
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(Index::open(dir.path()), Err(Error::UnknownCodec(b'z'))));
    }

    #[test]
    fn payload_too_short_for_its_count_is_fatal() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path(), CodecId::VariableByte, VocabFormat::V1)
            .write(&fixture())
            .unwrap();
        let path = dir.path().join(POSTINGS_FILE);
        let mut bytes = std::fs::read(&path).unwrap();
        // First term block: two header offsets after the tag byte, then the
        // first header, whose count is its last field. Inflate the count so
        // its three-byte payload can no longer hold it.
        let count_at = 1 + 2 * 8 + 18;
        bytes[count_at..count_at + 4].copy_from_slice(&1000u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let index = Index::open(dir.path()).unwrap();
        let alpha = index.lookup("alpha").unwrap();
        assert!(matches!(
            index.quantum_headers(&alpha),
            Err(Error::Corrupt { file: POSTINGS_FILE, .. })
        ));
    }

    #[test]
    fn truncated_doclist_is_fatal() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path(), CodecId::VariableByte, VocabFormat::V1)
            .write(&fixture())
            .unwrap();
        let path = dir.path().join(DOCLIST_FILE);
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(matches!(
            Index::open(dir.path()),
            Err(Error::Corrupt { file: DOCLIST_FILE, .. })
        ));
    }
}
