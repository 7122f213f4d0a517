//! Index serialization: the four CI files plus auxiliary dumps
//!
//! `CIpostings.bin` layout, per term, in vocabulary order:
//!   - one absolute u64 offset per quantum header,
//!   - the headers, packed `(u16 impact, u64 start, u64 end, u32 count)`,
//!   - a zero header terminating the block,
//!   - the payloads in descending-impact order, each aligned for the codec.
//! Byte 0 of the file is the codec tag. All offsets are absolute from the
//! start of the file; `start`/`end` bracket the unpadded payload bytes.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use log::info;

use crate::codecs::{self, Codec, CodecId, DeltaMode};
use crate::error::{Error, Result};
use crate::indexer::CollectedIndex;
use crate::quantize::{QuantizedIndex, Quantum};

pub const VOCAB_TERMS_FILE: &str = "CIvocab_terms.bin";
pub const VOCAB_FILE: &str = "CIvocab.bin";
pub const POSTINGS_FILE: &str = "CIpostings.bin";
pub const DOCLIST_FILE: &str = "CIdoclist.bin";

/// Packed size of one quantum header.
pub const QUANTUM_HEADER_BYTES: u64 = 2 + 8 + 8 + 4;

/// How the vocabulary triples are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabFormat {
    /// Three raw u64 little-endian fields per term.
    V1,
    /// The same three numbers, variable-byte encoded back-to-back.
    V2,
}

#[inline]
fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Turn a quantum's ascending one-based docids into the codec's input form.
pub(crate) fn codec_input(quantum: &Quantum, deltas: DeltaMode) -> Vec<u32> {
    match deltas {
        // Gap-coded: first value is docid-1, the rest are gaps.
        DeltaMode::D1 => {
            let mut out = Vec::with_capacity(quantum.docids.len());
            let mut previous = 1;
            for &docid in &quantum.docids {
                out.push(docid - previous);
                previous = docid;
            }
            out
        }
        // Zero-based absolutes; D4 differencing happens inside the codec.
        DeltaMode::D0 | DeltaMode::D4 => quantum.docids.iter().map(|&d| d - 1).collect(),
    }
}

pub struct IndexWriter {
    dir: PathBuf,
    codec_id: CodecId,
    vocab: VocabFormat,
}

impl IndexWriter {
    pub fn new(dir: impl AsRef<Path>, codec_id: CodecId, vocab: VocabFormat) -> Self {
        IndexWriter {
            dir: dir.as_ref().to_path_buf(),
            codec_id,
            vocab,
        }
    }

    /// Write all four CI files. The index commits by closing.
    pub fn write(&self, index: &QuantizedIndex) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let codec = codecs::create_codec(self.codec_id);
        let alignment = codec.alignment() as u64;

        let mut postings = BufWriter::new(File::create(self.dir.join(POSTINGS_FILE))?);
        let mut strings = BufWriter::new(File::create(self.dir.join(VOCAB_TERMS_FILE))?);

        postings.write_u8(self.codec_id.tag())?;
        let mut postings_at: u64 = 1;
        let mut strings_at: u64 = 0;
        let mut entries: Vec<(u64, u64, u64)> = Vec::with_capacity(index.terms.len());

        for term in &index.terms {
            let k = term.quanta.len() as u64;
            let payloads = self.encode_payloads(codec.as_ref(), &term.quanta)?;

            // Lay the block out before writing anything.
            let headers_start = postings_at + k * 8;
            let after_zero = headers_start + (k + 1) * QUANTUM_HEADER_BYTES;
            let mut payload_at = align_up(after_zero, alignment);
            let mut headers: Vec<(u16, u64, u64, u32)> = Vec::with_capacity(term.quanta.len());
            for (quantum, payload) in term.quanta.iter().zip(&payloads) {
                let end = payload_at + payload.len() as u64;
                headers.push((quantum.impact, payload_at, end, quantum.docids.len() as u32));
                payload_at = align_up(end, alignment);
            }

            for i in 0..k {
                postings.write_u64::<LittleEndian>(headers_start + i * QUANTUM_HEADER_BYTES)?;
            }
            for &(impact, start, end, count) in &headers {
                postings.write_u16::<LittleEndian>(impact)?;
                postings.write_u64::<LittleEndian>(start)?;
                postings.write_u64::<LittleEndian>(end)?;
                postings.write_u32::<LittleEndian>(count)?;
            }
            postings.write_all(&[0u8; QUANTUM_HEADER_BYTES as usize])?;

            let mut at = after_zero;
            for (payload, &(_, start, end, _)) in payloads.iter().zip(&headers) {
                write_zeros(&mut postings, start - at)?;
                postings.write_all(payload)?;
                at = end;
            }
            write_zeros(&mut postings, payload_at - at)?;

            entries.push((strings_at, postings_at, k));
            strings.write_all(term.term.as_bytes())?;
            strings.write_u8(0)?;
            strings_at += term.term.len() as u64 + 1;
            postings_at = payload_at;
        }
        postings.flush()?;
        strings.flush()?;

        self.write_vocabulary(&entries)?;
        self.write_doclist(&index.primary_keys)?;
        info!(
            "serialized {} terms over {} documents ({} vocabulary, {} codec)",
            index.terms.len(),
            index.documents(),
            match self.vocab {
                VocabFormat::V1 => "v1",
                VocabFormat::V2 => "v2",
            },
            codec.name(),
        );
        Ok(())
    }

    fn encode_payloads(&self, codec: &dyn Codec, quanta: &[Quantum]) -> Result<Vec<Vec<u8>>> {
        quanta
            .iter()
            .map(|quantum| {
                let input = codec_input(quantum, codec.deltas());
                let mut buffer = vec![0u8; input.len() * 10 + 1024];
                match codec.encode(&input, &mut buffer) {
                    Some(used) => {
                        buffer.truncate(used);
                        Ok(buffer)
                    }
                    None => Err(Error::EncodeOverflow(input.len())),
                }
            })
            .collect()
    }

    fn write_vocabulary(&self, entries: &[(u64, u64, u64)]) -> Result<()> {
        let mut vocab = BufWriter::new(File::create(self.dir.join(VOCAB_FILE))?);
        for &(term, offset, impacts) in entries {
            match self.vocab {
                VocabFormat::V1 => {
                    vocab.write_u64::<LittleEndian>(term)?;
                    vocab.write_u64::<LittleEndian>(offset)?;
                    vocab.write_u64::<LittleEndian>(impacts)?;
                }
                VocabFormat::V2 => {
                    let mut buffer = Vec::with_capacity(16);
                    codecs::variable_byte::push_u64(term, &mut buffer);
                    codecs::variable_byte::push_u64(offset, &mut buffer);
                    codecs::variable_byte::push_u64(impacts, &mut buffer);
                    vocab.write_all(&buffer)?;
                }
            }
        }
        vocab.flush()?;
        Ok(())
    }

    fn write_doclist(&self, primary_keys: &[String]) -> Result<()> {
        let mut doclist = BufWriter::new(File::create(self.dir.join(DOCLIST_FILE))?);
        let mut offsets = Vec::with_capacity(primary_keys.len());
        let mut at: u64 = 0;
        for key in primary_keys {
            offsets.push(at);
            doclist.write_all(key.as_bytes())?;
            doclist.write_u8(0)?;
            at += key.len() as u64 + 1;
        }
        for offset in offsets {
            doclist.write_u64::<LittleEndian>(offset)?;
        }
        doclist.write_u64::<LittleEndian>(primary_keys.len() as u64)?;
        doclist.flush()?;
        Ok(())
    }
}

fn write_zeros<W: Write>(writer: &mut W, count: u64) -> Result<()> {
    const ZEROS: [u8; 64] = [0; 64];
    let mut remaining = count as usize;
    while remaining > 0 {
        let chunk = remaining.min(ZEROS.len());
        writer.write_all(&ZEROS[..chunk])?;
        remaining -= chunk;
    }
    Ok(())
}

/// Binary dump of the impact-ordered postings: per quantum, a u32 count then
/// the zero-based docids, raw little-endian. For codec experiments.
pub fn write_uint32_dump(dir: impl AsRef<Path>, index: &QuantizedIndex) -> Result<()> {
    let mut out = BufWriter::new(File::create(dir.as_ref().join("CIpostings_uint32.bin"))?);
    for term in &index.terms {
        for quantum in &term.quanta {
            out.write_u32::<LittleEndian>(quantum.docids.len() as u32)?;
            for &docid in &quantum.docids {
                out.write_u32::<LittleEndian>(docid - 1)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Text forward index: one line per document, `key<TAB>term:tf ...`.
pub fn write_forward_index(dir: impl AsRef<Path>, index: &CollectedIndex) -> Result<()> {
    let mut forward: Vec<Vec<(&str, u16)>> = vec![Vec::new(); index.documents()];
    for (term, postings) in &index.terms {
        for &(docid, tf) in postings {
            forward[docid as usize - 1].push((term, tf));
        }
    }
    let mut out = BufWriter::new(File::create(dir.as_ref().join("CIforward.txt"))?);
    for (key, terms) in index.primary_keys.iter().zip(forward) {
        write!(out, "{key}")?;
        for (i, (term, tf)) in terms.iter().enumerate() {
            out.write_all(if i == 0 { b"\t" } else { b" " })?;
            write!(out, "{term}:{tf}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Generated-source index: the doclist and quanta as Rust statics, for
/// embedding a small collection straight into a binary.
pub fn write_compiled(dir: impl AsRef<Path>, index: &QuantizedIndex) -> Result<()> {
    let mut out = BufWriter::new(File::create(dir.as_ref().join("CIcompiled.rs"))?);
    writeln!(out, "// Generated by jass_index; do not edit.")?;
    writeln!(out, "pub static DOCLIST: [&str; {}] = [", index.documents())?;
    for key in &index.primary_keys {
        writeln!(out, "    {:?},", key)?;
    }
    writeln!(out, "];")?;
    writeln!(
        out,
        "pub static POSTINGS: [(&str, &[(u16, &[u32])]); {}] = [",
        index.terms.len()
    )?;
    for term in &index.terms {
        write!(out, "    ({:?}, &[", term.term)?;
        for quantum in &term.quanta {
            write!(out, "({}, &{:?}[..]), ", quantum.impact, quantum.docids)?;
        }
        writeln!(out, "]),")?;
    }
    writeln!(out, "];")?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::QuantizedTerm;
    use tempfile::tempdir;

    fn two_term_index() -> QuantizedIndex {
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

    #[test]
    fn postings_file_shape() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path(), CodecId::VariableByte, VocabFormat::V1)
            .write(&two_term_index())
            .unwrap();

        let postings = std::fs::read(dir.path().join(POSTINGS_FILE)).unwrap();
        assert_eq!(postings[0], b'c');

        // First term block: two header offsets right after the tag byte.
        let first_offset = u64::from_le_bytes(postings[1..9].try_into().unwrap());
        assert_eq!(first_offset, 1 + 2 * 8);
        let second_offset = u64::from_le_bytes(postings[9..17].try_into().unwrap());
        assert_eq!(second_offset, first_offset + QUANTUM_HEADER_BYTES);

        // First header: impact 8, three postings.
        let header = &postings[17..17 + QUANTUM_HEADER_BYTES as usize];
        assert_eq!(u16::from_le_bytes(header[0..2].try_into().unwrap()), 8);
        let start = u64::from_le_bytes(header[2..10].try_into().unwrap());
        let end = u64::from_le_bytes(header[10..18].try_into().unwrap());
        assert_eq!(u32::from_le_bytes(header[18..22].try_into().unwrap()), 3);

        // Payload: gaps 0,2,2 vbyte-coded, one byte each, high bit set.
        assert_eq!(&postings[start as usize..end as usize], &[0x80, 0x82, 0x82]);

        // The zero terminator header sits after the two real headers.
        let zero_at = (17 + 2 * QUANTUM_HEADER_BYTES) as usize;
        assert!(postings[zero_at..zero_at + QUANTUM_HEADER_BYTES as usize]
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn vocabulary_formats() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path(), CodecId::VariableByte, VocabFormat::V1)
            .write(&two_term_index())
            .unwrap();
        let v1 = std::fs::read(dir.path().join(VOCAB_FILE)).unwrap();
        assert_eq!(v1.len(), 2 * 24);
        // First entry: term offset 0, postings offset 1.
        assert_eq!(u64::from_le_bytes(v1[0..8].try_into().unwrap()), 0);
        assert_eq!(u64::from_le_bytes(v1[8..16].try_into().unwrap()), 1);
        assert_eq!(u64::from_le_bytes(v1[16..24].try_into().unwrap()), 2);

        IndexWriter::new(dir.path(), CodecId::VariableByte, VocabFormat::V2)
            .write(&two_term_index())
            .unwrap();
        let v2 = std::fs::read(dir.path().join(VOCAB_FILE)).unwrap();
        // Small numbers: one vbyte each, six values across two entries.
        assert_eq!(v2.len(), 6);
        assert_eq!(v2[0], 0x80);
        assert_eq!(v2[1], 0x81);
        assert_eq!(v2[2], 0x82);
    }

    #[test]
    fn doclist_tail_is_offsets_then_count() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path(), CodecId::VariableByte, VocabFormat::V1)
            .write(&two_term_index())
            .unwrap();
        let doclist = std::fs::read(dir.path().join(DOCLIST_FILE)).unwrap();
        let count = u64::from_le_bytes(doclist[doclist.len() - 8..].try_into().unwrap());
        assert_eq!(count, 7);
        let offsets_at = doclist.len() - 8 - 7 * 8;
        let first = u64::from_le_bytes(doclist[offsets_at..offsets_at + 8].try_into().unwrap());
        assert_eq!(first, 0);
        assert_eq!(&doclist[0..6], b"doc-1\0");
    }

    #[test]
    fn aligned_codecs_pad_payloads() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path(), CodecId::Qmx, VocabFormat::V1)
            .write(&two_term_index())
            .unwrap();
        let postings = std::fs::read(dir.path().join(POSTINGS_FILE)).unwrap();
        let header_at = 1 + 2 * 8;
        let start = u64::from_le_bytes(postings[header_at + 2..header_at + 10].try_into().unwrap());
        assert_eq!(start % 16, 0);
    }

    #[test]
    fn uint32_dump_counts_then_ids() {
        let dir = tempdir().unwrap();
        write_uint32_dump(dir.path(), &two_term_index()).unwrap();
        let dump = std::fs::read(dir.path().join("CIpostings_uint32.bin")).unwrap();
        assert_eq!(u32::from_le_bytes(dump[0..4].try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(dump[4..8].try_into().unwrap()), 0);
        assert_eq!(u32::from_le_bytes(dump[8..12].try_into().unwrap()), 2);
    }
}
