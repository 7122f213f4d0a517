//! jass_index - build an impact-ordered index from a document collection

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::exit;

use bumpalo::Bump;
use clap::Parser;
use log::info;

use jass::codecs::CodecId;
use jass::error::Result;
use jass::indexer::Indexer;
use jass::quantize::{self, AtireBm25};
use jass::serialise::{self, IndexWriter, VocabFormat};
use jass::source::{FastaSource, TrecSource, UnicoilSource};

#[derive(Parser, Debug)]
#[command(
    name = "jass_index",
    version = jass::VERSION,
    about = "Build an impact-ordered Score-at-a-Time index"
)]
struct Args {
    /// File of documents to index.
    #[arg(long, short = 'f')]
    filename: PathBuf,

    /// Directory to write the index files into.
    #[arg(long, default_value = ".")]
    index_dir: PathBuf,

    /// Write a JASS v1 vocabulary (fixed 64-bit triples).
    #[arg(long = "index-v1")]
    index_v1: bool,

    /// Write a JASS v2 vocabulary (variable-byte triples). The default.
    #[arg(long = "index-v2")]
    index_v2: bool,

    /// Also dump the impact-ordered postings as raw uint32 segments.
    #[arg(long = "index-uint32")]
    index_uint32: bool,

    /// Also write a text forward index.
    #[arg(long = "index-forward")]
    index_forward: bool,

    /// Also generate the index as Rust source arrays.
    #[arg(long = "index-compiled")]
    index_compiled: bool,

    /// Input format: TREC, FASTA or JSON-uniCOIL.
    #[arg(long, default_value = "TREC")]
    document_format: String,

    /// Stem terms with Porter (v1) before indexing.
    #[arg(long)]
    stem_porter: bool,

    /// Index FASTA sequences as k-mers of this length (implies FASTA input).
    #[arg(long)]
    fasta_kmer: Option<usize>,

    /// Log progress every N documents.
    #[arg(long, short = 'N')]
    report_every: Option<usize>,

    /// Postings codec.
    #[arg(long, default_value = "vbyte")]
    codec: String,

    /// Quantization bit width: impacts land in [1, 2^bits - 1].
    #[arg(long, default_value_t = 8)]
    quantum_bits: u32,
}

enum Format {
    Trec,
    Fasta(usize),
    Unicoil,
}

fn usage_error(message: &str) -> ! {
    eprintln!("jass_index: {message}");
    exit(1);
}

fn parse_format(args: &Args) -> Format {
    let named = match args.document_format.to_uppercase().as_str() {
        "TREC" => Format::Trec,
        "FASTA" => Format::Fasta(args.fasta_kmer.unwrap_or_else(|| {
            usage_error("FASTA input needs --fasta-kmer");
        })),
        "JSON-UNICOIL" => Format::Unicoil,
        other => usage_error(&format!("unknown document format {other}")),
    };
    match (named, args.fasta_kmer) {
        (Format::Trec, Some(k)) => Format::Fasta(k),
        (Format::Unicoil, Some(_)) => usage_error("only one input format at a time"),
        (format, _) => format,
    }
}

fn run(args: &Args) -> Result<()> {
    let format = parse_format(args);
    if matches!(format, Format::Fasta(0)) {
        usage_error("--fasta-kmer must be at least 1");
    }
    let codec = CodecId::from_name(&args.codec)
        .unwrap_or_else(|| usage_error(&format!("unknown codec {}", args.codec)));
    let vocab = if args.index_v1 { VocabFormat::V1 } else { VocabFormat::V2 };
    if !(1..=16).contains(&args.quantum_bits) {
        usage_error("--quantum-bits must be between 1 and 16");
    }
    let max_quantum = ((1u32 << args.quantum_bits) - 1) as u16;

    let file = match File::open(&args.filename) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("jass_index: can't read {}: {e}", args.filename.display());
            exit(2);
        }
    };
    let reader = BufReader::new(file);

    let arena = Bump::new();
    let mut indexer = Indexer::new(&arena).report_every(args.report_every.unwrap_or(0));
    if args.stem_porter {
        indexer = indexer.with_stemmer();
    }

    let mut pre_quantized = false;
    match format {
        Format::Trec => {
            let mut batch = Vec::with_capacity(1024);
            for document in TrecSource::new(reader) {
                batch.push(document?);
                if batch.len() == batch.capacity() {
                    indexer.add_batch(&batch);
                    batch.clear();
                }
            }
            indexer.add_batch(&batch);
        }
        Format::Fasta(k) => {
            for document in FastaSource::new(reader) {
                indexer.add_document_kmers(&document?, k);
            }
        }
        Format::Unicoil => {
            pre_quantized = true;
            for document in UnicoilSource::new(reader) {
                indexer.add_vector(&document?);
            }
        }
    }

    let collected = indexer.finish();
    std::fs::create_dir_all(&args.index_dir)?;
    if args.index_forward {
        serialise::write_forward_index(&args.index_dir, &collected)?;
    }

    let quantized = if pre_quantized {
        quantize::passthrough(&collected)
    } else {
        quantize::quantize(&collected, AtireBm25::default(), max_quantum)
    };

    IndexWriter::new(&args.index_dir, codec, vocab).write(&quantized)?;
    if args.index_uint32 {
        serialise::write_uint32_dump(&args.index_dir, &quantized)?;
    }
    if args.index_compiled {
        serialise::write_compiled(&args.index_dir, &quantized)?;
    }
    info!(
        "indexed {} documents from {}",
        quantized.documents(),
        args.filename.display()
    );
    Ok(())
}

fn main() {
    env_logger::init();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Help/version requests are not usage errors.
            if e.use_stderr() {
                eprint!("{e}");
                exit(1);
            }
            print!("{e}");
            exit(0);
        }
    };
    if args.index_v1 && args.index_v2 {
        usage_error("choose one of --index-v1 and --index-v2");
    }
    if let Err(e) = run(&args) {
        eprintln!("jass_index: {e}");
        exit(2);
    }
}
