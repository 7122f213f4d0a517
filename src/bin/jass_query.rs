//! jass_query - evaluate bag-of-words queries against an impact-ordered index
//!
//! Reads one query per line (`QID term term ...`) and writes a TREC run to
//! standard output. The index is shared read-only across worker threads;
//! every worker owns its accumulator table, heap and scratch buffers.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use log::info;
use rayon::prelude::*;

use jass::query::{self, Context, Mode, SearchOptions};
use jass::stem::Porter;
use jass::tokenizer::Tokenizer;
use jass::Index;

#[derive(Parser, Debug)]
#[command(
    name = "jass_query",
    version = jass::VERSION,
    about = "Score-at-a-Time query evaluation"
)]
struct Args {
    /// File of queries, one `QID term term ...` per line.
    queryfile: PathBuf,

    /// Number of results per query.
    #[arg(long, short = 'k', default_value_t = 10)]
    top_k: usize,

    /// Anytime budget: maximum postings to process per query.
    #[arg(long)]
    postings_budget: Option<u64>,

    /// Decode each quantum fully before scoring it instead of interleaving.
    #[arg(long, short = 'd')]
    decompress_then_process: bool,

    /// Directory holding the index files.
    #[arg(long, default_value = ".")]
    index: PathBuf,

    /// Disable the top-k-stable early exit in exhaustive mode.
    #[arg(long)]
    no_early_exit: bool,

    /// Stem query terms with Porter (v1), for indexes built --stem-porter.
    #[arg(long)]
    stem_porter: bool,

    /// Worker threads; each owns one query context.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Emit a per-query stats line after each query's results.
    #[arg(long)]
    stats: bool,
}

fn run(args: &Args) -> jass::Result<()> {
    let index = Index::open(&args.index)?;
    let options = SearchOptions {
        mode: match args.postings_budget {
            Some(budget) => Mode::Anytime { budget },
            None => Mode::Exhaustive { early_exit: !args.no_early_exit },
        },
        decompress_then_process: args.decompress_then_process,
    };
    info!(
        "{} documents, {} terms, top-k {}, mode {:?}",
        index.documents(),
        index.terms(),
        args.top_k,
        options.mode
    );

    let tokenizer = Tokenizer::default();
    let stemmer = args.stem_porter.then_some(Porter);
    let queries: Vec<(String, Vec<String>)> = {
        let reader = BufReader::new(File::open(&args.queryfile)?);
        reader
            .lines()
            .collect::<std::io::Result<Vec<_>>>()?
            .iter()
            .filter_map(|line| query::parse_query_line(line, &tokenizer, stemmer.as_ref()))
            .collect()
    };

    // Chunk the query stream over the workers; results are buffered per
    // query so the output order matches the input order.
    let chunk_size = queries.len().div_ceil(args.threads.max(1)).max(1);
    let outputs: Vec<jass::Result<String>> = queries
        .par_chunks(chunk_size)
        .flat_map_iter(|chunk| {
            let mut context = Context::new(&index, args.top_k);
            let index = &index;
            let options = &options;
            chunk.iter().map(move |(qid, terms)| {
                let result = context.search(index, terms, options)?;
                let mut out = Vec::new();
                query::write_trec_run(&mut out, qid, index, &result)
                    .expect("writing to a Vec cannot fail");
                let mut text = String::from_utf8(out).expect("run output is UTF-8");
                if args.stats {
                    text.push_str(&format!(
                        "# {qid} ns:{} postings:{} quanta:{} early_exit:{} saturated:{}\n",
                        result.elapsed.as_nanos(),
                        result.postings_processed,
                        result.quanta_processed,
                        result.early_terminated,
                        result.saturated,
                    ));
                }
                Ok(text)
            })
        })
        .collect();

    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    for output in outputs {
        lock.write_all(output?.as_bytes())?;
    }
    lock.flush()?;
    Ok(())
}

fn main() {
    env_logger::init();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if e.use_stderr() {
                eprint!("{e}");
                exit(1);
            }
            print!("{e}");
            exit(0);
        }
    };
    if args.top_k == 0 {
        eprintln!("jass_query: --top-k must be at least 1");
        exit(1);
    }
    if args.threads > 1 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
        {
            eprintln!("jass_query: {e}");
            exit(2);
        }
    }
    if let Err(e) = run(&args) {
        eprintln!("jass_query: {e}");
        exit(2);
    }
}
