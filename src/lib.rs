//! JASS - Impact-ordered Score-at-a-Time search engine
//!
//! The index stores, for every term, a list of *quanta*: runs of document ids
//! that all share one pre-computed, quantized impact score. Query evaluation
//! walks the quanta of all query terms in descending impact order, adding each
//! quantum's impact into a table of 16-bit accumulators, and stops either when
//! a postings budget is exhausted (anytime mode) or when no further quantum
//! can re-order the current top-k (exhaustive mode with early exit).

pub mod accumulator;
pub mod codecs;
pub mod error;
pub mod heap;
pub mod index;
pub mod indexer;
pub mod quantize;
pub mod query;
pub mod serialise;
pub mod source;
pub mod stem;
pub mod tokenizer;

pub use codecs::{Codec, CodecId, DeltaMode};
pub use error::{Error, Result};
pub use index::Index;
pub use query::{Context, Mode, SearchOptions, SearchResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Document id 0 is reserved as "invalid / unused"; real documents count from 1.
pub const RESERVED_DOCID: u32 = 0;

/// Default quantization ceiling (impacts land in [1, MAX_QUANTUM]).
pub const MAX_QUANTUM: u16 = 0xFF;
