//! Crate-wide error type

/// Errors raised by the indexer, the loader, and the query processor.
///
/// A missing query term is not an error (the term is skipped); everything
/// here is fatal to the operation that raised it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{file}: {reason}")]
    Corrupt { file: &'static str, reason: String },

    #[error("unknown codec tag 0x{0:02X} in CIpostings.bin")]
    UnknownCodec(u8),

    #[error("codec buffer overflow while encoding {0} integers")]
    EncodeOverflow(usize),

    #[error("invalid query line: {0}")]
    Query(String),
}

impl Error {
    pub(crate) fn corrupt(file: &'static str, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            file,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
