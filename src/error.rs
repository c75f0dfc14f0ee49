use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while hashing, traversing, loading or persisting
/// an ascmhl history.
#[derive(Debug, Error)]
pub enum MhlError {
    #[error("unreadable file {path}: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported hash format: {0}")]
    UnsupportedFormat(String),

    #[error("no prior history found at {0}")]
    NoHistory(PathBuf),

    #[error("failed to parse manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },

    #[error("manifest {0} failed schema validation: {1}")]
    SchemaValidation(PathBuf, String),

    #[error("directory hash fed out of order: expected a name greater than {previous:?}, got {got:?}")]
    OutOfOrderAppend { previous: String, got: String },

    #[error("child hash value {0:?} is not valid hex: {1}")]
    InvalidHashEncoding(String, hex::FromHexError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type MhlResult<T> = Result<T, MhlError>;
