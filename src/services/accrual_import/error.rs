//! Fatal import errors

use thiserror::Error;

/// Configuration errors that abort a run before or while reading the file
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot read source file '{path}': {source}")]
    UnreadableFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("invalid delimiter '{0}': expected a single ASCII character")]
    InvalidDelimiter(String),

    #[error("market {0} does not exist")]
    UnknownMarket(i64),

    #[error("invalid period '{0}': expected YYYY-MM or the first day of a month")]
    InvalidPeriod(String),

    #[error("source file contains no header row")]
    MissingHeader,

    #[error("no tenant name column found in header: {0}")]
    MissingTenantColumn(String),
}
