
use thiserror::Error;

/// Errors raised while loading, weighting or saving an association graph.
///
/// Every failure the pipeline can hit is a malformed or missing input, so
/// the variants mostly wrap the underlying library errors.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not read npy file: {0}")]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),

    #[error("could not write npy file: {0}")]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("rayon pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Invalid or missing configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// A configured column is not in the table header.
    #[error("column '{column}' not found in header of {path}")]
    MissingColumn {
        column: String,
        path: String,
    },

    /// A cell could not be parsed into the expected numeric type.
    #[error("line {line}: could not parse '{value}' in column '{column}'")]
    BadValue {
        line: u64,
        column: String,
        value: String,
    },

    #[error("word '{0}' is not in the vocabulary")]
    UnknownWord(String),

    /// Matrix shape does not agree with the vocabulary size.
    #[error("dimension mismatch: expected {expected}x{expected}, got {rows}x{cols}")]
    DimensionMismatch {
        expected: usize,
        rows: usize,
        cols: usize,
    },

    /// No association survived the filters of a bin.
    #[error("bin '{0}' has no associations inside the vocabulary")]
    EmptyBin(String),
}

pub type Result<T> = std::result::Result<T, ActivationError>;
