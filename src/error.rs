use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoadError>;

/// Everything that can abort a load. There are no retries: each variant
/// surfaces immediately and halts the run.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The input file is missing. Nothing has been written yet and the
    /// destination has not been contacted.
    #[error("source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// The CSV reader failed while an open source was being driven.
    #[error("failed reading source rows")]
    SourceRead(#[from] csv::Error),

    /// Assembling or rebuilding a record batch failed.
    #[error("record batch construction failed")]
    Batch(#[from] arrow::error::ArrowError),

    /// A cleaned numeric column held a token that is neither a number nor a
    /// recognized placeholder.
    #[error("column `{column}` contains non-numeric value `{value}`")]
    NumericParse { column: String, value: String },

    /// Connectivity or schema failure while writing to the destination. The
    /// table is left in whatever state the last committed batch produced.
    #[error("destination write failed")]
    SinkWrite(#[source] sqlx::Error),

    /// The final count query failed. The load itself already succeeded.
    #[error("destination count query failed")]
    SinkRead(#[source] sqlx::Error),
}
