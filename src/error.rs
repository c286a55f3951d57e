use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned by ingestion functions.
///
/// This is a single error enum shared across CSV/XLSX/JSON/plugin ingestion, directory scans
/// and the [`crate::ingestion::FileReader`] facade.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Excel ingestion error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV ingestion error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The input is not valid JSON (neither a single document nor a stream of documents).
    #[error("json error: {message}")]
    Json { message: String },

    /// A JSONPath expression was invalid or its result does not have a tabular shape.
    ///
    /// When the expression matched an object, `available_keys` lists that object's keys so a
    /// caller can suggest a better path.
    #[error("jsonpath error: {message}")]
    JsonPath {
        message: String,
        available_keys: Vec<String>,
    },

    /// Decompression produced no data at all.
    #[error("decompression failed: {message}")]
    Decompression { message: String },

    /// A plugin subprocess failed or produced output that violates the plugin protocol.
    #[error("plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    /// Directory discovery failed (bad pattern, unreadable root, ...).
    #[error("discovery error: {message}")]
    Discovery { message: String },

    /// The input or the options violate the contract of the selected format.
    #[error("format error: {message}")]
    FormatContract { message: String },

    /// The read was cancelled by the caller. No partial result accompanies this error.
    #[error("ingestion cancelled")]
    Cancelled,
}

impl IngestionError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::FormatContract {
            message: message.into(),
        }
    }

    pub(crate) fn json_path(message: impl Into<String>) -> Self {
        Self::JsonPath {
            message: message.into(),
            available_keys: Vec::new(),
        }
    }

    /// Returns `true` if this error signals cancellation rather than failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
