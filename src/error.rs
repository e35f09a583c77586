// Error taxonomy for report generation.
//
// Only conditions that abort a report live here. Lenient cases (malformed
// durations, zero denominators, duplicate category labels, overlapping
// merges) are values or diagnostics, not errors.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    /// The aggregate data source failed; the whole report fails with it.
    #[error("aggregate source unavailable for query '{query}': {reason}")]
    SourceUnavailable { query: String, reason: String },

    #[error("invalid cell reference: {0}")]
    InvalidCellRef(String),

    #[error("invalid merge region: {0}")]
    InvalidMergeRegion(String),

    #[error("invalid sheet name: {0}")]
    InvalidSheetName(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("spreadsheet serialization failed: {0}")]
    Xlsx(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReportError {
    pub fn source_unavailable(query: impl Into<String>, reason: impl ToString) -> Self {
        ReportError::SourceUnavailable {
            query: query.into(),
            reason: reason.to_string(),
        }
    }
}
