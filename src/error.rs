// ⚠️ Error taxonomy
// Every variant is fatal for the batch that raised it. The binary wraps these
// in anyhow at the edges; library code returns Result.

use thiserror::Error;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// A numeric cell that could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot normalize {field} value {input:?}")]
pub struct NormalizationError {
    pub field: &'static str,
    pub input: String,
}

impl NormalizationError {
    pub fn new(field: &'static str, input: &str) -> Self {
        NormalizationError {
            field,
            input: input.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    /// The document source did not produce text.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// No rows could be extracted, or no header was found.
    #[error("parse failure: {0}")]
    Parse(String),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    /// Data that breaks a batch invariant, e.g. a repeated identifier.
    #[error("anomaly: {0}")]
    Anomaly(String),

    /// Lock timeout or I/O failure in the store.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock still held after all retries.
    #[error("store busy after {attempts} attempts")]
    StoreBusy { attempts: u32 },

    #[error("config error: {0}")]
    Config(String),

    #[error("notify failed: {0}")]
    Notify(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackerError {
    /// True when the underlying SQLite error is a lock conflict worth retrying.
    pub fn is_busy(&self) -> bool {
        match self {
            TrackerError::Store(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
