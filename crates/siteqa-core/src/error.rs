use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Index unavailable ({reason}): {detail}")]
    IndexUnavailable { reason: IndexUnavailable, detail: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Scoring failed: {0}")]
    Scoring(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Why a persisted index could not be served. Every case is recovered by a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexUnavailable {
    Missing,
    Corrupt,
    Incompatible,
}

impl std::fmt::Display for IndexUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IndexUnavailable::Missing => "missing",
            IndexUnavailable::Corrupt => "corrupt",
            IndexUnavailable::Incompatible => "incompatible",
        })
    }
}

impl Error {
    pub fn index_unavailable(reason: IndexUnavailable, detail: impl Into<String>) -> Self {
        Error::IndexUnavailable { reason, detail: detail.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
