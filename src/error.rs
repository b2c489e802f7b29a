//! Error taxonomy.
//!
//! Provider errors are either transient (retried) or not; neither kind ever
//! aborts a run. Store errors are always fatal.

use thiserror::Error;

/// Errors raised by a metadata or lyrics provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether the same request may succeed if issued again.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout | ProviderError::RateLimited | ProviderError::Network(_) => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::InvalidResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::Api {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// Persistence failures. Every variant aborts the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration {version} ({name}) failed: {source}")]
    Migration {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("rank {rank} already holds '{existing_artist} - {existing_title}', refusing to write '{artist} - {title}'")]
    RankConflict {
        rank: u32,
        existing_artist: String,
        existing_title: String,
        artist: String,
        title: String,
    },

    #[error("malformed row at rank {rank}: {reason}")]
    Malformed { rank: u32, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Timeout.is_transient());
        assert!(ProviderError::RateLimited.is_transient());
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::Api { status: 503, message: String::new() }.is_transient());
        assert!(!ProviderError::Api { status: 400, message: String::new() }.is_transient());
        assert!(!ProviderError::InvalidResponse("bad json".into()).is_transient());
    }

    #[test]
    fn test_rank_conflict_message() {
        let err = StoreError::RankConflict {
            rank: 3,
            existing_artist: "A".into(),
            existing_title: "T".into(),
            artist: "B".into(),
            title: "U".into(),
        };
        assert!(err.to_string().contains("rank 3 already holds 'A - T'"));
    }
}
