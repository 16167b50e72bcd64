//! Error types for the balance warden
//!
//! Each collaborator seam has its own error enum so callers can decide
//! whether a failure skips one unit of work or the whole operation.

use thiserror::Error;

/// Errors raised by the persistent member store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing a data file failed
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A data file could not be (de)serialized
    #[error("Store serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// No record exists for the member
    #[error("Member not found: {0}")]
    NotFound(u64),
}

/// Errors raised by the chat transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),

    /// Generic transport error
    #[error("Transport error: {0}")]
    Other(String),
}

impl From<poise::serenity_prelude::Error> for TransportError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

/// Errors raised while fetching balances from the external source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Balance request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Balance source answered with status {0}")]
    Status(u16),

    #[error("Balance response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors that abort a single enforcement decision
#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type TransportResult<T> = Result<T, TransportError>;
pub type SourceResult<T> = Result<T, SourceError>;
pub type EnforcementResult<T> = Result<T, EnforcementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StoreError::NotFound(42);
        assert_eq!(error.to_string(), "Member not found: 42");

        let error = TransportError::Other("blocked".to_string());
        assert_eq!(error.to_string(), "Transport error: blocked");

        let error = EnforcementError::from(StoreError::NotFound(7));
        assert_eq!(error.to_string(), "Member not found: 7");

        let error = ConfigError::Invalid {
            key: "GROUP_ID",
            value: "abc".to_string(),
        };
        assert_eq!(error.to_string(), "GROUP_ID has an invalid value: abc");
    }

    #[test]
    fn test_source_status_display() {
        let error = SourceError::Status(503);
        assert_eq!(error.to_string(), "Balance source answered with status 503");
    }
}
