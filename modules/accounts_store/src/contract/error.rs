//! Contract error types for the accounts store

use super::model::{AccountId, ValueKind};

/// Accounts store errors
///
/// A missing account or setting is never an error; lookups return `Option`.
#[derive(Debug, thiserror::Error)]
pub enum AccountsError {
    /// A value is present but of a kind that cannot be read as requested
    #[error("Type mismatch for '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },

    /// The account behind this handle has been deleted
    #[error("Account {account_id} has been deleted")]
    StaleHandle { account_id: AccountId },

    /// Load or save failed in the persistence collaborator
    #[error("Persistence error: {source}")]
    Persistence {
        #[source]
        source: anyhow::Error,
    },

    /// Malformed key, name or value
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// A flush was cancelled before its next write started
    #[error("Flush cancelled")]
    Cancelled,

    /// Invalid store configuration or provider definitions
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl AccountsError {
    pub fn persistence(source: impl Into<anyhow::Error>) -> Self {
        Self::Persistence {
            source: source.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, AccountsError>;
