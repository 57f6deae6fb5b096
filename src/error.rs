use std::fmt::Display;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure taxonomy of the dispatch pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Notification, callback, account, or idempotency key is absent.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    /// Envelope or payload cannot be encoded/decoded.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport error, timeout, or non-2xx response from the destination.
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("storage operation failed: {0}")]
    Storage(String),

    /// Connect, publish, consume, or acknowledge failure on the broker.
    #[error("broker operation failed: {0}")]
    Broker(String),

    /// Delay queue declaration or binding failure.
    #[error("retry topology operation failed: {0}")]
    Topology(String),

    /// A failed attempt whose status update to `Failed` also failed.
    /// `source` stays the operative reason.
    #[error("{source}; status update also failed: {status}")]
    StatusUpdate {
        source: Box<Error>,
        status: Box<Error>,
    },
}

impl Error {
    pub fn delivery(err: impl Display) -> Self {
        Self::Delivery(err.to_string())
    }

    pub fn storage(err: impl Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn broker(err: impl Display) -> Self {
        Self::Broker(err.to_string())
    }

    pub fn topology(err: impl Display) -> Self {
        Self::Topology(err.to_string())
    }

    /// The failure that decided the outcome, unwrapping a compound status error.
    pub fn primary(&self) -> &Error {
        match self {
            Self::StatusUpdate { source, .. } => source.primary(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.primary(), Self::NotFound(_))
    }
}
