//! Error types shared by the scheduler core.

use std::time::Duration;

/// The result type used throughout the scheduler core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding a trigger or driving a provider API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The trigger payload could not be decoded, parsed or validated.
    #[error("invalid Pub/Sub message: {0}")]
    MalformedPayload(String),

    /// A provider API call was rejected or could not be completed.
    #[error("provider call failed: {message}")]
    ProviderCallFailure {
        /// HTTP status returned by the provider, if a response was received.
        status: Option<u16>,
        message: String,
    },

    /// An operation did not reach `DONE` within the configured wait.
    #[error("operation {operation} did not complete within {waited:?}")]
    OperationTimeout { operation: String, waited: Duration },

    /// Credentials could not be resolved or a token could not be minted.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Configuration could not be loaded or an override is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn provider(message: impl Into<String>) -> Self {
        Self::ProviderCallFailure {
            status: None,
            message: message.into(),
        }
    }

    pub fn provider_status(status: u16, message: impl Into<String>) -> Self {
        Self::ProviderCallFailure {
            status: Some(status),
            message: message.into(),
        }
    }

    /// HTTP status carried by a provider failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ProviderCallFailure { status, .. } => *status,
            _ => None,
        }
    }
}
