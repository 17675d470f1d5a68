//! Error types for the Eucalyptus provider.

use rusoto_core::RusotoError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::provision::ProviderError;

const FORBIDDEN: u16 = 403;
const BAD_REQUEST: u16 = 400;
const INSTANCE_NOT_FOUND_CODE: &str = "InvalidInstanceID.NotFound";

/// Errors raised by the Eucalyptus provider.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum EucaError {
    /// Raised when the high-level configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the HTTP client cannot be constructed.
    #[error("failed to initialise HTTP client: {0}")]
    Client(String),
    /// Raised when the cloud answers with HTTP 403. Eucalyptus does this
    /// while a freshly launched instance propagates through its services.
    #[error("request forbidden: {message}")]
    Forbidden {
        /// Response body returned by the cloud.
        message: String,
    },
    /// Raised when the cloud rejects a request with any other status.
    #[error("cloud returned HTTP {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body returned by the cloud.
        message: String,
    },
    /// Raised when a launch reservation contains no instance.
    #[error("launch request returned no instance")]
    EmptyReservation,
    /// Raised when a reload no longer finds the instance.
    #[error("instance {instance_id} not found")]
    InstanceNotFound {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when the request never reached the cloud or its response was
    /// cut off.
    #[error("failed to reach the cloud: {message}")]
    Transport {
        /// Message returned by the HTTP client.
        message: String,
    },
    /// Wrapper for credential, validation, and parsing failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the SDK.
        message: String,
    },
}

impl EucaError {
    /// Classifies an unparsed HTTP error response.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = body.trim().to_owned();
        if status == FORBIDDEN {
            Self::Forbidden { message }
        } else {
            Self::Api { status, message }
        }
    }
}

impl<E: std::error::Error + 'static> From<RusotoError<E>> for EucaError {
    fn from(value: RusotoError<E>) -> Self {
        match value {
            RusotoError::Unknown(response) => {
                Self::from_response(response.status.as_u16(), response.body_as_str())
            }
            RusotoError::HttpDispatch(err) => Self::Transport {
                message: err.to_string(),
            },
            other => Self::Provider {
                message: other.to_string(),
            },
        }
    }
}

impl From<ConfigError> for EucaError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

impl ProviderError for EucaError {
    fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    fn is_transient(&self) -> bool {
        match self {
            Self::InstanceNotFound { .. } | Self::Transport { .. } => true,
            Self::Api { status, message } => {
                *status == BAD_REQUEST && message.contains(INSTANCE_NOT_FOUND_CODE)
            }
            _ => false,
        }
    }
}
