//! Unified error system for Steward
//!
//! A single flat error type shared by the model, the effect interfaces and the
//! agents built on top of them.

use serde::{Deserialize, Serialize};

/// Unified error type for all Steward operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum StewardError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// An identifier that should have been a UUID could not be parsed.
    ///
    /// Raised when a caller hands the usage filter a malformed dataset id.
    /// This is a contract violation and is never retried.
    #[error("Malformed identifier: {value:?}")]
    MalformedIdentifier {
        /// The offending raw value
        value: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Discovery against a resource backend failed
    #[error("Discovery failed: {message}")]
    Discovery {
        /// Error message describing the discovery failure
        message: String,
    },

    /// Sending state to the control service failed
    #[error("Control channel error: {message}")]
    Control {
        /// Error message describing the control channel failure
        message: String,
    },

    /// Executing a state change failed
    #[error("Execution failed: {message}")]
    Execution {
        /// Error message describing the execution failure
        message: String,
    },

    /// Lease acquisition or release conflict
    #[error("Lease error: {message}")]
    Lease {
        /// Error message describing the lease conflict
        message: String,
    },

    /// Configuration could not be loaded or validated
    #[error("Config error: {message}")]
    Config {
        /// Error message describing the configuration problem
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl StewardError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a malformed identifier error
    pub fn malformed_identifier(value: impl Into<String>) -> Self {
        Self::MalformedIdentifier {
            value: value.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a discovery error
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Create a control channel error
    pub fn control(message: impl Into<String>) -> Self {
        Self::Control {
            message: message.into(),
        }
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create a lease error
    pub fn lease(message: impl Into<String>) -> Self {
        Self::Lease {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the failure is worth retrying on a later cycle.
    ///
    /// Contract violations and configuration errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Discovery { .. } | Self::Control { .. } | Self::Execution { .. }
        )
    }
}

/// Standard Result type for Steward operations
pub type Result<T> = std::result::Result<T, StewardError>;

impl From<std::io::Error> for StewardError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StewardError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<toml::de::Error> for StewardError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<uuid::Error> for StewardError {
    fn from(err: uuid::Error) -> Self {
        Self::invalid(err.to_string())
    }
}
