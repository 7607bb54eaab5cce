//! Extension error types

use thiserror::Error;

/// Extension failure with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExtensionError {
    pub kind: ExtensionErrorKind,
    pub message: String,
}

impl ExtensionError {
    pub fn new(kind: ExtensionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ExtensionErrorKind::Transport, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ExtensionErrorKind::Timeout, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ExtensionErrorKind::ServerError, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ExtensionErrorKind::Rejected, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ExtensionErrorKind::Malformed, message)
    }

    pub fn unknown_extension(name: &str) -> Self {
        Self::new(
            ExtensionErrorKind::UnknownExtension,
            format!("No server handles extension '{name}'"),
        )
    }

    pub fn duplicate(name: &str) -> Self {
        Self::new(
            ExtensionErrorKind::Duplicate,
            format!("Extension '{name}' is served more than once"),
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionErrorKind {
    /// Connection refused or reset - retryable
    Transport,
    /// No response within the configured timeout - retryable
    Timeout,
    /// Server error (5xx) - retryable
    ServerError,
    /// Any other non-success status - not retryable
    Rejected,
    /// Response body did not parse
    Malformed,
    /// No registered server handles the name
    UnknownExtension,
    /// Two servers claim the same name
    Duplicate,
}

impl ExtensionErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transport | Self::Timeout | Self::ServerError)
    }
}
