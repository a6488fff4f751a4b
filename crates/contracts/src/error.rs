//! Layered error definitions
//!
//! Categorized by source: config / queue / delivery / format / moderation

use thiserror::Error;

use crate::{GridError, MessageId};

/// Configuration and general contract errors
#[derive(Debug, Error)]
pub enum ContractError {
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Queue store errors
#[derive(Debug, Error)]
pub enum QueueError {
    /// Malformed payload, rejected at ingestion and never retried
    #[error("invalid payload: {0}")]
    Validation(#[from] GridError),

    /// Ingestion refused while the control plane is locked
    #[error("ingestion is locked: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Locked { reason: Option<String> },

    /// Persistence unavailable or corrupt
    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No record with this id
    #[error("message not found: {id}")]
    NotFound { id: MessageId },

    /// Operation requires a pending record
    #[error("message {id} is already terminal")]
    Terminal { id: MessageId },
}

impl QueueError {
    /// Create storage error with an underlying cause
    pub fn storage(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create storage error without an underlying cause
    pub fn storage_message(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Whether a caller may succeed by trying again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Locked { .. } | Self::Storage { .. })
    }
}

/// Delivery transport errors
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network or service hiccup, retried inline
    #[error("transient delivery error: {message}")]
    Transient { message: String },

    /// The device refused the request; retrying in place will not help
    #[error("delivery rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl DeliveryError {
    /// Create transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Whether inline retry applies
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Payload formatter errors
#[derive(Debug, Error)]
pub enum FormatError {
    /// Request to the formatting service failed
    #[error("format request failed: {message}")]
    Request { message: String },

    /// Formatter returned something that is not a valid grid
    #[error("formatter returned invalid layout: {0}")]
    InvalidLayout(#[from] GridError),
}

impl FormatError {
    /// Create request error
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }
}

/// Content moderation errors
#[derive(Debug, Error)]
#[error("moderation failed: {message}")]
pub struct ModerationError {
    pub message: String,
}

impl ModerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
