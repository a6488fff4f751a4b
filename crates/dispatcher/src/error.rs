//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Transport creation error
    #[error("failed to create transport '{name}': {message}")]
    TransportCreation { name: String, message: String },

    /// Another delivery holds the in-flight guard
    #[error("a delivery is already in flight")]
    Busy,

    /// Store error (from contract)
    #[error("store error: {0}")]
    Queue(#[from] contracts::QueueError),

    /// Delivery failed after inline retries
    #[error("delivery error: {0}")]
    Delivery(#[from] contracts::DeliveryError),
}

impl DispatcherError {
    /// Create a transport creation error
    pub fn transport_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransportCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
