//! DeliveryTransport trait - Dispatcher output interface
//!
//! Defines the abstract interface to the physical board.

use crate::{DeliveryError, Grid};

/// Board delivery trait
///
/// One call delivers one frame. Implementations do not retry; inline retry
/// and rate limiting belong to the dispatcher.
#[trait_variant::make(DeliveryTransport: Send)]
pub trait LocalDeliveryTransport {
    /// Transport name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one frame
    ///
    /// # Errors
    /// `Transient` for network/service hiccups, `Rejected` when the device
    /// refuses the request outright
    async fn deliver(&self, grid: &Grid) -> Result<(), DeliveryError>;
}
