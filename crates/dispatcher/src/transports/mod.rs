//! Delivery transports

mod console;
mod vestaboard;

pub use console::{render_grid, ConsoleTransport};
pub use vestaboard::VestaboardTransport;

use contracts::{DeliveryError, DeliveryTransport, DeviceConfig, DeviceMode, Grid};
use tracing::instrument;

use crate::error::DispatcherError;

/// Transport selected by `[device].mode`
pub enum BoardTransport {
    Console(ConsoleTransport),
    Http(VestaboardTransport),
}

impl DeliveryTransport for BoardTransport {
    fn name(&self) -> &str {
        match self {
            Self::Console(transport) => transport.name(),
            Self::Http(transport) => transport.name(),
        }
    }

    async fn deliver(&self, grid: &Grid) -> Result<(), DeliveryError> {
        match self {
            Self::Console(transport) => transport.deliver(grid).await,
            Self::Http(transport) => transport.deliver(grid).await,
        }
    }
}

/// Create a transport from configuration
#[instrument(name = "dispatcher_create_transport", skip(config), fields(mode = ?config.mode))]
pub fn create_transport(config: &DeviceConfig) -> Result<BoardTransport, DispatcherError> {
    match config.mode {
        DeviceMode::Console => Ok(BoardTransport::Console(ConsoleTransport::new("console"))),
        DeviceMode::Http => Ok(BoardTransport::Http(VestaboardTransport::new("vestaboard", config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_console_transport() {
        let transport = create_transport(&DeviceConfig::default()).unwrap();
        assert!(matches!(transport, BoardTransport::Console(_)));
        assert_eq!(transport.name(), "console");
    }

    #[test]
    fn test_http_transport_requires_key() {
        let config = DeviceConfig {
            mode: DeviceMode::Http,
            ..DeviceConfig::default()
        };
        let err = create_transport(&config).err().unwrap();
        assert!(matches!(err, DispatcherError::TransportCreation { .. }));
    }
}
