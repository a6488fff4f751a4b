//! VestaboardTransport - Read/Write API over HTTPS

use contracts::{DeliveryError, DeliveryTransport, DeviceConfig, Grid};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::DispatcherError;

/// Read/write key header
pub const API_KEY_HEADER: &str = "X-Vestaboard-Read-Write-Key";

/// Transport that posts grids to the board's read/write endpoint
pub struct VestaboardTransport {
    name: String,
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct CurrentState {
    #[serde(rename = "currentMessage")]
    current_message: CurrentMessage,
}

#[derive(Debug, Deserialize)]
struct CurrentMessage {
    /// JSON-encoded grid, nested as a string
    layout: String,
}

impl VestaboardTransport {
    /// Create a new VestaboardTransport
    pub fn new(name: impl Into<String>, config: &DeviceConfig) -> Result<Self, DispatcherError> {
        let name = name.into();
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| DispatcherError::transport_creation(&name, "missing api key"))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DispatcherError::transport_creation(&name, e.to_string()))?;

        let endpoint = format!("{}/", config.base_url.trim_end_matches('/'));
        debug!(transport = %name, endpoint = %endpoint, "VestaboardTransport created");

        Ok(Self {
            name,
            client,
            endpoint,
            api_key,
        })
    }

    /// Resolved endpoint (base URL with trailing slashes collapsed)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Grid currently shown on the board
    #[instrument(name = "vestaboard_current_layout", skip(self), fields(transport = %self.name))]
    pub async fn current_layout(&self) -> Result<Grid, DeliveryError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| DeliveryError::transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let state: CurrentState = response
            .json()
            .await
            .map_err(|e| DeliveryError::transient(format!("invalid response format: {e}")))?;
        parse_layout(&state.current_message.layout)
    }
}

impl DeliveryTransport for VestaboardTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "vestaboard_deliver",
        skip(self, grid),
        fields(transport = %self.name)
    )]
    async fn deliver(&self, grid: &Grid) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(grid)
            .send()
            .await
            .map_err(|e| DeliveryError::transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Grid delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "Board refused grid");
        Err(classify_status(status, body))
    }
}

/// 429 and 5xx are worth retrying; anything else is a refusal
fn classify_status(status: StatusCode, body: String) -> DeliveryError {
    let message = if body.is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        body
    };

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        DeliveryError::Transient { message }
    } else {
        DeliveryError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn parse_layout(layout: &str) -> Result<Grid, DeliveryError> {
    serde_json::from_str(layout)
        .map_err(|e| DeliveryError::transient(format!("invalid layout: {e}")))
}
