//! VbmlFormatter - VBML compose service client

use std::time::Duration;

use contracts::{FormatError, FormatterConfig, Grid, PayloadFormatter, RetryPolicy, VbmlMessage};
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

/// Formatter backed by the hosted VBML compose endpoint
pub struct VbmlFormatter {
    client: reqwest::Client,
    url: String,
    policy: RetryPolicy,
}

impl VbmlFormatter {
    /// Create a formatter for `config.url`
    pub fn new(config: &FormatterConfig, timeout: Duration) -> Result<Self, FormatError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FormatError::request(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            policy: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Compose endpoint
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn compose_once(&self, message: &VbmlMessage) -> Result<Grid, FormatError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| FormatError::request(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FormatError::request(format!(
                "VBML formatting failed: {}",
                status.canonical_reason().unwrap_or(status.as_str())
            )));
        }

        let rows: Vec<Vec<i64>> = response
            .json()
            .await
            .map_err(|e| FormatError::request(format!("invalid response body: {e}")))?;
        Ok(Grid::try_from(rows)?)
    }
}

impl PayloadFormatter for VbmlFormatter {
    #[instrument(
        name = "vbml_format",
        skip(self, message),
        fields(components = message.components.len())
    )]
    async fn format(&self, message: &VbmlMessage) -> Result<Grid, FormatError> {
        let mut calls: u32 = 0;
        loop {
            let delay = self.policy.delay_for_attempt(calls);
            if !delay.is_zero() {
                sleep(delay).await;
            }

            match self.compose_once(message).await {
                Ok(grid) => {
                    debug!(calls = calls + 1, "VBML message composed");
                    return Ok(grid);
                }
                // 返回的布局非法，重试无意义
                Err(err @ FormatError::InvalidLayout(_)) => return Err(err),
                Err(err) => {
                    calls += 1;
                    if !self.policy.should_retry(calls) {
                        return Err(err);
                    }
                    warn!(call = calls, error = %err, "Format request failed, retrying");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_configured_url() {
        let config = FormatterConfig {
            url: "https://vbml.example.com/compose".into(),
        };
        let formatter = VbmlFormatter::new(&config, Duration::from_secs(1)).unwrap();
        assert_eq!(formatter.url(), "https://vbml.example.com/compose");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_request_error() {
        let config = FormatterConfig {
            url: "http://127.0.0.1:9/compose".into(),
        };
        let formatter = VbmlFormatter::new(&config, Duration::from_millis(200))
            .unwrap()
            .with_policy(RetryPolicy::without_delay(2));

        let err = formatter.format(&VbmlMessage::centered("HI")).await.unwrap_err();
        assert!(matches!(err, FormatError::Request { .. }));
    }
}
