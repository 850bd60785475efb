pub mod error;
pub mod types;

pub use error::{MeasurementError, Result};
pub use types::{EcommerceFields, EventHit, ProductParams, PROTOCOL_VERSION};

use std::time::Duration;

/// Client for the measurement protocol collection endpoint.
///
/// One outbound request per hit, bounded timeout, no automatic retry: a
/// failed delivery is the caller's to log and drop, never to repeat within
/// the same storefront request.
pub struct MeasurementClient {
    client: reqwest::Client,
    collect_url: String,
    tracking_id: String,
}

impl MeasurementClient {
    pub fn new(tracking_id: &str, collector_host: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            collect_url: format!("{}/collect", collector_host.trim_end_matches('/')),
            tracking_id: tracking_id.to_string(),
        }
    }

    pub fn tracking_id(&self) -> &str {
        &self.tracking_id
    }

    /// Deliver a single event hit. The response body carries no contract;
    /// only HTTP-level success matters, and only for logging.
    pub async fn track_event(&self, hit: EventHit) -> Result<()> {
        if hit.client_id.is_empty() {
            return Err(MeasurementError::InvalidHit(
                "missing client id".to_string(),
            ));
        }

        let action = hit.action.clone();
        let params = hit.into_params(&self.tracking_id);

        let resp = self
            .client
            .post(&self.collect_url)
            .form(&params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MeasurementError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(action = %action, "Delivered measurement hit");
        Ok(())
    }
}
