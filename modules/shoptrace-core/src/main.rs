//! Validation binary: sends one diagnostic event to the configured collector
//! so operators can confirm their tracking id before wiring the storefront.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use measurement_client::MeasurementClient;
use shoptrace_common::TrackingConfig;
use shoptrace_core::store::{
    MemoryCatalog, MemoryDirectory, MemoryIdentityStore, MemoryMarkerStore, MemoryOrders,
};
use shoptrace_core::{ClientIdPolicy, EventTracker, RequestContext, TrackerStores};

/// A validation hit has no cookie to resolve, so always generate an id.
struct AlwaysGenerate;

impl ClientIdPolicy for AlwaysGenerate {
    fn generate_client_id(&self, _computed: bool) -> bool {
        true
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("shoptrace=info".parse()?))
        .init();

    let config = TrackingConfig::from_env();
    if !config.is_enabled() {
        info!("No tracking id configured; set SHOPTRACE_TRACKING_ID to send a validation hit");
        return Ok(());
    }

    info!(tracking_id = %config.tracking_id, collector = %config.collector_host, "Sending validation event");

    let stores = TrackerStores {
        identities: Arc::new(MemoryIdentityStore::new()),
        markers: Arc::new(MemoryMarkerStore::new()),
        catalog: Arc::new(MemoryCatalog::default()),
        orders: Arc::new(MemoryOrders::default()),
        directory: Arc::new(MemoryDirectory::default()),
        sender: Arc::new(MeasurementClient::new(
            &config.tracking_id,
            &config.collector_host,
        )),
    };

    let ctx = RequestContext {
        user_agent: Some("shoptrace-validation/0.1".to_string()),
        ..Default::default()
    };

    let mut tracker =
        EventTracker::new(config, ctx, stores).with_client_id_policy(Arc::new(AlwaysGenerate));

    tracker
        .custom_event(
            "shoptrace validation",
            &[("eventCategory".to_string(), "Diagnostics".to_string())],
        )
        .await;

    info!("Validation event dispatched; check the property's realtime view");
    Ok(())
}
