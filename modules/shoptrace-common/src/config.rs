use std::env;

use serde::{Deserialize, Serialize};

/// Tracking configuration, read-only to the engine.
///
/// An empty tracking id means tracking is off everywhere; that is a disabled
/// state, not an error, so `from_env` never panics and every field has a
/// default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Measurement property id. Empty disables all tracking entry points.
    pub tracking_id: String,
    /// Base URL of the remote collection endpoint.
    pub collector_host: String,
    /// Send the storefront account id (`uid`) with server-side hits.
    pub track_user_id: bool,
    /// Track accounts holding the manage-store capability.
    pub admin_tracking_enabled: bool,
    /// Roles never tracked, regardless of capability.
    pub excluded_roles: Vec<String>,
    /// Client-side tracker function name used in emitted script fragments.
    pub tracker_function_name: String,
    pub event_names: EventNames,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_id: String::new(),
            collector_host: "https://www.google-analytics.com".to_string(),
            track_user_id: false,
            admin_tracking_enabled: false,
            excluded_roles: Vec::new(),
            tracker_function_name: "ga".to_string(),
            event_names: EventNames::default(),
        }
    }
}

impl TrackingConfig {
    /// Load configuration from `SHOPTRACE_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tracking_id: env::var("SHOPTRACE_TRACKING_ID").unwrap_or(defaults.tracking_id),
            collector_host: env::var("SHOPTRACE_COLLECTOR_HOST")
                .unwrap_or(defaults.collector_host),
            track_user_id: env_flag("SHOPTRACE_TRACK_USER_ID"),
            admin_tracking_enabled: env_flag("SHOPTRACE_ADMIN_TRACKING"),
            excluded_roles: env::var("SHOPTRACE_EXCLUDED_ROLES")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            tracker_function_name: env::var("SHOPTRACE_TRACKER_FUNCTION")
                .unwrap_or(defaults.tracker_function_name),
            event_names: EventNames::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.tracking_id.is_empty()
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Display names for tracked events. Operators can rename these; the defaults
/// match what reports have always shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNames {
    pub signed_in: String,
    pub viewed_product: String,
    pub added_to_cart: String,
    pub started_checkout: String,
    pub placed_order: String,
    pub completed_purchase: String,
    pub order_refunded: String,
}

impl Default for EventNames {
    fn default() -> Self {
        Self {
            signed_in: "signed in".to_string(),
            viewed_product: "viewed product".to_string(),
            added_to_cart: "added to cart".to_string(),
            started_checkout: "started checkout".to_string(),
            placed_order: "placed order".to_string(),
            completed_purchase: "completed purchase".to_string(),
            order_refunded: "refunded order".to_string(),
        }
    }
}
