//! Server-side delivery seam.
//!
//! `HitSender` is the one place outbound network I/O happens; tests swap in a
//! recording implementation, production wires the measurement client.

use async_trait::async_trait;
use measurement_client::{
    EcommerceFields, EventHit, MeasurementClient, MeasurementError, ProductParams,
};
use shoptrace_common::{ProductAction, ProductRecord};

#[async_trait]
pub trait HitSender: Send + Sync {
    async fn send_event(&self, hit: EventHit) -> Result<(), MeasurementError>;
}

#[async_trait]
impl HitSender for MeasurementClient {
    async fn send_event(&self, hit: EventHit) -> Result<(), MeasurementError> {
        self.track_event(hit).await
    }
}

/// Flatten a typed ecommerce payload into the client's wire fields.
pub fn to_hit_fields(action: ProductAction) -> EcommerceFields {
    EcommerceFields {
        product_action: Some(action.kind.to_string()),
        transaction_id: action.fields.transaction_id,
        revenue_cents: action.fields.revenue_cents,
        tax_cents: action.fields.tax_cents,
        shipping_cents: action.fields.shipping_cents,
        coupon: action.fields.coupon,
        checkout_step: action.fields.checkout_step,
        checkout_option: action.fields.checkout_option,
        action_list: action.fields.list,
        currency: action.fields.currency,
        products: action
            .fields
            .products
            .into_iter()
            .map(to_product_params)
            .collect(),
    }
}

fn to_product_params(record: ProductRecord) -> ProductParams {
    ProductParams {
        id: some_nonempty(record.id),
        name: some_nonempty(record.name),
        brand: record.brand,
        category: record.category,
        variant: record.variant,
        price: record.price,
        quantity: record.quantity,
        position: record.position,
    }
}

fn some_nonempty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
