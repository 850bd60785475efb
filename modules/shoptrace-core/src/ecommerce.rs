//! Enhanced-ecommerce payload construction.
//!
//! Payloads are built fresh per event from product and order snapshots.
//! Empty fields are omitted everywhere — the collector treats absent and
//! empty differently, and absent is smaller on the wire.

use std::sync::Arc;

use serde_json::{Map, Value};

use shoptrace_common::{
    ActionFields, Order, Product, ProductAction, ProductActionKind, ProductImpression,
    ProductRecord, Refund,
};

/// Convert a monetary amount to an integer count of the smallest currency
/// unit.
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Caller-supplied payload customization. Each hook receives the computed
/// value and has the final word.
pub trait PayloadMutator: Send + Sync {
    fn product_identifier(&self, _product: &Product, computed: String) -> String {
        computed
    }

    fn mutate_impression(&self, _data: &mut Map<String, Value>) {}

    fn mutate_product(&self, _data: &mut Map<String, Value>) {}
}

#[derive(Default)]
pub struct PayloadBuilder {
    mutator: Option<Arc<dyn PayloadMutator>>,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mutator(mut self, mutator: Arc<dyn PayloadMutator>) -> Self {
        self.mutator = Some(mutator);
        self
    }

    /// The identifier reported for a product: its SKU when set, else the
    /// internal id, with the mutator's final word.
    pub fn product_identifier(&self, product: &Product) -> String {
        let computed = match product.sku.as_deref() {
            Some(sku) if !sku.is_empty() => sku.to_string(),
            _ => product.id.to_string(),
        };

        match &self.mutator {
            Some(mutator) => mutator.product_identifier(product, computed),
            None => computed,
        }
    }

    /// Category hierarchy flattened to one "/"-joined string, root to leaf.
    pub fn category_hierarchy(product: &Product) -> Option<String> {
        if product.category_path.is_empty() {
            return None;
        }
        Some(product.category_path.join("/"))
    }

    /// Variation attribute values joined in display order.
    pub fn variant(product: &Product) -> Option<String> {
        if product.variation_attributes.is_empty() {
            return None;
        }
        Some(
            product
                .variation_attributes
                .iter()
                .map(|(_, value)| value.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    pub fn build_impression(
        &self,
        product: &Product,
        position: u32,
        list: &str,
    ) -> ProductImpression {
        ProductImpression {
            id: self.product_identifier(product),
            name: product.name.clone(),
            list: nonempty(list),
            brand: None,
            category: Self::category_hierarchy(product),
            variant: Self::variant(product),
            price: Some(product.price),
            position: Some(position),
        }
    }

    pub fn build_product_record(
        &self,
        product: &Product,
        quantity: Option<u32>,
        position: Option<u32>,
    ) -> ProductRecord {
        ProductRecord {
            id: self.product_identifier(product),
            name: product.name.clone(),
            brand: None,
            category: Self::category_hierarchy(product),
            variant: Self::variant(product),
            price: Some(product.price),
            quantity,
            position,
        }
    }

    pub fn build_add_to_cart(&self, product: &Product, quantity: u32) -> ProductAction {
        ProductAction {
            kind: ProductActionKind::Add,
            fields: ActionFields {
                products: vec![self.build_product_record(product, Some(quantity), None)],
                ..Default::default()
            },
        }
    }

    pub fn build_checkout(&self, step: u32, option: Option<String>) -> ProductAction {
        ProductAction {
            kind: ProductActionKind::Checkout,
            fields: ActionFields {
                checkout_step: Some(step),
                checkout_option: option.and_then(|o| nonempty(&o)),
                ..Default::default()
            },
        }
    }

    pub fn build_purchase(&self, order: &Order, products: Vec<ProductRecord>) -> ProductAction {
        ProductAction {
            kind: ProductActionKind::Purchase,
            fields: ActionFields {
                transaction_id: nonempty(&order.number),
                revenue_cents: Some(to_cents(order.total)),
                tax_cents: Some(to_cents(order.tax)),
                shipping_cents: Some(to_cents(order.shipping_total)),
                coupon: order.coupon_code.as_deref().and_then(nonempty),
                currency: nonempty(&order.currency),
                products,
                ..Default::default()
            },
        }
    }

    pub fn build_refund(
        &self,
        order: &Order,
        refund: &Refund,
        refunded_products: Vec<ProductRecord>,
    ) -> ProductAction {
        ProductAction {
            kind: ProductActionKind::Refund,
            fields: ActionFields {
                transaction_id: nonempty(&order.number),
                revenue_cents: Some(to_cents(refund.amount)),
                currency: nonempty(&order.currency),
                products: refunded_products,
                ..Default::default()
            },
        }
    }

    /// Serialize an impression for the client-side queue, dropping empty
    /// fields, with the mutator's final pass.
    pub fn impression_json(&self, impression: &ProductImpression) -> Map<String, Value> {
        let mut data = Map::new();
        insert_nonempty(&mut data, "id", Value::from(impression.id.clone()));
        insert_nonempty(&mut data, "name", Value::from(impression.name.clone()));
        insert_nonempty(&mut data, "list", opt_string(&impression.list));
        insert_nonempty(&mut data, "brand", opt_string(&impression.brand));
        insert_nonempty(&mut data, "category", opt_string(&impression.category));
        insert_nonempty(&mut data, "variant", opt_string(&impression.variant));
        insert_nonempty(
            &mut data,
            "position",
            impression.position.map(Value::from).unwrap_or(Value::Null),
        );
        insert_nonempty(
            &mut data,
            "price",
            impression.price.map(Value::from).unwrap_or(Value::Null),
        );

        if let Some(mutator) = &self.mutator {
            mutator.mutate_impression(&mut data);
        }

        data
    }

    /// Serialize a product record for the client-side queue.
    pub fn product_json(&self, record: &ProductRecord) -> Map<String, Value> {
        let mut data = Map::new();
        insert_nonempty(&mut data, "id", Value::from(record.id.clone()));
        insert_nonempty(&mut data, "name", Value::from(record.name.clone()));
        insert_nonempty(&mut data, "brand", opt_string(&record.brand));
        insert_nonempty(&mut data, "category", opt_string(&record.category));
        insert_nonempty(&mut data, "variant", opt_string(&record.variant));
        insert_nonempty(
            &mut data,
            "price",
            record.price.map(Value::from).unwrap_or(Value::Null),
        );
        insert_nonempty(
            &mut data,
            "quantity",
            record.quantity.map(Value::from).unwrap_or(Value::Null),
        );
        insert_nonempty(
            &mut data,
            "position",
            record.position.map(Value::from).unwrap_or(Value::Null),
        );

        if let Some(mutator) = &self.mutator {
            mutator.mutate_product(&mut data);
        }

        data
    }
}

fn nonempty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn opt_string(value: &Option<String>) -> Value {
    match value {
        Some(v) => Value::from(v.clone()),
        None => Value::Null,
    }
}

fn insert_nonempty(map: &mut Map<String, Value>, key: &str, value: Value) {
    let empty = match &value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    };

    if !empty {
        map.insert(key.to_string(), value);
    }
}
