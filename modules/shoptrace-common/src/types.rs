use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Identity ---

/// A visitor's resolved identity for a single tracking hit.
///
/// `cid` is the pseudonymous client identifier (cookie-issued, persisted, or
/// generated). `uid` is the storefront's own account id. A server-side hit
/// needs at least a `cid` to be attributable; one with neither is dropped,
/// never sent partially.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub cid: Option<String>,
    pub uid: Option<u64>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Identity {
    pub fn has_client_id(&self) -> bool {
        self.cid.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// A storefront account as seen by the policy gate: its roles and whether it
/// holds the manage-store capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: u64,
    pub login: String,
    pub roles: Vec<String>,
    pub can_manage_store: bool,
}

// --- Script categories ---

/// Category of a queued client-side script fragment. Flush order is fixed:
/// impression, then pageview, then event, regardless of insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptCategory {
    Impression,
    Pageview,
    Event,
}

impl ScriptCategory {
    pub const FLUSH_ORDER: [ScriptCategory; 3] = [
        ScriptCategory::Impression,
        ScriptCategory::Pageview,
        ScriptCategory::Event,
    ];
}

impl std::fmt::Display for ScriptCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptCategory::Impression => write!(f, "impression"),
            ScriptCategory::Pageview => write!(f, "pageview"),
            ScriptCategory::Event => write!(f, "event"),
        }
    }
}

// --- Event properties ---

/// Typed event properties. Every event carries a category; the action
/// defaults to the event name when unset. `extra` holds the open-ended
/// key/value pairs of custom events only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventProperties {
    pub category: String,
    pub action: Option<String>,
    pub label: Option<String>,
    pub value: Option<i64>,
    pub non_interaction: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl EventProperties {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn non_interaction(mut self) -> Self {
        self.non_interaction = true;
        self
    }
}

// --- Enhanced ecommerce payloads ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductActionKind {
    Detail,
    Click,
    Add,
    Checkout,
    Purchase,
    Refund,
}

impl std::fmt::Display for ProductActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductActionKind::Detail => write!(f, "detail"),
            ProductActionKind::Click => write!(f, "click"),
            ProductActionKind::Add => write!(f, "add"),
            ProductActionKind::Checkout => write!(f, "checkout"),
            ProductActionKind::Purchase => write!(f, "purchase"),
            ProductActionKind::Refund => write!(f, "refund"),
        }
    }
}

impl ProductActionKind {
    /// Purchase and refund actions carry money and are delivered at most once
    /// per entity.
    pub fn is_monetary(&self) -> bool {
        matches!(self, ProductActionKind::Purchase | ProductActionKind::Refund)
    }
}

/// A single product as it appears in an ecommerce payload. Empty fields are
/// omitted from the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub variant: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<u32>,
    pub position: Option<u32>,
}

/// A product shown in a listing (impressionFieldObject).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductImpression {
    pub id: String,
    pub name: String,
    pub list: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub variant: Option<String>,
    pub price: Option<f64>,
    pub position: Option<u32>,
}

/// Action-level ecommerce fields: transaction totals for purchase/refund,
/// step/option for checkout, plus the products involved. Monetary fields are
/// integer counts of the smallest currency unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionFields {
    pub transaction_id: Option<String>,
    pub revenue_cents: Option<i64>,
    pub tax_cents: Option<i64>,
    pub shipping_cents: Option<i64>,
    pub coupon: Option<String>,
    pub checkout_step: Option<u32>,
    pub checkout_option: Option<String>,
    pub list: Option<String>,
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<ProductRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductAction {
    pub kind: ProductActionKind,
    pub fields: ActionFields,
}

/// The enhanced-ecommerce object attached to an event. Built fresh per event,
/// read-only once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload_type", rename_all = "snake_case")]
pub enum EcommercePayload {
    Impression(ProductImpression),
    Action(ProductAction),
}

// --- External storefront snapshots ---
//
// The cart/order/product domain model lives outside this core; these are the
// read-only shapes the core queries by id.

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub sku: Option<String>,
    pub name: String,
    pub price: f64,
    /// Category hierarchy from root to leaf.
    pub category_path: Vec<String>,
    /// Variation attributes in display order, name to value.
    pub variation_attributes: Vec<(String, String)>,
    pub parent_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: u64,
    pub variation_id: Option<u64>,
    pub quantity: u32,
}

impl CartItem {
    /// The product to look up for payloads: the variation when present.
    pub fn effective_product_id(&self) -> u64 {
        self.variation_id.unwrap_or(self.product_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: u64,
    pub quantity: u32,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    /// Customer-facing order number; also the transaction id on hits.
    pub number: String,
    pub customer_id: Option<u64>,
    pub total: f64,
    pub tax: f64,
    pub shipping_total: f64,
    pub coupon_code: Option<String>,
    pub currency: String,
    pub shipping_method: Option<String>,
    pub customer_ip: Option<String>,
    pub customer_user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: u64,
    pub order_id: u64,
    pub amount: f64,
    /// True when the whole order was refunded at once.
    pub full_refund: bool,
    /// Lines refunded individually; empty for order-level partial refunds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refunded_lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
}
