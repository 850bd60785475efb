//! Storefront-facing entry points.
//!
//! One `EventTracker` is built per request. It owns the request-scoped state
//! (script queue, policy cache, resolved identity memo) and borrows the
//! shared stores. Nothing here ever returns an error to the storefront:
//! delivery failures, malformed input, and duplicate suppression are logged
//! and swallowed.

use std::collections::BTreeMap;
use std::sync::Arc;

use measurement_client::EventHit;
use shoptrace_common::{
    CartItem, EventProperties, Identity, Order, ProductAction, ScriptCategory, TrackingConfig,
};

use crate::context::RequestContext;
use crate::delivery::{self, HitSender};
use crate::ecommerce::{to_cents, PayloadBuilder, PayloadMutator};
use crate::identity::{ClientIdPolicy, IdentityResolver};
use crate::policy::{PolicyOverride, TrackingPolicy};
use crate::queue::ScriptQueue;
use crate::script;
use crate::store::{
    AccountDirectory, IdentityStore, OrderReader, ProductCatalog, TrackedMarkerStore,
};

/// Shared collaborators injected into each per-request tracker.
#[derive(Clone)]
pub struct TrackerStores {
    pub identities: Arc<dyn IdentityStore>,
    pub markers: Arc<dyn TrackedMarkerStore>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub orders: Arc<dyn OrderReader>,
    pub directory: Arc<dyn AccountDirectory>,
    pub sender: Arc<dyn HitSender>,
}

pub struct EventTracker {
    config: TrackingConfig,
    ctx: RequestContext,
    resolver: IdentityResolver,
    policy: TrackingPolicy,
    payloads: PayloadBuilder,
    queue: ScriptQueue,
    markers: Arc<dyn TrackedMarkerStore>,
    catalog: Arc<dyn ProductCatalog>,
    orders: Arc<dyn OrderReader>,
    sender: Arc<dyn HitSender>,
}

impl EventTracker {
    pub fn new(config: TrackingConfig, ctx: RequestContext, stores: TrackerStores) -> Self {
        Self {
            resolver: IdentityResolver::new(stores.identities, config.clone()),
            policy: TrackingPolicy::new(config.clone(), stores.directory),
            payloads: PayloadBuilder::new(),
            queue: ScriptQueue::new(),
            markers: stores.markers,
            catalog: stores.catalog,
            orders: stores.orders,
            sender: stores.sender,
            config,
            ctx,
        }
    }

    pub fn with_policy_override(mut self, policy_override: Arc<dyn PolicyOverride>) -> Self {
        self.policy = self.policy.with_override(policy_override);
        self
    }

    pub fn with_payload_mutator(mut self, mutator: Arc<dyn PayloadMutator>) -> Self {
        self.payloads = self.payloads.with_mutator(mutator);
        self
    }

    pub fn with_client_id_policy(mut self, policy: Arc<dyn ClientIdPolicy>) -> Self {
        self.resolver = self.resolver.with_client_id_policy(policy);
        self
    }

    // --- Client-side entry points -----------------------------------------

    /// Queue the pageview fragment for this render.
    pub async fn page_view(&mut self) {
        if !self.allowed(false, None).await {
            return;
        }

        let js = script::pageview(&self.config.tracker_function_name);
        self.queue.enqueue(ScriptCategory::Pageview, js);
    }

    /// Queue a listing impression for this render.
    pub async fn product_impression(&mut self, product_id: u64, position: u32, list: &str) {
        if !self.allowed(false, None).await {
            return;
        }

        let Some(product) = self.lookup_product(product_id).await else {
            return;
        };

        let impression = self.payloads.build_impression(&product, position, list);
        let js = script::add_impression(
            &self.config.tracker_function_name,
            self.payloads.impression_json(&impression),
        );
        self.queue.enqueue(ScriptCategory::Impression, js);
    }

    /// Queue a product-detail view: the product data, the detail action, and
    /// the event send. Suppressed on same-path reloads so a form submission
    /// doesn't double-count the view.
    pub async fn product_viewed(&mut self, product_id: u64) {
        if !self.allowed(false, None).await {
            return;
        }

        if self.ctx.is_page_reload() {
            return;
        }

        let Some(product) = self.lookup_product(product_id).await else {
            return;
        };

        let function_name = self.config.tracker_function_name.clone();
        let record = self.payloads.build_product_record(&product, Some(1), None);
        let mut js = script::add_product(&function_name, self.payloads.product_json(&record));
        js.push_str(&script::set_action(
            &function_name,
            "detail",
            serde_json::Map::new(),
        ));
        self.queue.enqueue(ScriptCategory::Event, js);

        let properties = EventProperties::new("Products")
            .with_label(product.name.clone())
            .non_interaction();
        self.js_record_event(&self.config.event_names.viewed_product.clone(), properties);
    }

    /// Queue checkout-start tracking: every cart line as product data, the
    /// step-1 checkout action, and the event send. Reload-suppressed.
    pub async fn checkout_started(&mut self, cart: &[CartItem]) {
        if !self.allowed(false, None).await {
            return;
        }

        if self.ctx.is_page_reload() {
            return;
        }

        let function_name = self.config.tracker_function_name.clone();
        let mut js = String::new();

        for item in cart {
            let Some(product) = self.lookup_product(item.effective_product_id()).await else {
                continue;
            };
            let record = self
                .payloads
                .build_product_record(&product, Some(item.quantity), None);
            js.push_str(&script::add_product(
                &function_name,
                self.payloads.product_json(&record),
            ));
        }

        let option = if self.ctx.is_logged_in() {
            "Registered User"
        } else {
            "Guest"
        };
        let mut args = serde_json::Map::new();
        args.insert("step".to_string(), serde_json::Value::from(1));
        args.insert("option".to_string(), serde_json::Value::from(option));
        js.push_str(&script::set_action(&function_name, "checkout", args));

        self.queue.enqueue(ScriptCategory::Event, js);

        let properties = EventProperties::new("Checkout").non_interaction();
        self.js_record_event(&self.config.event_names.started_checkout.clone(), properties);
    }

    /// Queue an arbitrary script fragment. For callers extending the tracker
    /// with fragments of their own.
    pub fn enqueue_script(&mut self, category: ScriptCategory, js: impl Into<String>) {
        self.queue.enqueue(category, js);
    }

    /// Drain the queue for this render, in fixed category order. Returns the
    /// empty string when tracking is off or blocked for this visitor.
    pub async fn flush_scripts(&mut self) -> String {
        if !self.allowed(false, None).await {
            return String::new();
        }

        self.queue.flush()
    }

    // --- Server-side entry points -----------------------------------------

    /// Record a sign-in: deliver the event and persist the session's client
    /// id against the account, so later cookie-less hits resolve the same
    /// identity.
    pub async fn signed_in(&mut self) {
        let Some(user) = self.ctx.user.clone() else {
            return;
        };

        if !self.config.is_enabled() {
            return;
        }

        let properties = EventProperties::new("My Account").with_label(user.login.clone());
        self.api_record_event(
            &self.config.event_names.signed_in.clone(),
            properties,
            None,
            None,
            false,
        )
        .await;

        if let Err(e) = self
            .resolver
            .persist_account_identity(user.id, &self.ctx)
            .await
        {
            tracing::warn!(error = %e, user_id = user.id, "Failed to persist account identity");
        }
    }

    /// Record a server-side add-to-cart.
    pub async fn added_to_cart(
        &mut self,
        product_id: u64,
        variation_id: Option<u64>,
        quantity: u32,
        variation: &[(String, String)],
    ) {
        let Some(product) = self
            .lookup_product(variation_id.unwrap_or(product_id))
            .await
        else {
            return;
        };

        let mut properties = EventProperties::new("Products")
            .with_label(product.name.clone())
            .with_value(quantity as i64);
        for (name, value) in variation {
            properties
                .extra
                .insert(name.clone(), value.clone());
        }

        let ec = self.payloads.build_add_to_cart(&product, quantity);
        self.api_record_event(
            &self.config.event_names.added_to_cart.clone(),
            properties,
            Some(ec),
            None,
            false,
        )
        .await;
    }

    /// Record order placement: persist a forced identity against the order,
    /// then deliver the final checkout step.
    pub async fn order_placed(&mut self, order_id: u64) {
        if !self.config.is_enabled() {
            return;
        }

        let Some(order) = self.lookup_order(order_id).await else {
            return;
        };

        if let Err(e) = self.resolver.persist_order_identity(order.id, &self.ctx).await {
            tracing::warn!(error = %e, order_id, "Failed to persist order identity");
        }

        let properties = EventProperties::new("Checkout")
            .with_label(order.number.clone())
            .non_interaction();
        let ec = self
            .payloads
            .build_checkout(4, order.shipping_method.clone());

        self.api_record_event(
            &self.config.event_names.placed_order.clone(),
            properties,
            Some(ec),
            None,
            false,
        )
        .await;
    }

    /// Record a completed purchase, at most once per order.
    pub async fn purchase_completed(&mut self, order_id: u64) {
        if !self.config.is_enabled() {
            return;
        }

        let Some(order) = self.lookup_order(order_id).await else {
            return;
        };

        // Manual status changes arrive from the admin UI; eligibility is the
        // customer's, not the operator's.
        if !self
            .policy
            .tracking_enabled_for(&self.ctx, order.customer_id)
            .await
        {
            return;
        }

        if self.already_tracked(order.id, "purchase").await {
            return;
        }

        let properties = EventProperties::new("Checkout")
            .with_label(order.number.clone())
            .with_value(to_cents(order.total));

        let products = self.order_line_records(&order).await;
        let ec = self.payloads.build_purchase(&order, products);
        let identity = self.resolver.resolve_for_order(&order, &self.ctx).await;

        self.api_record_event(
            &self.config.event_names.completed_purchase.clone(),
            properties,
            Some(ec),
            Some(identity),
            true,
        )
        .await;

        self.mark_tracked(order.id).await;
    }

    /// Record a refund, at most once per refund entity. Full refunds carry
    /// the enhanced-ecommerce refund action; order-level partial refunds
    /// deliver the event without one.
    pub async fn refund_issued(&mut self, order_id: u64, refund_id: u64) {
        if !self.config.is_enabled() {
            return;
        }

        if self.already_tracked(refund_id, "refund").await {
            return;
        }

        let Some(order) = self.lookup_order(order_id).await else {
            return;
        };
        let refund = match self.orders.refund(refund_id).await {
            Ok(Some(refund)) => refund,
            Ok(None) => {
                tracing::debug!(refund_id, "Unknown refund, skipping");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, refund_id, "Refund lookup failed");
                return;
            }
        };

        let properties = EventProperties::new("Orders")
            .with_label(order.number.clone())
            .with_value(to_cents(refund.amount));

        let ec = if refund.full_refund || !refund.refunded_lines.is_empty() {
            let mut refunded = Vec::new();
            for line in &refund.refunded_lines {
                if let Some(product) = self.lookup_product(line.product_id).await {
                    refunded.push(self.payloads.build_product_record(
                        &product,
                        Some(line.quantity),
                        None,
                    ));
                }
            }
            Some(self.payloads.build_refund(&order, &refund, refunded))
        } else {
            None
        };

        let identity = self.resolver.resolve_for_order(&order, &self.ctx).await;

        self.api_record_event(
            &self.config.event_names.order_refunded.clone(),
            properties,
            ec,
            Some(identity),
            true,
        )
        .await;

        self.mark_tracked(refund_id).await;
    }

    /// Record a caller-defined event. Input is untrusted: names and
    /// properties are trimmed, blank entries dropped, and a blank name
    /// degrades to a no-op rather than an error.
    pub async fn custom_event(&mut self, event_name: &str, properties: &[(String, String)]) {
        let event_name = event_name.trim();
        if event_name.is_empty() {
            tracing::debug!("Custom event with blank name, ignoring");
            return;
        }

        let mut cleaned = BTreeMap::new();
        for (key, value) in properties {
            let key = key.trim();
            let value = value.trim();
            if !key.is_empty() && !value.is_empty() {
                cleaned.insert(key.to_string(), value.to_string());
            }
        }

        let mut props = EventProperties::new(
            cleaned
                .remove("eventCategory")
                .unwrap_or_else(|| "custom".to_string()),
        );
        props.action = cleaned.remove("eventAction");
        props.label = cleaned.remove("eventLabel");
        props.value = cleaned
            .remove("eventValue")
            .and_then(|v| v.parse::<i64>().ok());
        props.extra = cleaned;

        self.api_record_event(event_name, props, None, None, false)
            .await;
    }

    // --- Record paths -----------------------------------------------------

    /// Queue a client-side event fragment, policy permitting.
    fn js_record_event(&mut self, event_name: &str, properties: EventProperties) {
        // Policy was checked by the calling entry point; this only renders.
        let js = script::event(
            &self.config.tracker_function_name,
            event_name,
            &properties,
        );
        self.queue.enqueue(ScriptCategory::Event, js);
    }

    /// Deliver one server-side event hit: policy gate, identity resolution,
    /// uid suppression, ip/ua fill, then a single outbound request. Failure
    /// is logged and dropped.
    async fn api_record_event(
        &mut self,
        event_name: &str,
        properties: EventProperties,
        ec: Option<ProductAction>,
        identity: Option<Identity>,
        admin_event: bool,
    ) {
        if !self.config.is_enabled() {
            tracing::debug!(event = %event_name, "Tracking disabled, dropping event");
            return;
        }

        let subject = identity.as_ref().and_then(|i| i.uid);
        if !self.policy.should_track(&self.ctx, admin_event, subject).await {
            return;
        }

        let mut identity = match identity {
            Some(identity) if identity.has_client_id() => identity,
            _ => self.resolver.resolve(&self.ctx).await,
        };

        if !identity.has_client_id() {
            // A server-side hit without a client id is not attributable.
            tracing::debug!(event = %event_name, "No client id resolved, dropping event");
            return;
        }

        if !self.config.track_user_id {
            identity.uid = None;
        }

        if identity.ip.is_none() {
            identity.ip = self.ctx.ip.clone();
        }
        if identity.user_agent.is_none() {
            identity.user_agent = self.ctx.user_agent.clone();
        }

        let hit = EventHit {
            client_id: identity.cid.unwrap_or_default(),
            user_id: identity.uid.map(|uid| uid.to_string()),
            ip_override: identity.ip,
            user_agent: identity.user_agent,
            document_location: self.ctx.page_url.clone(),
            category: properties.category,
            action: properties
                .action
                .unwrap_or_else(|| event_name.to_string()),
            label: properties.label,
            value: properties.value,
            non_interaction: properties.non_interaction,
            ecommerce: ec.map(delivery::to_hit_fields),
        };

        if let Err(e) = self.sender.send_event(hit).await {
            tracing::warn!(error = %e, event = %event_name, "Measurement delivery failed");
        }
    }

    // --- Helpers ----------------------------------------------------------

    async fn allowed(&mut self, admin_event: bool, subject: Option<u64>) -> bool {
        self.config.is_enabled()
            && self.policy.should_track(&self.ctx, admin_event, subject).await
    }

    async fn already_tracked(&self, entity_id: u64, kind: &str) -> bool {
        match self.markers.is_tracked(entity_id).await {
            Ok(true) => {
                tracing::debug!(entity_id, kind, "Entity already tracked, skipping");
                true
            }
            Ok(false) => false,
            Err(e) => {
                // An unreadable marker must not double-count revenue.
                tracing::warn!(error = %e, entity_id, kind, "Marker lookup failed, skipping");
                true
            }
        }
    }

    async fn mark_tracked(&self, entity_id: u64) {
        if let Err(e) = self.markers.mark_tracked(entity_id).await {
            tracing::warn!(error = %e, entity_id, "Failed to persist tracked marker");
        }
    }

    async fn lookup_product(&self, product_id: u64) -> Option<shoptrace_common::Product> {
        match self.catalog.product(product_id).await {
            Ok(Some(product)) => Some(product),
            Ok(None) => {
                tracing::debug!(product_id, "Unknown product, skipping");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, product_id, "Product lookup failed");
                None
            }
        }
    }

    async fn lookup_order(&self, order_id: u64) -> Option<Order> {
        match self.orders.order(order_id).await {
            Ok(Some(order)) => Some(order),
            Ok(None) => {
                tracing::debug!(order_id, "Unknown order, skipping");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, order_id, "Order lookup failed");
                None
            }
        }
    }

    async fn order_line_records(&self, order: &Order) -> Vec<shoptrace_common::ProductRecord> {
        let mut records = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            if let Some(product) = self.lookup_product(line.product_id).await {
                records.push(
                    self.payloads
                        .build_product_record(&product, Some(line.quantity), None),
                );
            }
        }
        records
    }
}
