//! Integration tests for the per-request tracker: mock stores, recording hit
//! sink, no network.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use measurement_client::{EventHit, MeasurementError};
use shoptrace_common::{
    AccountInfo, CartItem, Order, OrderLine, Product, Refund, TrackingConfig,
};
use shoptrace_core::store::{
    MemoryCatalog, MemoryDirectory, MemoryIdentityStore, MemoryMarkerStore, MemoryOrders,
};
use shoptrace_core::{
    EventTracker, HitSender, IdentityStore, PolicyOverride, RequestContext, TrackedMarkerStore,
    TrackerStores,
};

// ---------------------------------------------------------------------------
// Recording hit sink
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSender {
    hits: tokio::sync::Mutex<Vec<EventHit>>,
}

impl RecordingSender {
    async fn hits(&self) -> Vec<EventHit> {
        self.hits.lock().await.clone()
    }
}

#[async_trait]
impl HitSender for RecordingSender {
    async fn send_event(&self, hit: EventHit) -> Result<(), MeasurementError> {
        self.hits.lock().await.push(hit);
        Ok(())
    }
}

/// A sink that always fails, for exercising the log-and-drop path.
struct FailingSender;

#[async_trait]
impl HitSender for FailingSender {
    async fn send_event(&self, _hit: EventHit) -> Result<(), MeasurementError> {
        Err(MeasurementError::Network("connection refused".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn widget() -> Product {
    Product {
        id: 42,
        sku: Some("SKU-42".to_string()),
        name: "Widget".to_string(),
        price: 9.99,
        category_path: vec!["Tools".to_string(), "Hand Tools".to_string()],
        variation_attributes: vec![],
        parent_id: None,
    }
}

fn order_1001() -> Order {
    Order {
        id: 1001,
        number: "1001".to_string(),
        customer_id: Some(7),
        total: 19.999,
        tax: 1.5,
        shipping_total: 4.99,
        coupon_code: None,
        currency: "USD".to_string(),
        shipping_method: Some("Flat rate".to_string()),
        customer_ip: None,
        customer_user_agent: None,
        created_at: Utc::now(),
        lines: vec![OrderLine {
            product_id: 42,
            quantity: 2,
            total: 19.98,
        }],
    }
}

fn full_refund_2001() -> Refund {
    Refund {
        id: 2001,
        order_id: 1001,
        amount: 19.999,
        full_refund: true,
        refunded_lines: vec![],
        created_at: Utc::now(),
    }
}

fn partial_refund_2002() -> Refund {
    Refund {
        id: 2002,
        order_id: 1001,
        amount: 5.0,
        full_refund: false,
        refunded_lines: vec![],
        created_at: Utc::now(),
    }
}

struct Harness {
    stores: TrackerStores,
    sender: Arc<RecordingSender>,
    markers: Arc<MemoryMarkerStore>,
    identities: Arc<MemoryIdentityStore>,
}

fn harness() -> Harness {
    let sender = Arc::new(RecordingSender::default());
    let markers = Arc::new(MemoryMarkerStore::new());
    let identities = Arc::new(MemoryIdentityStore::new());

    let stores = TrackerStores {
        identities: identities.clone(),
        markers: markers.clone(),
        catalog: Arc::new(MemoryCatalog::with_products(vec![widget()])),
        orders: Arc::new(MemoryOrders::with_orders(
            vec![order_1001()],
            vec![full_refund_2001(), partial_refund_2002()],
        )),
        directory: Arc::new(MemoryDirectory::default()),
        sender: sender.clone(),
    };

    Harness {
        stores,
        sender,
        markers,
        identities,
    }
}

fn enabled_config() -> TrackingConfig {
    TrackingConfig {
        tracking_id: "UA-12345-1".to_string(),
        ..Default::default()
    }
}

fn cookie_ctx() -> RequestContext {
    RequestContext {
        analytics_cookie: Some("1.2.111.222".to_string()),
        ip: Some("203.0.113.9".to_string()),
        user_agent: Some("test-agent".to_string()),
        ..Default::default()
    }
}

fn tracker(config: TrackingConfig, ctx: RequestContext, h: &Harness) -> EventTracker {
    EventTracker::new(config, ctx, h.stores.clone())
}

// ---------------------------------------------------------------------------
// Idempotent monetary delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn purchase_is_delivered_at_most_once() {
    let h = harness();

    let mut first = tracker(enabled_config(), cookie_ctx(), &h);
    first.purchase_completed(1001).await;

    // A retried trigger in a later request must be a no-op.
    let mut second = tracker(enabled_config(), cookie_ctx(), &h);
    second.purchase_completed(1001).await;

    let hits = h.sender.hits().await;
    assert_eq!(hits.len(), 1);

    let hit = &hits[0];
    assert_eq!(hit.category, "Checkout");
    assert_eq!(hit.action, "completed purchase");
    assert_eq!(hit.label.as_deref(), Some("1001"));
    assert_eq!(hit.value, Some(2000));
    assert_eq!(hit.client_id, "111.222");

    let ec = hit.ecommerce.as_ref().expect("purchase carries ecommerce");
    assert_eq!(ec.product_action.as_deref(), Some("purchase"));
    assert_eq!(ec.transaction_id.as_deref(), Some("1001"));
    assert_eq!(ec.revenue_cents, Some(2000));
    assert_eq!(ec.products.len(), 1);
    assert_eq!(ec.products[0].id.as_deref(), Some("SKU-42"));
    assert_eq!(ec.products[0].quantity, Some(2));
}

#[tokio::test]
async fn premarked_order_is_never_delivered() {
    let h = harness();
    h.markers.mark_tracked(1001).await.unwrap();

    let mut tracker = tracker(enabled_config(), cookie_ctx(), &h);
    tracker.purchase_completed(1001).await;

    assert!(h.sender.hits().await.is_empty());
}

#[tokio::test]
async fn refund_is_idempotent_per_refund_entity() {
    let h = harness();

    let mut t = tracker(enabled_config(), cookie_ctx(), &h);
    t.refund_issued(1001, 2001).await;
    t.refund_issued(1001, 2001).await;

    assert_eq!(h.sender.hits().await.len(), 1);
    assert!(h.markers.is_tracked(2001).await.unwrap());
    // The order's own purchase marker is untouched.
    assert!(!h.markers.is_tracked(1001).await.unwrap());
}

#[tokio::test]
async fn full_refund_carries_ecommerce_action_partial_does_not() {
    let h = harness();

    let mut t = tracker(enabled_config(), cookie_ctx(), &h);
    t.refund_issued(1001, 2001).await;
    t.refund_issued(1001, 2002).await;

    let hits = h.sender.hits().await;
    assert_eq!(hits.len(), 2);

    let full = &hits[0];
    assert_eq!(full.category, "Orders");
    assert_eq!(full.value, Some(2000));
    let ec = full.ecommerce.as_ref().expect("full refund carries action");
    assert_eq!(ec.product_action.as_deref(), Some("refund"));
    assert_eq!(ec.transaction_id.as_deref(), Some("1001"));

    let partial = &hits[1];
    assert_eq!(partial.value, Some(500));
    assert!(partial.ecommerce.is_none());
}

#[tokio::test]
async fn delivery_failure_still_marks_and_never_panics() {
    let h = harness();
    let stores = TrackerStores {
        sender: Arc::new(FailingSender),
        ..h.stores.clone()
    };

    let mut t = EventTracker::new(enabled_config(), cookie_ctx(), stores);
    t.purchase_completed(1001).await;

    // At-most-once: the attempt was initiated, so the marker is set even
    // though the collector never got the hit.
    assert!(h.markers.is_tracked(1001).await.unwrap());
}

// ---------------------------------------------------------------------------
// Identity on hits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn order_identity_survives_cookie_changes() {
    let h = harness();

    let mut placing = tracker(enabled_config(), cookie_ctx(), &h);
    placing.order_placed(1001).await;

    assert_eq!(
        h.identities.order_identity(1001).await.unwrap().as_deref(),
        Some("111.222")
    );

    // The purchase fires later, from a session with a different cookie.
    let mut later_ctx = cookie_ctx();
    later_ctx.analytics_cookie = Some("1.2.999.888".to_string());
    let mut completing = tracker(enabled_config(), later_ctx, &h);
    completing.purchase_completed(1001).await;

    let hits = h.sender.hits().await;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[1].client_id, "111.222");
}

#[tokio::test]
async fn uid_is_suppressed_unless_user_id_tracking_enabled() {
    let h = harness();

    let mut suppressed = tracker(enabled_config(), cookie_ctx(), &h);
    suppressed.purchase_completed(1001).await;

    let config = TrackingConfig {
        track_user_id: true,
        ..enabled_config()
    };
    let mut carried = tracker(config, cookie_ctx(), &h);
    carried.refund_issued(1001, 2001).await;

    let hits = h.sender.hits().await;
    assert_eq!(hits[0].user_id, None);
    assert_eq!(hits[1].user_id.as_deref(), Some("7"));
}

#[tokio::test]
async fn ip_and_user_agent_fill_from_request_context() {
    let h = harness();

    let mut t = tracker(enabled_config(), cookie_ctx(), &h);
    t.purchase_completed(1001).await;

    let hits = h.sender.hits().await;
    // The order snapshot has no ip/ua, so the live request supplies them.
    assert_eq!(hits[0].ip_override.as_deref(), Some("203.0.113.9"));
    assert_eq!(hits[0].user_agent.as_deref(), Some("test-agent"));
}

#[tokio::test]
async fn event_without_client_id_is_dropped_not_sent_partially() {
    let h = harness();

    // Anonymous visitor, no cookie: nothing to attribute the hit to.
    let ctx = RequestContext::default();
    let mut t = tracker(enabled_config(), ctx, &h);
    t.added_to_cart(42, None, 1, &[]).await;

    assert!(h.sender.hits().await.is_empty());
}

// ---------------------------------------------------------------------------
// Disabled and blocked states
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_config_makes_every_entry_point_a_noop() {
    let h = harness();

    let mut t = tracker(TrackingConfig::default(), cookie_ctx(), &h);
    t.page_view().await;
    t.product_impression(42, 1, "Product List").await;
    t.product_viewed(42).await;
    t.checkout_started(&[CartItem {
        product_id: 42,
        variation_id: None,
        quantity: 1,
    }])
    .await;
    t.added_to_cart(42, None, 1, &[]).await;
    t.order_placed(1001).await;
    t.purchase_completed(1001).await;
    t.refund_issued(1001, 2001).await;
    t.custom_event("custom thing", &[]).await;

    assert!(h.sender.hits().await.is_empty());
    assert_eq!(t.flush_scripts().await, "");
    assert!(!h.markers.is_tracked(1001).await.unwrap());
}

#[tokio::test]
async fn policy_override_blocks_delivery() {
    struct BlockAll;
    impl PolicyOverride for BlockAll {
        fn should_track(&self, _computed: bool, _admin: bool, _subject: Option<u64>) -> bool {
            false
        }
    }

    let h = harness();
    let mut t = tracker(enabled_config(), cookie_ctx(), &h)
        .with_policy_override(Arc::new(BlockAll));

    t.added_to_cart(42, None, 1, &[]).await;
    t.page_view().await;

    assert!(h.sender.hits().await.is_empty());
    assert_eq!(t.flush_scripts().await, "");
}

#[tokio::test]
async fn excluded_role_customer_purchase_is_not_tracked() {
    let h = harness();
    let stores = TrackerStores {
        directory: Arc::new(MemoryDirectory::with_accounts(vec![AccountInfo {
            id: 7,
            login: "wholesaler7".to_string(),
            roles: vec!["wholesaler".to_string()],
            can_manage_store: false,
        }])),
        ..h.stores.clone()
    };

    let config = TrackingConfig {
        excluded_roles: vec!["wholesaler".to_string()],
        ..enabled_config()
    };
    let mut t = EventTracker::new(config, cookie_ctx(), stores);
    t.purchase_completed(1001).await;

    assert!(h.sender.hits().await.is_empty());
}

// ---------------------------------------------------------------------------
// Client-side queue behavior
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scripts_flush_in_fixed_category_order() {
    let h = harness();
    let ctx = RequestContext {
        request_path: Some("/shop".to_string()),
        ..cookie_ctx()
    };

    let mut t = tracker(enabled_config(), ctx, &h);
    // Insertion order deliberately scrambled versus flush order.
    t.product_viewed(42).await;
    t.product_impression(42, 1, "Product List").await;
    t.page_view().await;

    let js = t.flush_scripts().await;
    let impression = js.find("ec:addImpression").expect("impression fragment");
    let pageview = js.find("'send', 'pageview'").expect("pageview fragment");
    let detail = js.find("ec:setAction").expect("detail fragment");

    assert!(impression < pageview);
    assert!(pageview < detail);

    // The queue lives for exactly one flush.
    assert_eq!(t.flush_scripts().await, "");
}

#[tokio::test]
async fn product_view_is_suppressed_on_page_reload() {
    let h = harness();
    let ctx = RequestContext {
        request_path: Some("/product/widget".to_string()),
        referer_path: Some("/product/widget".to_string()),
        ..cookie_ctx()
    };

    let mut t = tracker(enabled_config(), ctx, &h);
    t.product_viewed(42).await;

    assert_eq!(t.flush_scripts().await, "");
}

#[tokio::test]
async fn checkout_started_lists_cart_products() {
    let h = harness();
    let ctx = RequestContext {
        request_path: Some("/checkout".to_string()),
        referer_path: Some("/cart".to_string()),
        ..cookie_ctx()
    };

    let mut t = tracker(enabled_config(), ctx, &h);
    t.checkout_started(&[CartItem {
        product_id: 42,
        variation_id: None,
        quantity: 3,
    }])
    .await;

    let js = t.flush_scripts().await;
    assert!(js.contains("ec:addProduct"));
    assert!(js.contains("\"quantity\":3"));
    assert!(js.contains("'ec:setAction', 'checkout'"));
    assert!(js.contains("\"option\":\"Guest\""));
    assert!(js.contains("started checkout"));
}

// ---------------------------------------------------------------------------
// Custom events and sign-in
// ---------------------------------------------------------------------------

#[tokio::test]
async fn custom_event_sanitizes_untrusted_input() {
    let h = harness();
    let mut t = tracker(enabled_config(), cookie_ctx(), &h);

    t.custom_event(
        "  joined loyalty program  ",
        &[
            ("  eventCategory  ".to_string(), " Loyalty ".to_string()),
            ("eventLabel".to_string(), "gold tier".to_string()),
            ("eventValue".to_string(), "250".to_string()),
            ("".to_string(), "dropped".to_string()),
            ("also_dropped".to_string(), "   ".to_string()),
        ],
    )
    .await;

    let hits = h.sender.hits().await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].action, "joined loyalty program");
    assert_eq!(hits[0].category, "Loyalty");
    assert_eq!(hits[0].label.as_deref(), Some("gold tier"));
    assert_eq!(hits[0].value, Some(250));
}

#[tokio::test]
async fn custom_event_with_blank_name_is_dropped() {
    let h = harness();
    let mut t = tracker(enabled_config(), cookie_ctx(), &h);

    t.custom_event("   ", &[("eventCategory".to_string(), "x".to_string())])
        .await;

    assert!(h.sender.hits().await.is_empty());
}

#[tokio::test]
async fn sign_in_persists_account_identity() {
    let h = harness();
    let ctx = RequestContext {
        user: Some(AccountInfo {
            id: 7,
            login: "customer7".to_string(),
            roles: vec!["customer".to_string()],
            can_manage_store: false,
        }),
        ..cookie_ctx()
    };

    let mut t = tracker(enabled_config(), ctx, &h);
    t.signed_in().await;

    assert_eq!(
        h.identities.account_identity(7).await.unwrap().as_deref(),
        Some("111.222")
    );

    let hits = h.sender.hits().await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].category, "My Account");
    assert_eq!(hits[0].action, "signed in");
    assert_eq!(hits[0].label.as_deref(), Some("customer7"));
}
