//! Trait seams for everything persistent or external to the engine.
//!
//! `IdentityStore` and `TrackedMarkerStore` wrap the storefront's key-value
//! store (meta records keyed by entity id). `ProductCatalog`, `OrderReader`
//! and `AccountDirectory` are the read-only domain lookups. The in-memory
//! implementations back deterministic tests: no network, no database.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use shoptrace_common::{AccountInfo, Order, Product, Refund};

/// Meta key under which a resolved client id is stored against an order or
/// account record.
pub const IDENTITY_META_KEY: &str = "_shoptrace_identity";

/// Meta key marking an order or refund as already reported.
pub const TRACKED_META_KEY: &str = "_shoptrace_tracked";

// ---------------------------------------------------------------------------
// IdentityStore
// ---------------------------------------------------------------------------

/// Persisted client-id records, keyed by account id or order id.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn account_identity(&self, user_id: u64) -> Result<Option<String>>;

    async fn set_account_identity(&self, user_id: u64, cid: &str) -> Result<()>;

    async fn order_identity(&self, order_id: u64) -> Result<Option<String>>;

    async fn set_order_identity(&self, order_id: u64, cid: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// TrackedMarkerStore
// ---------------------------------------------------------------------------

/// Idempotency markers for monetary entities.
///
/// The marker is read and then written within one request's control flow;
/// there is no compare-and-set because the backing store offers no
/// transactional contract. Two concurrent triggers for the same entity can
/// therefore both pass the check — an accepted race, favoring no duplicate
/// revenue over guaranteed delivery.
#[async_trait]
pub trait TrackedMarkerStore: Send + Sync {
    async fn is_tracked(&self, entity_id: u64) -> Result<bool>;

    /// Called once a delivery attempt has been initiated, not confirmed.
    async fn mark_tracked(&self, entity_id: u64) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Read-only domain lookups
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product(&self, product_id: u64) -> Result<Option<Product>>;
}

#[async_trait]
pub trait OrderReader: Send + Sync {
    async fn order(&self, order_id: u64) -> Result<Option<Order>>;

    async fn refund(&self, refund_id: u64) -> Result<Option<Refund>>;
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn account(&self, user_id: u64) -> Result<Option<AccountInfo>>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryIdentityStore {
    accounts: Mutex<HashMap<u64, String>>,
    orders: Mutex<HashMap<u64, String>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn account_identity(&self, user_id: u64) -> Result<Option<String>> {
        Ok(self.accounts.lock().await.get(&user_id).cloned())
    }

    async fn set_account_identity(&self, user_id: u64, cid: &str) -> Result<()> {
        self.accounts.lock().await.insert(user_id, cid.to_string());
        Ok(())
    }

    async fn order_identity(&self, order_id: u64) -> Result<Option<String>> {
        Ok(self.orders.lock().await.get(&order_id).cloned())
    }

    async fn set_order_identity(&self, order_id: u64, cid: &str) -> Result<()> {
        self.orders.lock().await.insert(order_id, cid.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMarkerStore {
    tracked: Mutex<HashMap<u64, String>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackedMarkerStore for MemoryMarkerStore {
    async fn is_tracked(&self, entity_id: u64) -> Result<bool> {
        Ok(self
            .tracked
            .lock()
            .await
            .get(&entity_id)
            .is_some_and(|v| v == "yes"))
    }

    async fn mark_tracked(&self, entity_id: u64) -> Result<()> {
        self.tracked
            .lock()
            .await
            .insert(entity_id, "yes".to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    products: HashMap<u64, Product>,
}

impl MemoryCatalog {
    pub fn with_products(products: Vec<Product>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
        }
    }
}

#[async_trait]
impl ProductCatalog for MemoryCatalog {
    async fn product(&self, product_id: u64) -> Result<Option<Product>> {
        Ok(self.products.get(&product_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryOrders {
    orders: HashMap<u64, Order>,
    refunds: HashMap<u64, Refund>,
}

impl MemoryOrders {
    pub fn with_orders(orders: Vec<Order>, refunds: Vec<Refund>) -> Self {
        Self {
            orders: orders.into_iter().map(|o| (o.id, o)).collect(),
            refunds: refunds.into_iter().map(|r| (r.id, r)).collect(),
        }
    }
}

#[async_trait]
impl OrderReader for MemoryOrders {
    async fn order(&self, order_id: u64) -> Result<Option<Order>> {
        Ok(self.orders.get(&order_id).cloned())
    }

    async fn refund(&self, refund_id: u64) -> Result<Option<Refund>> {
        Ok(self.refunds.get(&refund_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    accounts: HashMap<u64, AccountInfo>,
}

impl MemoryDirectory {
    pub fn with_accounts(accounts: Vec<AccountInfo>) -> Self {
        Self {
            accounts: accounts.into_iter().map(|a| (a.id, a)).collect(),
        }
    }
}

#[async_trait]
impl AccountDirectory for MemoryDirectory {
    async fn account(&self, user_id: u64) -> Result<Option<AccountInfo>> {
        Ok(self.accounts.get(&user_id).cloned())
    }
}
