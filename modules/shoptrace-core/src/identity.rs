//! Identity resolution: who is this visitor, for tracking purposes.
//!
//! The client id (cid) is resolved with a fixed precedence: a persisted
//! per-account record, then the first-party analytics cookie, then a
//! generated UUID when policy allows, then nothing. Malformed inputs
//! degrade to "no id found" — tracking less beats breaking the storefront.

use std::sync::Arc;

use anyhow::Result;

use shoptrace_common::{Identity, Order, TrackingConfig};

use crate::context::RequestContext;
use crate::store::IdentityStore;
use crate::uuid_gen;

/// Final say on whether a client id should be generated when none was found.
/// The computed decision is a default, not absolute.
pub trait ClientIdPolicy: Send + Sync {
    fn generate_client_id(&self, computed: bool) -> bool;
}

pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
    config: TrackingConfig,
    client_id_policy: Option<Arc<dyn ClientIdPolicy>>,
    /// Client id generated earlier in this request, so repeated resolution
    /// within one request yields the same identity.
    generated: Option<String>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn IdentityStore>, config: TrackingConfig) -> Self {
        Self {
            store,
            config,
            client_id_policy: None,
            generated: None,
        }
    }

    pub fn with_client_id_policy(mut self, policy: Arc<dyn ClientIdPolicy>) -> Self {
        self.client_id_policy = Some(policy);
        self
    }

    /// Resolve the live-session identity: cid by precedence, uid from the
    /// authenticated account. IP and user agent are left for the delivery
    /// path to fill from the request.
    pub async fn resolve(&mut self, ctx: &RequestContext) -> Identity {
        Identity {
            cid: self.client_id(ctx, false).await,
            uid: ctx.user_id(),
            ip: None,
            user_agent: None,
        }
    }

    /// Resolve identity for a historical order. The order's own persisted
    /// identity record wins over anything the live session says, so a
    /// tracked order's identity never changes retroactively with the
    /// visitor's cookies. IP and user agent come from the order snapshot.
    pub async fn resolve_for_order(&mut self, order: &Order, ctx: &RequestContext) -> Identity {
        let stored = self
            .store
            .order_identity(order.id)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, order_id = order.id, "Order identity lookup failed");
                None
            });

        let cid = match stored.filter(|c| !c.is_empty()) {
            Some(cid) => Some(cid),
            None => self.client_id(ctx, false).await,
        };

        Identity {
            cid,
            uid: order.customer_id,
            ip: order.customer_ip.clone(),
            user_agent: order.customer_user_agent.clone(),
        }
    }

    /// Resolve the client id. Precedence: persisted account record, analytics
    /// cookie, generated UUID (when forced, or when the visitor is
    /// authenticated and user-id tracking is on), else none.
    pub async fn client_id(&mut self, ctx: &RequestContext, force_generate: bool) -> Option<String> {
        if let Some(user_id) = ctx.user_id() {
            match self.store.account_identity(user_id).await {
                Ok(Some(cid)) if !cid.is_empty() => return Some(cid),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(error = %e, user_id, "Account identity lookup failed");
                }
            }
        }

        if let Some(cookie) = ctx.analytics_cookie.as_deref() {
            if let Some(cid) = parse_cookie_client_id(cookie) {
                return Some(cid);
            }
            tracing::debug!("Analytics cookie present but malformed, ignoring");
        }

        // No identity found: cookies are probably disabled for the visitor,
        // or client-side tracking is blocked.
        let mut generate = force_generate
            || (ctx.is_logged_in() && self.config.track_user_id);

        if let Some(policy) = &self.client_id_policy {
            generate = policy.generate_client_id(generate);
        }

        if generate {
            if self.generated.is_none() {
                self.generated = Some(uuid_gen::generate());
            }
            return self.generated.clone();
        }

        None
    }

    /// Store the current session's client id against a newly created order,
    /// forcing generation so every order carries some identity.
    pub async fn persist_order_identity(&mut self, order_id: u64, ctx: &RequestContext) -> Result<()> {
        if let Some(cid) = self.client_id(ctx, true).await {
            self.store.set_order_identity(order_id, &cid).await?;
        }
        Ok(())
    }

    /// Store the current session's client id against an account at sign-in,
    /// so later cookie-less events for that account resolve the same
    /// identity.
    pub async fn persist_account_identity(&mut self, user_id: u64, ctx: &RequestContext) -> Result<()> {
        if let Some(cid) = self.client_id(ctx, false).await {
            self.store.set_account_identity(user_id, &cid).await?;
        }
        Ok(())
    }
}

/// Extract the client id from a first-party analytics cookie of the form
/// `version.domainDepth.cid1.cid2`. The split is limited to four parts, so
/// any further dots stay inside the second id half. Anything shorter parses
/// to nothing.
fn parse_cookie_client_id(cookie: &str) -> Option<String> {
    let parts: Vec<&str> = cookie.splitn(4, '.').collect();
    match parts.as_slice() {
        [_version, _domain_depth, cid1, cid2] if !cid1.is_empty() && !cid2.is_empty() => {
            Some(format!("{cid1}.{cid2}"))
        }
        _ => None,
    }
}
