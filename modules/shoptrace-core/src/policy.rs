//! Per-action tracking eligibility.
//!
//! Administrative UI activity is never tracked unless the event says
//! otherwise; beyond that, eligibility is a per-account role question.
//! An injected override gets the final word on every decision.

use std::collections::HashMap;
use std::sync::Arc;

use shoptrace_common::{AccountInfo, TrackingConfig};

use crate::context::RequestContext;
use crate::store::AccountDirectory;

/// Supplies the final tracking decision; the gate's computed value is a
/// default, not absolute.
pub trait PolicyOverride: Send + Sync {
    fn should_track(&self, computed: bool, admin_event: bool, subject: Option<u64>) -> bool;
}

pub struct TrackingPolicy {
    config: TrackingConfig,
    directory: Arc<dyn AccountDirectory>,
    policy_override: Option<Arc<dyn PolicyOverride>>,
    /// Per-subject results, cached for the lifetime of the request. Key 0 is
    /// the anonymous visitor.
    role_cache: HashMap<u64, bool>,
}

impl TrackingPolicy {
    pub fn new(config: TrackingConfig, directory: Arc<dyn AccountDirectory>) -> Self {
        Self {
            config,
            directory,
            policy_override: None,
            role_cache: HashMap::new(),
        }
    }

    pub fn with_override(mut self, policy_override: Arc<dyn PolicyOverride>) -> Self {
        self.policy_override = Some(policy_override);
        self
    }

    /// Decide whether an action is eligible for tracking.
    ///
    /// `admin_event` marks events that are legitimate even when triggered
    /// from the admin UI (an admin manually completing an order still counts
    /// as a purchase). `subject` defaults to the current visitor.
    pub async fn should_track(
        &mut self,
        ctx: &RequestContext,
        admin_event: bool,
        subject: Option<u64>,
    ) -> bool {
        let subject = subject.or_else(|| ctx.user_id());

        let mut track = if !admin_event && !ctx.is_background && ctx.is_admin_ui {
            false
        } else {
            self.tracking_enabled_for(ctx, subject).await
        };

        if let Some(policy_override) = &self.policy_override {
            track = policy_override.should_track(track, admin_event, subject);
        }

        track
    }

    /// Role-level eligibility for one subject, cached per request.
    pub async fn tracking_enabled_for(
        &mut self,
        ctx: &RequestContext,
        subject: Option<u64>,
    ) -> bool {
        let key = subject.unwrap_or(0);
        if let Some(&cached) = self.role_cache.get(&key) {
            return cached;
        }

        let enabled = match subject {
            None => true,
            Some(user_id) => {
                let account = self.lookup(ctx, user_id).await;
                match account {
                    // Unknown accounts and plain visitors are tracked.
                    None => true,
                    Some(account) => self.role_allows(&account),
                }
            }
        };

        self.role_cache.insert(key, enabled);
        enabled
    }

    fn role_allows(&self, account: &AccountInfo) -> bool {
        if account
            .roles
            .iter()
            .any(|role| self.config.excluded_roles.contains(role))
        {
            return false;
        }

        if account.can_manage_store {
            return self.config.admin_tracking_enabled;
        }

        true
    }

    async fn lookup(&self, ctx: &RequestContext, user_id: u64) -> Option<AccountInfo> {
        if let Some(user) = &ctx.user {
            if user.id == user_id {
                return Some(user.clone());
            }
        }

        self.directory.account(user_id).await.unwrap_or_else(|e| {
            tracing::debug!(error = %e, user_id, "Account lookup failed, tracking by default");
            None
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDirectory;

    fn account(id: u64, roles: &[&str], can_manage_store: bool) -> AccountInfo {
        AccountInfo {
            id,
            login: format!("user{id}"),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            can_manage_store,
        }
    }

    fn policy(config: TrackingConfig, accounts: Vec<AccountInfo>) -> TrackingPolicy {
        TrackingPolicy::new(config, Arc::new(MemoryDirectory::with_accounts(accounts)))
    }

    #[tokio::test]
    async fn admin_context_blocks_for_any_subject() {
        let mut policy = policy(TrackingConfig::default(), vec![]);
        let ctx = RequestContext {
            is_admin_ui: true,
            ..Default::default()
        };

        assert!(!policy.should_track(&ctx, false, None).await);
        assert!(!policy.should_track(&ctx, false, Some(7)).await);
        assert!(!policy.should_track(&ctx, false, Some(999)).await);
    }

    #[tokio::test]
    async fn background_admin_request_is_not_blocked() {
        let mut policy = policy(TrackingConfig::default(), vec![]);
        let ctx = RequestContext {
            is_admin_ui: true,
            is_background: true,
            ..Default::default()
        };

        assert!(policy.should_track(&ctx, false, None).await);
    }

    #[tokio::test]
    async fn admin_event_bypasses_admin_context_block() {
        let mut policy = policy(TrackingConfig::default(), vec![]);
        let ctx = RequestContext {
            is_admin_ui: true,
            ..Default::default()
        };

        assert!(policy.should_track(&ctx, true, None).await);
    }

    #[tokio::test]
    async fn excluded_role_blocks() {
        let config = TrackingConfig {
            excluded_roles: vec!["wholesaler".to_string()],
            ..Default::default()
        };
        let mut policy = policy(config, vec![account(7, &["wholesaler"], false)]);

        assert!(!policy
            .should_track(&RequestContext::default(), false, Some(7))
            .await);
    }

    #[tokio::test]
    async fn store_manager_blocked_unless_admin_tracking_enabled() {
        let manager = account(9, &["shop_manager"], true);

        let mut blocked = policy(TrackingConfig::default(), vec![manager.clone()]);
        assert!(!blocked
            .should_track(&RequestContext::default(), false, Some(9))
            .await);

        let config = TrackingConfig {
            admin_tracking_enabled: true,
            ..Default::default()
        };
        let mut allowed = policy(config, vec![manager]);
        assert!(allowed
            .should_track(&RequestContext::default(), false, Some(9))
            .await);
    }

    #[tokio::test]
    async fn anonymous_visitor_is_tracked() {
        let mut policy = policy(TrackingConfig::default(), vec![]);
        assert!(policy
            .should_track(&RequestContext::default(), false, None)
            .await);
    }

    #[tokio::test]
    async fn override_has_final_say_in_both_directions() {
        struct Invert;
        impl PolicyOverride for Invert {
            fn should_track(&self, computed: bool, _admin_event: bool, _subject: Option<u64>) -> bool {
                !computed
            }
        }

        let mut policy = TrackingPolicy::new(
            TrackingConfig::default(),
            Arc::new(MemoryDirectory::default()),
        )
        .with_override(Arc::new(Invert));

        // Allowed becomes blocked.
        assert!(!policy
            .should_track(&RequestContext::default(), false, None)
            .await);

        // Blocked becomes allowed.
        let admin_ctx = RequestContext {
            is_admin_ui: true,
            ..Default::default()
        };
        assert!(policy.should_track(&admin_ctx, false, None).await);
    }

    #[tokio::test]
    async fn role_results_are_cached_per_subject() {
        use std::sync::atomic::{AtomicU32, Ordering};

        struct CountingDirectory(AtomicU32);

        #[async_trait::async_trait]
        impl AccountDirectory for CountingDirectory {
            async fn account(&self, _user_id: u64) -> anyhow::Result<Option<AccountInfo>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        }

        let directory = Arc::new(CountingDirectory(AtomicU32::new(0)));
        let mut policy = TrackingPolicy::new(TrackingConfig::default(), directory.clone());
        let ctx = RequestContext::default();

        policy.should_track(&ctx, false, Some(7)).await;
        policy.should_track(&ctx, false, Some(7)).await;
        policy.should_track(&ctx, false, Some(7)).await;

        assert_eq!(directory.0.load(Ordering::SeqCst), 1);
    }
}
