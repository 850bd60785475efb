use shoptrace_common::AccountInfo;

/// Snapshot of the storefront request being handled. Built once by the caller
/// at request start; everything the engine knows about the visitor comes from
/// here or from the injected stores.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Raw value of the first-party analytics cookie, if the visitor sent one.
    pub analytics_cookie: Option<String>,
    /// The authenticated account, if any.
    pub user: Option<AccountInfo>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Full URL of the page being rendered, for document-location reporting.
    pub page_url: Option<String>,
    pub request_path: Option<String>,
    pub referer_path: Option<String>,
    /// True inside the administrative UI.
    pub is_admin_ui: bool,
    /// True for background (ajax) requests, which may originate from the
    /// storefront even when routed through admin endpoints.
    pub is_background: bool,
}

impl RequestContext {
    pub fn user_id(&self) -> Option<u64> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    /// A request is a reload when the referer path equals the requested path.
    /// No referer means no reload. Used to suppress duplicate view events
    /// after form submissions, not to suppress deliberate refreshes of
    /// pageviews.
    pub fn is_page_reload(&self) -> bool {
        match (&self.referer_path, &self.request_path) {
            (Some(referer), Some(path)) => referer == path,
            _ => false,
        }
    }
}

/// Extract the path component from a full referer URL, for reload comparison
/// against the request path. Unparseable referers yield nothing — a missing
/// referer already means "not a reload".
pub fn referer_path_from_url(referer: &str) -> Option<String> {
    url::Url::parse(referer).ok().map(|u| u.path().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referer_path_extraction() {
        assert_eq!(
            referer_path_from_url("https://shop.example/cart?coupon=SAVE10").as_deref(),
            Some("/cart")
        );
        assert_eq!(referer_path_from_url("not a url"), None);
    }

    #[test]
    fn no_referer_is_not_a_reload() {
        let ctx = RequestContext {
            request_path: Some("/cart".to_string()),
            ..Default::default()
        };
        assert!(!ctx.is_page_reload());
    }

    #[test]
    fn same_path_is_a_reload() {
        let ctx = RequestContext {
            request_path: Some("/cart".to_string()),
            referer_path: Some("/cart".to_string()),
            ..Default::default()
        };
        assert!(ctx.is_page_reload());
    }

    #[test]
    fn different_path_is_not_a_reload() {
        let ctx = RequestContext {
            request_path: Some("/checkout".to_string()),
            referer_path: Some("/cart".to_string()),
            ..Default::default()
        };
        assert!(!ctx.is_page_reload());
    }
}
