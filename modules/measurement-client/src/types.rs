/// Wire protocol version. The collector ignores hits without it.
pub const PROTOCOL_VERSION: &str = "1";

/// A single server-side event hit, ready to be flattened into the collector's
/// parameter set. `client_id` is mandatory; everything optional is omitted
/// from the request when unset (the collector treats absent and empty
/// differently).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventHit {
    pub client_id: String,
    pub user_id: Option<String>,
    /// Overrides the IP the collector would otherwise attribute.
    pub ip_override: Option<String>,
    pub user_agent: Option<String>,
    pub document_location: Option<String>,
    pub category: String,
    pub action: String,
    pub label: Option<String>,
    pub value: Option<i64>,
    pub non_interaction: bool,
    pub ecommerce: Option<EcommerceFields>,
}

/// Enhanced-ecommerce fields attached to a hit. Monetary amounts are integer
/// counts of the smallest currency unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EcommerceFields {
    pub product_action: Option<String>,
    pub transaction_id: Option<String>,
    pub revenue_cents: Option<i64>,
    pub tax_cents: Option<i64>,
    pub shipping_cents: Option<i64>,
    pub coupon: Option<String>,
    pub checkout_step: Option<u32>,
    pub checkout_option: Option<String>,
    pub action_list: Option<String>,
    pub currency: Option<String>,
    pub products: Vec<ProductParams>,
}

/// One product in a hit, flattened as `pr{N}id`, `pr{N}nm`, and so on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductParams {
    pub id: Option<String>,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub variant: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<u32>,
    pub position: Option<u32>,
}

impl EventHit {
    /// Flatten this hit into the collector's form parameters. Unset fields
    /// are left out entirely.
    pub fn into_params(self, tracking_id: &str) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = Vec::new();

        push(&mut params, "v", PROTOCOL_VERSION);
        push(&mut params, "tid", tracking_id);
        push(&mut params, "cid", &self.client_id);
        push_opt(&mut params, "uid", self.user_id);
        push(&mut params, "t", "event");
        push_opt(&mut params, "uip", self.ip_override);
        push_opt(&mut params, "ua", self.user_agent);
        push_opt(&mut params, "dl", self.document_location);
        push(&mut params, "ec", &self.category);
        push(&mut params, "ea", &self.action);
        push_opt(&mut params, "el", self.label);
        push_opt(&mut params, "ev", self.value.map(|v| v.to_string()));
        if self.non_interaction {
            push(&mut params, "ni", "1");
        }

        if let Some(ec) = self.ecommerce {
            ec.flatten_into(&mut params);
        }

        params
    }
}

impl EcommerceFields {
    fn flatten_into(self, params: &mut Vec<(String, String)>) {
        push_opt(params, "pa", self.product_action);
        push_opt(params, "ti", self.transaction_id);
        push_opt(params, "tr", self.revenue_cents.map(|v| v.to_string()));
        push_opt(params, "tt", self.tax_cents.map(|v| v.to_string()));
        push_opt(params, "ts", self.shipping_cents.map(|v| v.to_string()));
        push_opt(params, "tcc", self.coupon);
        push_opt(params, "cos", self.checkout_step.map(|v| v.to_string()));
        push_opt(params, "col", self.checkout_option);
        push_opt(params, "pal", self.action_list);
        push_opt(params, "cu", self.currency);

        for (i, product) in self.products.into_iter().enumerate() {
            // Product indexes are 1-based on the wire.
            let n = i + 1;
            push_opt(params, &format!("pr{n}id"), product.id);
            push_opt(params, &format!("pr{n}nm"), product.name);
            push_opt(params, &format!("pr{n}br"), product.brand);
            push_opt(params, &format!("pr{n}ca"), product.category);
            push_opt(params, &format!("pr{n}va"), product.variant);
            push_opt(
                params,
                &format!("pr{n}pr"),
                product.price.map(|p| format!("{p:.2}")),
            );
            push_opt(params, &format!("pr{n}qt"), product.quantity.map(|q| q.to_string()));
            push_opt(params, &format!("pr{n}ps"), product.position.map(|p| p.to_string()));
        }
    }
}

fn push(params: &mut Vec<(String, String)>, key: &str, value: &str) {
    if !value.is_empty() {
        params.push((key.to_string(), value.to_string()));
    }
}

fn push_opt(params: &mut Vec<(String, String)>, key: &str, value: Option<String>) {
    if let Some(v) = value {
        push(params, key, &v);
    }
}
