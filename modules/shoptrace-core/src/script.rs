//! Rendering of client-side tracker script fragments.
//!
//! Every fragment is a single statement calling the configured tracker
//! function. JSON bodies come from `serde_json`, so quoting and escaping are
//! never hand-rolled.

use serde_json::{Map, Value};

use shoptrace_common::EventProperties;

/// `ga( 'send', 'pageview' );`
pub fn pageview(function_name: &str) -> String {
    format!("{function_name}( 'send', 'pageview' );")
}

/// `ga( 'send', {"hitType":"event", …} );`
///
/// The action falls back to the event name; the category falls back to
/// "page", mirroring what reports expect for uncategorized events.
pub fn event(function_name: &str, event_name: &str, properties: &EventProperties) -> String {
    let mut body = Map::new();
    body.insert("hitType".to_string(), Value::from("event"));
    body.insert(
        "eventCategory".to_string(),
        Value::from(if properties.category.is_empty() {
            "page"
        } else {
            properties.category.as_str()
        }),
    );
    body.insert(
        "eventAction".to_string(),
        Value::from(properties.action.as_deref().unwrap_or(event_name)),
    );
    if let Some(label) = &properties.label {
        body.insert("eventLabel".to_string(), Value::from(label.clone()));
    }
    if let Some(value) = properties.value {
        body.insert("eventValue".to_string(), Value::from(value));
    }
    body.insert(
        "nonInteraction".to_string(),
        Value::from(properties.non_interaction),
    );

    format!(
        "{function_name}( 'send', {} );",
        Value::Object(body)
    )
}

/// `ga( 'ec:addImpression', {…} );`
pub fn add_impression(function_name: &str, data: Map<String, Value>) -> String {
    format!(
        "{function_name}( 'ec:addImpression', {} );",
        Value::Object(data)
    )
}

/// `ga( 'ec:addProduct', {…} );`
pub fn add_product(function_name: &str, data: Map<String, Value>) -> String {
    format!(
        "{function_name}( 'ec:addProduct', {} );",
        Value::Object(data)
    )
}

/// `ga( 'ec:setAction', 'detail' );` or with an argument object when fields
/// are present.
pub fn set_action(function_name: &str, action: &str, args: Map<String, Value>) -> String {
    if args.is_empty() {
        format!("{function_name}( 'ec:setAction', '{action}' );")
    } else {
        format!(
            "{function_name}( 'ec:setAction', '{action}', {} );",
            Value::Object(args)
        )
    }
}
