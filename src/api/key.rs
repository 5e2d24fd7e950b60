//! Request identity.
//!
//! Method, URL and body together identify a logical request: they key both
//! the cached response and the in-flight deduplication table.

use reqwest::Method;
use serde_json::{Map, Value};

/// Builds the cache / deduplication key of a request.
///
/// Each segment is written as `<byte length>:<text>` so that no choice of
/// method, URL or body can shift a boundary (e.g. a URL ending in `|` cannot
/// be confused with the separator). The body is compact JSON with object
/// keys sorted at every depth, so equal bodies always produce equal keys
/// whatever map ordering serde_json was built with. A missing body is an
/// empty segment, distinct from an empty object `{}`.
pub fn request_key(method: &Method, url: &str, body: Option<&Value>) -> String {
    let body = body.map(|b| canonical(b).to_string()).unwrap_or_default();
    let method = method.as_str();
    format!(
        "{}:{}|{}:{}|{}:{}",
        method.len(),
        method,
        url.len(),
        url,
        body.len(),
        body
    )
}

/// Rebuilds `value` with object keys inserted in sorted order.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key.clone(), canonical(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
