//! Query string encoding for nested parameter maps.
//!
//! Objects nest as `key[sub]=value`, arrays repeat as `key[]=value`. Output
//! follows the map's insertion order, so the same params always produce the
//! same string.

use serde_json::{Map, Value};

/// Encodes `params` as an `application/x-www-form-urlencoded` query string.
///
/// `null` values are skipped at every level, and empty nested containers
/// contribute no pair. An empty map encodes to an empty string.
pub fn to_query_string(params: &Map<String, Value>) -> String {
    let mut pairs = Vec::new();
    for (key, value) in params {
        collect_pairs(key, value, &mut pairs);
    }
    pairs.join("&")
}

fn collect_pairs(prefix: &str, value: &Value, pairs: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            let prefix = format!("{prefix}[]");
            for item in items {
                collect_pairs(&prefix, item, pairs);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                collect_pairs(&format!("{prefix}[{key}]"), item, pairs);
            }
        }
        scalar => pairs.push(format!("{}={}", encode(prefix), encode(&scalar_text(scalar)))),
    }
}

/// Text form of a scalar: strings as-is, numbers and booleans as JSON text.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn encode(input: &str) -> String {
    form_urlencoded::byte_serialize(input.as_bytes()).collect()
}
