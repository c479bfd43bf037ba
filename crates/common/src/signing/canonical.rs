use reqwest::Method;
use serde_json::{Map, Value};
use sha2::{Digest, Sha512};
use url::Url;

/// Copy of `value` with every object's keys in sorted order; arrays keep their order
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Compact JSON with recursively sorted keys
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

pub fn sha512_hex(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}

/// The request as it is hashed for signing:
///
/// ```text
/// METHOD \n /path \n ?query \n "" \n "" \n sha512hex(canonical body)
/// ```
///
/// Headers are not signed; the two empty lines hold their place.
pub fn canonical_request(method: &Method, url: &Url, body: &Value) -> String {
    let search = url.query().map(|q| format!("?{q}")).unwrap_or_default();
    let body_hash = sha512_hex(canonical_json(body).as_bytes());
    [
        method.as_str(),
        url.path(),
        search.as_str(),
        "",
        "",
        body_hash.as_str(),
    ]
    .join("\n")
}

/// `type \n date \n sha512hex(canonical request)`
pub fn string_to_sign(signature_type: &str, date: &str, canonical_request: &str) -> String {
    let request_hash = sha512_hex(canonical_request.as_bytes());
    [signature_type, date, request_hash.as_str()].join("\n")
}
