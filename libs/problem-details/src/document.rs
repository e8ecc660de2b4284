//! Problem document assembly and serialization.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

pub const STATUS_KEY: &str = "status";
pub const TYPE_KEY: &str = "type";

/// The optional members defined by RFC 7807, in output order.
pub const WELL_KNOWN_KEYS: [&str; 4] = ["type", "title", "detail", "instance"];

/// Keys consumed by the error-reporting path that never appear in a document.
pub const RESERVED_KEYS: [&str; 2] = ["log_message", "reason"];

/// Ad hoc keyword fields handed over by the generic error path.
pub type Fields = Map<String, Value>;

#[must_use]
pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// An `application/problem+json` document.
///
/// `status` is always present. The well-known members are written right after
/// it, extension members follow in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemDocument {
    status: u16,
    members: Vec<(String, Value)>,
}

impl ProblemDocument {
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            members: Vec::new(),
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        if key == STATUS_KEY {
            return None;
        }
        self.members
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a member. Reserved keys and `status` are refused and `false` is returned.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if key == STATUS_KEY || is_reserved(&key) {
            return false;
        }
        if let Some(slot) = self.members.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.members.push((key, value));
        }
        true
    }

    /// Fill in `type` unless the caller already set it, even to `null`.
    pub fn set_default_type(&mut self, type_url: &str) {
        if !self.contains(TYPE_KEY) {
            self.insert(TYPE_KEY, Value::String(type_url.to_owned()));
        }
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.members.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The document as a JSON object, `status` included.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.members.len() + 1);
        map.insert(STATUS_KEY.to_owned(), Value::from(self.status));
        for (k, v) in &self.members {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }

    /// # Errors
    ///
    /// Returns an error if `serde_json` fails to write the document.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl Serialize for ProblemDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.members.len() + 1))?;
        map.serialize_entry(STATUS_KEY, &self.status)?;
        for key in WELL_KNOWN_KEYS {
            if let Some(value) = self.get(key) {
                map.serialize_entry(key, value)?;
            }
        }
        for (key, value) in &self.members {
            if !WELL_KNOWN_KEYS.contains(&key.as_str()) {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_only_document() {
        let doc = ProblemDocument::new(600);
        assert_eq!(serde_json::to_string(&doc).unwrap(), r#"{"status":600}"#);
    }

    #[test]
    fn well_known_members_follow_status() {
        let mut doc = ProblemDocument::new(401);
        doc.insert("custom", json!({"a": ["list"]}));
        doc.insert("title", json!("Unauthorized"));
        doc.set_default_type("https://tools.ietf.org/html/rfc7235#section-3.1");

        assert_eq!(
            serde_json::to_string(&doc).unwrap(),
            r#"{"status":401,"type":"https://tools.ietf.org/html/rfc7235#section-3.1","title":"Unauthorized","custom":{"a":["list"]}}"#
        );
    }

    #[test]
    fn reserved_and_status_keys_are_refused() {
        let mut doc = ProblemDocument::new(500);
        assert!(!doc.insert("reason", json!("Oops")));
        assert!(!doc.insert("log_message", json!("boom")));
        assert!(!doc.insert("status", json!(200)));
        assert!(doc.insert("detail", json!("kept")));

        assert_eq!(doc.to_value(), json!({"status": 500, "detail": "kept"}));
    }

    #[test]
    fn explicit_null_type_blocks_default() {
        let mut doc = ProblemDocument::new(500);
        doc.insert("type", Value::Null);
        doc.set_default_type("https://tools.ietf.org/html/rfc7231#section-6.6.1");

        assert_eq!(doc.get("type"), Some(&Value::Null));
        assert_eq!(doc.to_value(), json!({"status": 500, "type": null}));
    }
}
