//! The structured failure raised by application code.

use std::any::Any;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::document::{STATUS_KEY, is_reserved};
use crate::encoder::{FieldValue, OpaqueValue};

/// An intentional failure that is rendered as a problem document.
///
/// Carries the status code, an optional log message for the server log, an
/// optional reason phrase for the status line, and any number of extension
/// fields. Neither the log message nor the reason phrase ever reaches the
/// document.
///
/// ```
/// use problem_details::Problem;
///
/// let problem = Problem::new(403)
///     .with_title("You do not have enough credit.")
///     .with_detail("Your current balance is 30, but that costs 50.")
///     .with_field("balance", &30)
///     .with_log_message("purchase rejected");
///
/// assert_eq!(problem.status(), 403);
/// assert_eq!(problem.document_fields().count(), 3);
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct Problem {
    status: u16,
    log_message: Option<String>,
    reason: Option<String>,
    fields: Vec<(String, FieldValue)>,
}

impl Problem {
    /// Any integer status is accepted, including nonstandard codes.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            log_message: None,
            reason: None,
            fields: Vec::new(),
        }
    }

    pub fn from_status(status: http::StatusCode) -> Self {
        Self::new(status.as_u16())
    }

    /// Message written to the server log when this problem is handled.
    pub fn with_log_message(mut self, message: impl Into<String>) -> Self {
        self.log_message = Some(message.into());
        self
    }

    /// Reason phrase for the response status line.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.with_json("title", Value::String(title.into()))
    }

    pub fn with_detail(self, detail: impl Into<String>) -> Self {
        self.with_json("detail", Value::String(detail.into()))
    }

    pub fn with_instance(self, instance: impl Into<String>) -> Self {
        self.with_json("instance", Value::String(instance.into()))
    }

    /// Explicit `type`; suppresses the default link from the status table.
    pub fn with_type(self, type_url: impl Into<String>) -> Self {
        self.with_json("type", Value::String(type_url.into()))
    }

    /// Set `key` to an explicit JSON `null`.
    pub fn with_null(self, key: impl Into<String>) -> Self {
        self.with_json(key, Value::Null)
    }

    /// Attach an extension field from any serializable value.
    ///
    /// A value whose `Serialize` impl fails is kept and reported when the
    /// document is written.
    pub fn with_field<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        self.set(key.into(), FieldValue::from_serialize(value));
        self
    }

    /// Attach a domain value that is rendered by an encoder registered on the writer.
    pub fn with_opaque<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.set(key.into(), FieldValue::Opaque(OpaqueValue::new(value)));
        self
    }

    fn with_json(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key.into(), FieldValue::Json(value));
        self
    }

    fn set(&mut self, key: String, value: FieldValue) {
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn log_message(&self) -> Option<&str> {
        self.log_message.as_deref()
    }

    /// The reason phrase override, if one was given.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    /// Fields destined for the document, in insertion order.
    ///
    /// The reserved keys and `status` are never yielded; `status` always comes
    /// from the response code.
    pub fn document_fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .filter(|(k, _)| k != STATUS_KEY && !is_reserved(k))
            .map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(message) = &self.log_message {
            write!(f, ": {message}")?;
        } else if let Some(Value::String(title)) = self.field("title").and_then(FieldValue::as_json)
        {
            write!(f, ": {title}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Problem {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(problem: &Problem) -> Vec<&str> {
        problem.document_fields().map(|(k, _)| k).collect()
    }

    #[test]
    fn builder_collects_fields_in_order() {
        let p = Problem::new(403)
            .with_title("You do not have enough credit.")
            .with_detail("Your current balance is 30, but that costs 50")
            .with_instance("/account/12345/msgs/abc")
            .with_field("balance", &30)
            .with_field("accounts", &["/account/12345", "/account/67890"]);

        assert_eq!(p.status(), 403);
        assert_eq!(
            keys(&p),
            vec!["title", "detail", "instance", "balance", "accounts"]
        );
        assert_eq!(
            p.field("accounts").and_then(FieldValue::as_json),
            Some(&json!(["/account/12345", "/account/67890"]))
        );
    }

    #[test]
    fn later_values_replace_earlier_ones() {
        let p = Problem::new(400)
            .with_title("first")
            .with_field("x", &1)
            .with_title("second");

        assert_eq!(keys(&p), vec!["title", "x"]);
        assert_eq!(
            p.field("title").and_then(FieldValue::as_json),
            Some(&json!("second"))
        );
    }

    #[test]
    fn reserved_keys_and_status_never_reach_the_document() {
        let p = Problem::new(401)
            .with_reason("Go Away")
            .with_log_message("token expired")
            .with_field("reason", "smuggled")
            .with_field("log_message", "smuggled")
            .with_field("status", &999)
            .with_field("custom", &json!({"a": ["list"]}));

        assert_eq!(p.reason(), Some("Go Away"));
        assert_eq!(p.log_message(), Some("token expired"));
        assert_eq!(keys(&p), vec!["custom"]);
    }

    #[test]
    fn explicit_null_is_kept() {
        let p = Problem::new(500).with_null("instance");
        assert_eq!(
            p.field("instance").and_then(FieldValue::as_json),
            Some(&Value::Null)
        );
    }

    #[test]
    fn display_prefers_log_message_then_title() {
        assert_eq!(Problem::new(600).to_string(), "HTTP 600");
        assert_eq!(
            Problem::new(404).with_title("Customer does not exist").to_string(),
            "HTTP 404: Customer does not exist"
        );
        assert_eq!(
            Problem::new(404)
                .with_title("Customer does not exist")
                .with_log_message("lookup miss")
                .to_string(),
            "HTTP 404: lookup miss"
        );
    }

    #[test]
    fn opaque_values_are_held_for_the_encoder() {
        struct Opaque;
        let p = Problem::new(422).with_opaque("failure", Opaque);
        assert!(matches!(p.field("failure"), Some(FieldValue::Opaque(_))));
    }
}
