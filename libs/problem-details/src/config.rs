use std::collections::BTreeMap;

use http::HeaderValue;
use serde::{Deserialize, Serialize};

use crate::encoder::SerializationPolicy;
use crate::reason::DEFAULT_FALLBACK_REASON;
use crate::type_links::TypeLinks;

/// Content type for problem documents (RFC 7807).
pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("content type '{value}' is not a valid header value")]
    InvalidContentType { value: String },

    #[error("type link key '{key}' is not an HTTP status code")]
    InvalidStatusKey { key: String },

    #[error("fallback reason '{value}' is not a valid reason phrase")]
    InvalidFallbackReason { value: String },
}

/// Configuration for the problem document writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProblemConfig {
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Reason phrase for status codes that have no registered phrase.
    #[serde(default = "default_fallback_reason")]
    pub fallback_reason: String,

    #[serde(default)]
    pub serialization: SerializationPolicy,

    /// Extra or overriding `type` links keyed by status code, e.g. `"418": "https://..."`.
    #[serde(default)]
    pub type_links: BTreeMap<String, String>,

    /// Drop the standard table and use only `type_links`.
    #[serde(default)]
    pub replace_type_links: bool,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            content_type: default_content_type(),
            fallback_reason: default_fallback_reason(),
            serialization: SerializationPolicy::default(),
            type_links: BTreeMap::new(),
            replace_type_links: false,
        }
    }
}

impl ProblemConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidContentType`] if the content type cannot be
    /// used as a header value.
    pub fn content_type_header(&self) -> Result<HeaderValue, ConfigError> {
        HeaderValue::from_str(self.content_type.trim())
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::InvalidContentType {
                value: self.content_type.clone(),
            })
    }

    /// Build the Status-Link Table: the standard one with overrides applied,
    /// or only the overrides when `replace_type_links` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidStatusKey`] for a key that is not a `u16`.
    pub fn build_type_links(&self) -> Result<TypeLinks, ConfigError> {
        let mut links = if self.replace_type_links {
            TypeLinks::empty()
        } else {
            TypeLinks::standard()
        };
        for (key, url) in &self.type_links {
            let code = key
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidStatusKey { key: key.clone() })?;
            links.extend([(code, url.clone())]);
        }
        Ok(links)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidFallbackReason`] when the phrase is empty
    /// or contains control characters.
    pub fn validated_fallback_reason(&self) -> Result<&str, ConfigError> {
        let reason = self.fallback_reason.as_str();
        let valid = !reason.is_empty()
            && reason
                .bytes()
                .all(|b| b == b'\t' || b == b' ' || b.is_ascii_graphic() || b >= 0x80);
        if valid {
            Ok(reason)
        } else {
            Err(ConfigError::InvalidFallbackReason {
                value: self.fallback_reason.clone(),
            })
        }
    }
}

fn default_content_type() -> String {
    APPLICATION_PROBLEM_JSON.to_owned()
}

fn default_fallback_reason() -> String {
    DEFAULT_FALLBACK_REASON.to_owned()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_to_empty_config() {
        let cfg: ProblemConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg, ProblemConfig::default());
        assert_eq!(cfg.content_type, APPLICATION_PROBLEM_JSON);
        assert_eq!(cfg.fallback_reason, "Abnormal Status");
        assert_eq!(cfg.serialization, SerializationPolicy::Strict);
        assert_eq!(cfg.build_type_links().unwrap(), TypeLinks::standard());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_value::<ProblemConfig>(json!({"contenttype": "x"}));
        assert!(err.is_err());
    }

    #[test]
    fn type_link_overrides_merge_over_standard_table() {
        let cfg: ProblemConfig = serde_json::from_value(json!({
            "type_links": {
                "418": "https://tools.ietf.org/html/rfc2324#section-2.3.2",
                "500": "https://errors.example.com/internal"
            }
        }))
        .unwrap();
        let links = cfg.build_type_links().unwrap();

        assert_eq!(
            links.get(418),
            Some("https://tools.ietf.org/html/rfc2324#section-2.3.2")
        );
        assert_eq!(links.get(500), Some("https://errors.example.com/internal"));
        assert_eq!(
            links.get(404),
            Some("https://tools.ietf.org/html/rfc7231#section-6.5.4")
        );
    }

    #[test]
    fn replace_drops_standard_table() {
        let cfg = ProblemConfig {
            type_links: BTreeMap::from([("409".to_owned(), "https://e.example/c".to_owned())]),
            replace_type_links: true,
            ..ProblemConfig::default()
        };
        let links = cfg.build_type_links().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links.get(500), None);
    }

    #[test]
    fn invalid_values_are_reported() {
        let cfg = ProblemConfig {
            type_links: BTreeMap::from([("teapot".to_owned(), "x".to_owned())]),
            ..ProblemConfig::default()
        };
        assert!(matches!(
            cfg.build_type_links(),
            Err(ConfigError::InvalidStatusKey { key }) if key == "teapot"
        ));

        let cfg = ProblemConfig {
            content_type: "application/problem+json\n".to_owned() + "x",
            ..ProblemConfig::default()
        };
        assert!(cfg.content_type_header().is_err());

        let cfg = ProblemConfig {
            fallback_reason: "bad\r\nreason".to_owned(),
            ..ProblemConfig::default()
        };
        assert!(cfg.validated_fallback_reason().is_err());
    }

    #[test]
    fn content_type_can_be_overridden() {
        let cfg = ProblemConfig {
            content_type: "application/vnd.example.problem+json".to_owned(),
            ..ProblemConfig::default()
        };
        assert_eq!(
            cfg.content_type_header().unwrap(),
            "application/vnd.example.problem+json"
        );
    }
}
