//! Reason phrase resolution for the response status line.

use http::StatusCode;

/// Reason phrase used for codes that have no registered phrase.
pub const DEFAULT_FALLBACK_REASON: &str = "Abnormal Status";

/// Registered reason phrase for `status`, if any.
#[must_use]
pub fn canonical(status: u16) -> Option<&'static str> {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
}

/// Pick the reason phrase for the status line.
///
/// An explicit override wins, then the registered phrase, then `fallback`.
#[must_use]
pub fn resolve(status: u16, override_reason: Option<&str>, fallback: &str) -> String {
    override_reason
        .or_else(|| canonical(status))
        .unwrap_or(fallback)
        .to_owned()
}
