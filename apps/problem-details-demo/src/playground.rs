//! Query-driven error rendering for trying out the writer by hand.
//!
//! `?status=N` picks the code (default 500). Without `raise_error` the
//! framework's generic path is used, so only `type`, `title`, `detail` and
//! `instance` reach the document. With `raise_error` a [`Problem`] is raised
//! and every other parameter becomes a field. `reason` and `log_message` are
//! honoured on both paths. The value `none` means `null`; values starting
//! with `{` or `[` are parsed as JSON.

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use problem_details::Problem;
use problem_details::axum::SendError;
use serde_json::Value;

const DEFAULT_STATUS: u16 = 500;

/// `GET /`
pub async fn handler(Query(params): Query<Vec<(String, String)>>) -> Response {
    let status = params
        .iter()
        .find(|(name, _)| name == "status")
        .and_then(|(_, raw)| raw.trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_STATUS);
    let raise = params.iter().any(|(name, _)| name == "raise_error");
    let fields = params
        .iter()
        .filter(|(name, _)| name != "status" && name != "raise_error");

    if raise {
        let mut problem = Problem::new(status);
        for (name, raw) in fields {
            problem = match name.as_str() {
                "reason" => problem.with_reason(raw.as_str()),
                "log_message" => problem.with_log_message(raw.as_str()),
                _ => problem.with_field(name.as_str(), &query_value(raw)),
            };
        }
        problem.into_response()
    } else {
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut error = SendError::new(code);
        for (name, raw) in fields {
            error = error.with_field(name.as_str(), query_value(raw));
        }
        error.into_response()
    }
}

/// `GET /panic`
///
/// # Panics
/// Always; the panic is rendered as an unhandled 500.
pub async fn panics() -> &'static str {
    panic!("this handler always panics")
}

fn query_value(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("none") {
        Value::Null
    } else if raw.starts_with(['{', '[']) {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
    } else {
        Value::String(raw.to_owned())
    }
}
