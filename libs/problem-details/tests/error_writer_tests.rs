#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end behaviour of the error writer behind an axum router.
//!
//! The `/` handler mirrors a typical application: `?status=N` picks the code,
//! `raise_error` switches from the framework's generic error path to a
//! structured `Problem`, and every other query parameter becomes a field.
//! The value `none` means JSON `null`; values starting with `{` or `[` are
//! parsed as JSON.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    Json,
    extract::Query,
    http::{Request, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use http_body_util::BodyExt;
use hyper::ext::ReasonPhrase;
use problem_details::{
    ErrorWriter, Problem, ProblemConfig, SerializationPolicy, TypeLinks,
    axum::{SendError, Unhandled, panic_response, write_errors},
    type_links::standard_link,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tracing_test::traced_test;

#[derive(Clone, Copy, Debug)]
enum Path {
    SendError,
    Raise,
}

const BOTH: [Path; 2] = [Path::SendError, Path::Raise];

fn query_value(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("none") {
        Value::Null
    } else if raw.starts_with(['{', '[']) {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
    } else {
        Value::String(raw.to_owned())
    }
}

async fn handler(Query(params): Query<HashMap<String, String>>) -> Response {
    let status: u16 = params
        .get("status")
        .and_then(|s| s.parse().ok())
        .unwrap_or(200);

    if params.contains_key("raise_error") {
        let mut problem = Problem::new(status);
        for (name, raw) in &params {
            if name == "raise_error" || name == "status" {
                continue;
            }
            problem = match name.as_str() {
                "reason" => problem.with_reason(raw.clone()),
                "log_message" => problem.with_log_message(raw.clone()),
                _ => problem.with_field(name.clone(), &query_value(raw)),
            };
        }
        problem.into_response()
    } else {
        let mut send = SendError::new(StatusCode::from_u16(status).unwrap());
        for (name, raw) in &params {
            if name != "status" {
                send = send.with_field(name.clone(), query_value(raw));
            }
        }
        send.into_response()
    }
}

async fn panics() -> &'static str {
    panic!("handler exploded")
}

async fn fails() -> Result<&'static str, Unhandled> {
    let n: u32 = "forty-two".parse()?;
    Ok(if n > 0 { "positive" } else { "zero" })
}

async fn fails_with_context() -> Result<&'static str, Unhandled> {
    let saved: anyhow::Result<&'static str> =
        Err(anyhow::anyhow!("root cause: disk full").context("saving customer"));
    Ok(saved?)
}

async fn conflict() -> (StatusCode, Json<Value>) {
    (StatusCode::CONFLICT, Json(json!({"existing_id": "abc"})))
}

fn app(writer: ErrorWriter) -> Router {
    Router::new()
        .route("/", get(handler))
        .route("/panic", get(panics))
        .route("/fails", get(fails))
        .route("/fails-with-context", get(fails_with_context))
        .route("/conflict", get(conflict))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(Arc::new(writer), write_errors))
}

async fn send(app: Router, path: Path, query: &[(&str, &str)]) -> Response {
    let mut pairs: Vec<(&str, &str)> = query.to_vec();
    if matches!(path, Path::Raise) {
        pairs.push(("raise_error", "true"));
    }
    let uri = format!("/?{}", serde_urlencoded::to_string(&pairs).unwrap());
    get_uri(app, &uri).await
}

async fn get_uri(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn content_type(response: &Response) -> &str {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[tokio::test]
async fn error_sets_problem_content_type() {
    for path in BOTH {
        let response = send(app(ErrorWriter::new()), path, &[("status", "500")]).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{path:?}");
        assert_eq!(content_type(&response), "application/problem+json", "{path:?}");
    }
}

#[tokio::test]
async fn error_includes_status() {
    for path in BOTH {
        let response = send(app(ErrorWriter::new()), path, &[("status", "500")]).await;
        assert_eq!(body_json(response).await["status"], json!(500), "{path:?}");
    }
}

#[tokio::test]
async fn type_defaults_to_rfc_link() {
    for path in BOTH {
        let response = send(app(ErrorWriter::new()), path, &[("status", "500")]).await;
        let body = body_json(response).await;
        assert_eq!(body["type"], json!(standard_link(500).unwrap()), "{path:?}");
        assert_eq!(
            body["type"],
            json!("https://tools.ietf.org/html/rfc7231#section-6.6.1"),
            "{path:?}"
        );
    }
}

#[tokio::test]
async fn every_table_entry_is_used_as_default_type() {
    for (code, url) in TypeLinks::standard().iter() {
        let status = code.to_string();
        let response = send(app(ErrorWriter::new()), Path::Raise, &[("status", &status)]).await;
        assert_eq!(response.status().as_u16(), code);
        assert_eq!(body_json(response).await["type"], json!(url), "code {code}");
    }
}

#[tokio::test]
async fn type_is_not_set_for_unknown_status_code() {
    for path in BOTH {
        let response = send(app(ErrorWriter::new()), path, &[("status", "600")]).await;
        assert_eq!(response.status().as_u16(), 600, "{path:?}");
        assert_eq!(
            response.extensions().get::<ReasonPhrase>().unwrap().as_bytes(),
            b"Abnormal Status"
        );
        let body = body_json(response).await;
        assert_eq!(body, json!({"status": 600}), "{path:?}");
    }
}

#[tokio::test]
async fn type_can_be_overridden() {
    for path in BOTH {
        let response = send(
            app(ErrorWriter::new()),
            path,
            &[("status", "500"), ("type", "http://example.com/errors#500")],
        )
        .await;
        assert_eq!(
            body_json(response).await["type"],
            json!("http://example.com/errors#500"),
            "{path:?}"
        );
    }
}

#[tokio::test]
async fn title_detail_and_instance_can_be_set() {
    for path in BOTH {
        let response = send(
            app(ErrorWriter::new()),
            path,
            &[
                ("status", "500"),
                ("title", "Uh oh"),
                ("detail", "something bad happened"),
                ("instance", "http://example.com/probs/out-of-credit"),
            ],
        )
        .await;
        let body = body_json(response).await;
        assert_eq!(body["title"], json!("Uh oh"), "{path:?}");
        assert_eq!(body["detail"], json!("something bad happened"), "{path:?}");
        assert_eq!(
            body["instance"],
            json!("http://example.com/probs/out-of-credit"),
            "{path:?}"
        );
    }
}

#[tokio::test]
async fn well_known_fields_can_be_null() {
    for path in BOTH {
        let response = send(
            app(ErrorWriter::new()),
            path,
            &[("status", "500"), ("instance", "None"), ("type", "none")],
        )
        .await;
        let body = body_json(response).await;
        assert_eq!(
            body,
            json!({"status": 500, "instance": null, "type": null}),
            "{path:?}"
        );
    }
}

#[tokio::test]
async fn custom_attributes_can_be_set_on_problem() {
    let response = send(
        app(ErrorWriter::new()),
        Path::Raise,
        &[("status", "401"), ("custom", r#"{"a": ["list"]}"#)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        json!({
            "status": 401,
            "type": "https://tools.ietf.org/html/rfc7235#section-3.1",
            "custom": {"a": ["list"]}
        })
    );
}

#[tokio::test]
async fn custom_attributes_are_ignored_on_generic_path() {
    let response = send(
        app(ErrorWriter::new()),
        Path::SendError,
        &[("status", "401"), ("custom", r#"{"a": ["list"]}"#)],
    )
    .await;
    let body = body_json(response).await;
    assert!(body.get("custom").is_none(), "{body}");
}

#[tokio::test]
async fn reason_and_log_message_stay_out_of_the_body() {
    for path in BOTH {
        let response = send(
            app(ErrorWriter::new()),
            path,
            &[
                ("status", "409"),
                ("reason", "Already There"),
                ("log_message", "duplicate"),
            ],
        )
        .await;
        assert_eq!(
            response.extensions().get::<ReasonPhrase>().unwrap().as_bytes(),
            b"Already There",
            "{path:?}"
        );
        let body = body_json(response).await;
        assert!(body.get("reason").is_none(), "{path:?}: {body}");
        assert!(body.get("log_message").is_none(), "{path:?}: {body}");
    }
}

#[tokio::test]
#[traced_test]
async fn log_message_goes_to_the_log() {
    let response = send(
        app(ErrorWriter::new()),
        Path::Raise,
        &[("status", "403"), ("log_message", "card declined")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    logs_assert(|lines: &[&str]| {
        match lines.iter().filter(|line| line.contains("card declined")).count() {
            1 => Ok(()),
            n => Err(format!("expected the log message once, found it {n} times")),
        }
    });
}

#[tokio::test]
#[traced_test]
async fn panics_become_unhandled_500() {
    let response = get_uri(app(ErrorWriter::new()), "/panic").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(content_type(&response), "application/problem+json");
    assert_eq!(
        body_json(response).await,
        json!({
            "status": 500,
            "type": "https://tools.ietf.org/html/rfc7231#section-6.6.1"
        })
    );
    assert!(logs_contain("handler exploded"));
}

#[tokio::test]
#[traced_test]
async fn errors_escaping_handlers_become_unhandled_500() {
    let response = get_uri(app(ErrorWriter::new()), "/fails").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["status"], json!(500));
    assert!(logs_contain("unhandled error while processing request"));
}

#[tokio::test]
#[traced_test]
async fn unhandled_errors_log_their_root_cause() {
    let response = get_uri(app(ErrorWriter::new()), "/fails-with-context").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["status"], json!(500));
    assert!(logs_contain("saving customer"));
    assert!(logs_contain("disk full"));
}

#[tokio::test]
async fn handler_json_error_bodies_pass_through() {
    let response = get_uri(app(ErrorWriter::new()), "/conflict").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(content_type(&response), "application/json");
    assert_eq!(body_json(response).await, json!({"existing_id": "abc"}));
}

#[tokio::test]
async fn router_404_uses_generic_path() {
    let response = get_uri(app(ErrorWriter::new()), "/nowhere").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(content_type(&response), "application/problem+json");
    assert_eq!(
        body_json(response).await,
        json!({
            "status": 404,
            "type": "https://tools.ietf.org/html/rfc7231#section-6.5.4"
        })
    );
}

#[tokio::test]
async fn router_405_keeps_allow_header() {
    let response = app(ErrorWriter::new())
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(response.headers().contains_key(header::ALLOW));
    assert_eq!(body_json(response).await["status"], json!(405));
}

#[tokio::test]
async fn extractor_rejection_text_becomes_detail() {
    async fn numbers(Query(q): Query<HashMap<String, u32>>) -> String {
        format!("{}", q.len())
    }
    let app = Router::new()
        .route("/numbers", get(numbers))
        .layer(middleware::from_fn_with_state(
            Arc::new(ErrorWriter::new()),
            write_errors,
        ));

    let response = get_uri(app, "/numbers?a=abc").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!(400));
    assert!(body["detail"].as_str().unwrap().contains("Failed to deserialize"));
}

#[tokio::test]
async fn configured_content_type_is_used_everywhere() {
    let cfg = ProblemConfig {
        content_type: "application/vnd.example.problem+json".to_owned(),
        ..ProblemConfig::default()
    };
    let writer = ErrorWriter::from_config(&cfg).unwrap();
    for path in BOTH {
        let response = send(app(writer.clone()), path, &[("status", "502")]).await;
        assert_eq!(
            content_type(&response),
            "application/vnd.example.problem+json",
            "{path:?}"
        );
    }
    let response = get_uri(app(writer), "/nowhere").await;
    assert_eq!(content_type(&response), "application/vnd.example.problem+json");
}

#[tokio::test]
#[traced_test]
async fn middleware_applies_writer_encoders_and_policy() {
    struct Balance(i64);

    async fn credit() -> Problem {
        Problem::new(403)
            .with_title("You do not have enough credit.")
            .with_opaque("balance", Balance(30))
    }

    let build = |writer: ErrorWriter| {
        Router::new()
            .route("/credit", get(credit))
            .layer(middleware::from_fn_with_state(Arc::new(writer), write_errors))
    };

    let with_encoder = ErrorWriter::new().with_encoder::<Balance, _>(|b| json!(b.0));
    let body = body_json(get_uri(build(with_encoder), "/credit").await).await;
    assert_eq!(body["balance"], json!(30));
    assert_eq!(body["title"], json!("You do not have enough credit."));

    let strict = ErrorWriter::new();
    let body = body_json(get_uri(build(strict), "/credit").await).await;
    assert_eq!(body, json!({"status": 403}));
    assert!(logs_contain("no encoder is registered"));

    let lenient = ErrorWriter::new().with_policy(SerializationPolicy::BestEffort);
    let body = body_json(get_uri(build(lenient), "/credit").await).await;
    assert!(body["balance"].as_str().unwrap().starts_with("<unserializable: "));
    assert_eq!(body["title"], json!("You do not have enough credit."));
}

#[tokio::test]
async fn send_error_with_success_code_still_renders_document() {
    let response = send(app(ErrorWriter::new()), Path::SendError, &[("status", "200")]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(content_type(&response), "application/problem+json");
    assert_eq!(
        body_json(response).await,
        json!({
            "status": 200,
            "type": "https://tools.ietf.org/html/rfc7231#section-6.3.1"
        })
    );
}

#[tokio::test]
async fn successful_handlers_are_not_touched() {
    let app = Router::new()
        .route("/ok", get(|| async { "fine" }))
        .layer(middleware::from_fn_with_state(
            Arc::new(ErrorWriter::new()),
            write_errors,
        ));
    let response = get_uri(app, "/ok").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(content_type(&response).starts_with("text/plain"));
}
