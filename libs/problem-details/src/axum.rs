//! Axum integration: the framework side of the error life-cycle.
//!
//! Handlers fail by returning [`Problem`], [`SendError`] or [`Unhandled`]
//! (directly or through `?`). Each renders a problem document with default
//! settings and also carries the failure in the response extensions. The
//! [`write_errors`] middleware picks the failure up and renders it again with
//! the application's [`ErrorWriter`]; it also turns bare error statuses
//! produced by the router or other layers (404, 405, extractor rejections)
//! into problem documents. Error responses whose body a handler wrote itself
//! (any content type other than `text/plain`) are passed through untouched.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use axum::{Router, middleware, routing::get};
//! use problem_details::{ErrorWriter, Problem, axum::write_errors};
//!
//! async fn handler() -> Result<&'static str, Problem> {
//!     Err(Problem::new(418).with_title("I'm a teapot"))
//! }
//!
//! let writer = Arc::new(ErrorWriter::new());
//! let app: Router = Router::new()
//!     .route("/", get(handler))
//!     .layer(middleware::from_fn_with_state(writer, write_errors));
//! ```

use std::any::Any;
use std::sync::{Arc, LazyLock};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hyper::ext::ReasonPhrase;
use serde_json::Value;

use crate::document::Fields;
use crate::problem::Problem;
use crate::writer::{ErrorResponse, ErrorWriter, Failure};

/// Upper bound for reading a plain-text error body into `detail`.
const GENERIC_BODY_LIMIT: usize = 16 * 1024;

static DEFAULT_WRITER: LazyLock<ErrorWriter> = LazyLock::new(ErrorWriter::default);

tokio::task_local! {
    /// Set while a request runs inside [`write_errors`].
    static WRITER_INSTALLED: ();
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, self.content_type);

        if status.canonical_reason() != Some(self.reason.as_str()) {
            match ReasonPhrase::try_from(self.reason.as_bytes()) {
                Ok(reason) => {
                    response.extensions_mut().insert(reason);
                }
                Err(_) => {
                    tracing::warn!(status = self.status, reason = %self.reason, "invalid reason phrase ignored");
                }
            }
        }
        response
    }
}

/// The framework's explicit error path: a status plus the well-known fields.
///
/// Fields other than `detail`, `instance`, `title` and `type` never reach the
/// document; `log_message` goes to the log and `reason` to the status line.
#[derive(Debug, Clone)]
#[must_use]
pub struct SendError {
    status: StatusCode,
    fields: Fields,
}

impl SendError {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            fields: Fields::new(),
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.with_field("title", Value::String(title.into()))
    }

    pub fn with_detail(self, detail: impl Into<String>) -> Self {
        self.with_field("detail", Value::String(detail.into()))
    }

    pub fn with_instance(self, instance: impl Into<String>) -> Self {
        self.with_field("instance", Value::String(instance.into()))
    }

    pub fn with_type(self, type_url: impl Into<String>) -> Self {
        self.with_field("type", Value::String(type_url.into()))
    }

    pub fn with_log_message(self, message: impl Into<String>) -> Self {
        self.with_field("log_message", Value::String(message.into()))
    }

    pub fn with_reason(self, reason: impl Into<String>) -> Self {
        self.with_field("reason", Value::String(reason.into()))
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for SendError {
    fn into_response(self) -> Response {
        Pending::new(self.status, PendingFailure::Generic(self.fields)).into_response()
    }
}

/// Any error escaping a handler; answered with a 500 problem document.
#[derive(Debug)]
pub struct Unhandled(pub anyhow::Error);

impl<E> From<E> for Unhandled
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for Unhandled {
    fn into_response(self) -> Response {
        Pending::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            PendingFailure::Unhandled(Arc::new(self.0)),
        )
        .into_response()
    }
}

/// Outside [`write_errors`] the problem is logged and rendered with the
/// default writer here; inside it, logging and rendering are left to the
/// middleware so each failure is logged once.
impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = wire_status(self.status());
        Pending::new(status, PendingFailure::Problem(self)).into_response()
    }
}

/// Map a panic caught by `tower_http::catch_panic::CatchPanicLayer::custom`
/// onto the unhandled-error path.
#[allow(clippy::needless_pass_by_value)] // signature required by CatchPanicLayer::custom
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    Unhandled(anyhow::anyhow!("handler panicked: {message}")).into_response()
}

/// Middleware that renders every failed response with `writer`.
///
/// Install with `axum::middleware::from_fn_with_state(writer, write_errors)`
/// outside any panic-catching layer.
pub async fn write_errors(
    State(writer): State<Arc<ErrorWriter>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = WRITER_INSTALLED.scope((), next.run(request)).await;

    if let Some(pending) = response.extensions_mut().remove::<Pending>() {
        let (parts, _) = response.into_parts();
        let rendered = pending.failure.write(&writer, pending.status.as_u16());
        return with_headers(rendered.into_response(), &parts.headers);
    }

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) || has_own_body(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let fields = generic_fields(&parts.headers, body).await;
    let rendered = writer.write_error(status.as_u16(), &Failure::Generic(&fields));
    with_headers(rendered.into_response(), &parts.headers)
}

/// A failure travelling from a handler to [`write_errors`].
#[derive(Clone)]
struct Pending {
    status: StatusCode,
    failure: PendingFailure,
}

#[derive(Clone)]
enum PendingFailure {
    Problem(Problem),
    Generic(Fields),
    Unhandled(Arc<anyhow::Error>),
}

impl Pending {
    fn new(status: StatusCode, failure: PendingFailure) -> Self {
        Self { status, failure }
    }

    fn into_response(self) -> Response {
        let status = self.status.as_u16();
        let rendered = if WRITER_INSTALLED.try_with(|_| ()).is_ok() {
            self.failure.render(&DEFAULT_WRITER, status)
        } else {
            self.failure.write(&DEFAULT_WRITER, status)
        };
        let mut response = rendered.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl PendingFailure {
    fn render(&self, writer: &ErrorWriter, status: u16) -> ErrorResponse {
        self.with_failure(|failure| writer.render(status, failure))
    }

    fn write(&self, writer: &ErrorWriter, status: u16) -> ErrorResponse {
        self.with_failure(|failure| writer.write_error(status, failure))
    }

    fn with_failure<R>(&self, f: impl FnOnce(&Failure<'_>) -> R) -> R {
        match self {
            Self::Problem(problem) => f(&Failure::Problem(problem)),
            Self::Generic(fields) => f(&Failure::Generic(fields)),
            Self::Unhandled(error) => {
                let error: &(dyn std::error::Error + 'static) = &***error;
                f(&Failure::Unhandled(error))
            }
        }
    }
}

fn wire_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or_else(|_| {
        tracing::warn!(status, "status code cannot be sent over HTTP, answering 500");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Empty and `text/plain` bodies come from the router and extractors; any
/// other body (JSON, HTML, problem documents) was written on purpose.
fn has_own_body(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|ct| !ct.to_str().is_ok_and(is_plain_text))
}

fn is_plain_text(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..10)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("text/plain"))
}

/// Plain-text bodies from the router and extractors become `detail`.
async fn generic_fields(headers: &HeaderMap, body: Body) -> Fields {
    let mut fields = Fields::new();
    let is_text = headers
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .is_some_and(is_plain_text);
    if !is_text {
        return fields;
    }

    match axum::body::to_bytes(body, GENERIC_BODY_LIMIT).await {
        Ok(bytes) if !bytes.is_empty() => {
            let detail = String::from_utf8_lossy(&bytes).trim().to_owned();
            if !detail.is_empty() {
                fields.insert("detail".to_owned(), Value::String(detail));
            }
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "error body not used as detail"),
    }
    fields
}

/// Carry over headers set by the handler or inner layers (`Allow`,
/// `WWW-Authenticate`, ...) except those describing the replaced body.
fn with_headers(mut response: Response, original: &HeaderMap) -> Response {
    let rendered: Vec<HeaderName> = response.headers().keys().cloned().collect();
    for (name, value) in original {
        if name == header::CONTENT_TYPE || name == header::CONTENT_LENGTH || rendered.contains(name)
        {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }
    response
}
