//! The error writer: turns a failed request into a problem document.
//!
//! The hosting framework decides that a request failed and which status code
//! goes on the wire, then hands the writer a [`Failure`]. The writer builds
//! the document, serializes it and returns the header and body to send.

use std::any::Any;
use std::error::Error;
use std::fmt;

use bytes::Bytes;
use http::HeaderValue;
use serde_json::Value;

use crate::config::{APPLICATION_PROBLEM_JSON, ConfigError, ProblemConfig};
use crate::document::{Fields, ProblemDocument, WELL_KNOWN_KEYS};
use crate::encoder::{
    EncodeError, EncoderRegistry, SerializationPolicy, diagnostic_placeholder,
};
use crate::problem::Problem;
use crate::reason::{self, DEFAULT_FALLBACK_REASON};
use crate::type_links::TypeLinks;

/// What made the request fail.
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    /// Raised on purpose by application code.
    Problem(&'a Problem),
    /// The framework's own error path. Only `detail`, `instance`, `title` and
    /// `type` are taken from the fields; `reason` and `log_message` are
    /// honoured for the status line and the log.
    Generic(&'a Fields),
    /// Any other error escaping a handler.
    Unhandled(&'a (dyn Error + 'static)),
}

/// Everything the framework needs to send the error response.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: u16,
    /// Reason phrase for the status line. Never part of the body.
    pub reason: String,
    pub content_type: HeaderValue,
    pub body: Bytes,
    pub document: ProblemDocument,
}

/// Renders failures as problem documents.
///
/// Holds only read-only configuration, so one instance can be shared by every
/// request handler.
#[derive(Debug, Clone)]
pub struct ErrorWriter {
    content_type: HeaderValue,
    type_links: TypeLinks,
    encoders: EncoderRegistry,
    policy: SerializationPolicy,
    fallback_reason: String,
}

impl Default for ErrorWriter {
    fn default() -> Self {
        Self {
            content_type: HeaderValue::from_static(APPLICATION_PROBLEM_JSON),
            type_links: TypeLinks::standard(),
            encoders: EncoderRegistry::new(),
            policy: SerializationPolicy::default(),
            fallback_reason: DEFAULT_FALLBACK_REASON.to_owned(),
        }
    }
}

impl ErrorWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns [`ConfigError`] if the content type, a type link key or the
    /// fallback reason is invalid.
    pub fn from_config(cfg: &ProblemConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            content_type: cfg.content_type_header()?,
            type_links: cfg.build_type_links()?,
            encoders: EncoderRegistry::new(),
            policy: cfg.serialization,
            fallback_reason: cfg.validated_fallback_reason()?.to_owned(),
        })
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: HeaderValue) -> Self {
        self.content_type = content_type;
        self
    }

    #[must_use]
    pub fn with_type_links(mut self, type_links: TypeLinks) -> Self {
        self.type_links = type_links;
        self
    }

    #[must_use]
    pub fn with_encoders(mut self, encoders: EncoderRegistry) -> Self {
        self.encoders = encoders;
        self
    }

    /// Register an encoder for opaque extension values of type `T`.
    #[must_use]
    pub fn with_encoder<T, F>(mut self, encode: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.encoders.register::<T, F>(encode);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SerializationPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_fallback_reason(mut self, reason: impl Into<String>) -> Self {
        self.fallback_reason = reason.into();
        self
    }

    #[must_use]
    pub fn content_type(&self) -> &HeaderValue {
        &self.content_type
    }

    #[must_use]
    pub fn type_links(&self) -> &TypeLinks {
        &self.type_links
    }

    #[must_use]
    pub fn policy(&self) -> SerializationPolicy {
        self.policy
    }

    /// Log the failure the way the framework error path does, then render it.
    #[must_use]
    pub fn write_error(&self, status: u16, failure: &Failure<'_>) -> ErrorResponse {
        log_failure(status, failure);
        self.render(status, failure)
    }

    /// Build, serialize and package the problem document. Never fails.
    #[must_use]
    pub fn render(&self, status: u16, failure: &Failure<'_>) -> ErrorResponse {
        let (assembled, reason_override) = match failure {
            Failure::Problem(problem) => (self.problem_document(status, problem), problem.reason()),
            Failure::Generic(fields) => (
                Ok(generic_document(status, fields)),
                fields.get("reason").and_then(Value::as_str),
            ),
            Failure::Unhandled(_) => (Ok(ProblemDocument::new(status)), None),
        };

        let mut document = match assembled {
            Ok(mut document) => {
                if let Some(type_url) = self.type_links.get(status) {
                    document.set_default_type(type_url);
                }
                document
            }
            Err(e) => {
                report_strict(status, &e);
                ProblemDocument::new(status)
            }
        };

        let body = match document.to_vec() {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                tracing::error!(status, error = %e, "failed to serialize problem document");
                document = ProblemDocument::new(status);
                Bytes::from(format!("{{\"status\":{status}}}"))
            }
        };

        ErrorResponse {
            status,
            reason: reason::resolve(status, reason_override, &self.fallback_reason),
            content_type: self.content_type.clone(),
            body,
            document,
        }
    }

    /// Copy the problem's fields through the encoders. Under the strict policy
    /// the first unencodable field aborts assembly.
    fn problem_document(
        &self,
        status: u16,
        problem: &Problem,
    ) -> Result<ProblemDocument, EncodeError> {
        let mut document = ProblemDocument::new(status);
        for (key, value) in problem.document_fields() {
            let json = match self.encoders.encode(key, value) {
                Ok(json) => json,
                Err(e) if self.policy == SerializationPolicy::BestEffort => {
                    tracing::warn!(
                        status,
                        field = e.key(),
                        type_name = e.type_name(),
                        error = %e,
                        "substituting unserializable problem field"
                    );
                    diagnostic_placeholder(e.type_name())
                }
                Err(e) => return Err(e),
            };
            document.insert(key, json);
        }
        Ok(document)
    }
}

fn generic_document(status: u16, fields: &Fields) -> ProblemDocument {
    let mut document = ProblemDocument::new(status);
    for key in WELL_KNOWN_KEYS {
        if let Some(value) = fields.get(key) {
            document.insert(key, value.clone());
        }
    }
    document
}

fn report_strict(status: u16, e: &EncodeError) {
    tracing::error!(
        status,
        field = e.key(),
        type_name = e.type_name(),
        error = %e,
        "problem document could not be serialized; register an encoder for the type \
         or switch to best_effort serialization"
    );
}

fn log_failure(status: u16, failure: &Failure<'_>) {
    match failure {
        Failure::Problem(problem) => match problem.log_message() {
            Some(message) => tracing::warn!(status, log_message = message, "request failed"),
            None => tracing::debug!(status, "request failed"),
        },
        Failure::Generic(fields) => match fields.get("log_message").and_then(Value::as_str) {
            Some(message) => tracing::warn!(status, log_message = message, "request failed"),
            None => tracing::debug!(status, "request failed"),
        },
        Failure::Unhandled(error) => {
            tracing::error!(
                status,
                error = %ErrorChain(*error),
                "unhandled error while processing request"
            );
        }
    }
}

/// Displays an error followed by each of its sources, `outer: inner: root`.
struct ErrorChain<'a>(&'a (dyn Error + 'static));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, ": {cause}")?;
            source = cause.source();
        }
        Ok(())
    }
}
