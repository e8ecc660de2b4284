//! A small customer service: create and fetch customer records.
//!
//! Request bodies are checked against the `CustomerDetails` JSON schema
//! (draft 7, formats not asserted). Decode and schema failures carry their
//! errors as opaque extension values, rendered by the encoders installed
//! with [`register_encoders`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use jsonschema::{Draft, Validator};
use parking_lot::RwLock;
use problem_details::{ErrorWriter, Problem};
use serde_json::error::Category;
use serde_json::{Value, json};
use uuid::Uuid;

const JSON_MEDIA_TYPE: &str = "application/json";
pub const SCHEMA_FAILURE: &str = "/errors#jsonschema-failure";
pub const CUSTOMER_NOT_FOUND: &str = "/errors#error-customer-does-not-exist";

/// In-memory customer records keyed by id.
#[derive(Debug, Clone, Default)]
pub struct CustomerStore {
    records: Arc<RwLock<HashMap<String, Value>>>,
}

impl CustomerStore {
    #[must_use]
    pub fn insert(&self, mut record: Value) -> String {
        let id = Uuid::new_v4().to_string();
        if let Value::Object(fields) = &mut record {
            fields.insert("id".to_owned(), Value::String(id.clone()));
        }
        self.records.write().insert(id.clone(), record);
        id
    }

    #[must_use]
    pub fn fetch(&self, id: &str) -> Option<Value> {
        self.records.read().get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A request body that is not valid JSON.
#[derive(Debug)]
pub struct DecodeFailure(pub serde_json::Error);

/// The compiled `CustomerDetails` schema.
#[derive(Clone)]
pub struct CustomerSchema {
    validator: Arc<Validator>,
}

impl CustomerSchema {
    /// Compile the schema.
    ///
    /// # Errors
    /// Returns an error if the schema document is not a valid draft 7 schema.
    pub fn new() -> anyhow::Result<Self> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft7)
            .should_validate_formats(false)
            .build(&customer_details())
            .map_err(|e| anyhow::anyhow!("customer schema does not compile: {e}"))?;
        Ok(Self {
            validator: Arc::new(validator),
        })
    }

    /// Every schema error in `document`, in the order the validator reports them.
    #[must_use]
    pub fn errors(&self, document: &Value) -> Vec<SchemaError> {
        self.validator
            .iter_errors(document)
            .map(|error| SchemaError {
                instance_path: error.instance_path().to_string(),
                schema_path: error.schema_path().to_string(),
                message: error.to_string(),
            })
            .collect()
    }
}

impl std::fmt::Debug for CustomerSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerSchema").finish_non_exhaustive()
    }
}

/// One schema error, detached from the request body it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    /// JSON pointer into the request body.
    pub instance_path: String,
    /// JSON pointer into the schema.
    pub schema_path: String,
    pub message: String,
}

impl SchemaError {
    fn depth(&self) -> usize {
        self.instance_path.matches('/').count()
    }
}

/// The error closest to the document root; the first one reported wins ties.
#[must_use]
pub fn most_important(errors: &[SchemaError]) -> Option<&SchemaError> {
    errors.iter().min_by_key(|error| error.depth())
}

/// Every schema error of a rejected request body.
#[derive(Debug)]
pub struct SchemaFailure(pub Vec<SchemaError>);

#[derive(Clone, Debug)]
struct Customers {
    store: CustomerStore,
    schema: CustomerSchema,
}

/// Install the encoders for this module's opaque problem fields.
#[must_use]
pub fn register_encoders(writer: ErrorWriter) -> ErrorWriter {
    writer
        .with_encoder::<DecodeFailure, _>(|failure| {
            let error = &failure.0;
            json!({
                "category": category(error),
                "line": error.line(),
                "column": error.column(),
                "message": error.to_string(),
            })
        })
        .with_encoder::<SchemaFailure, _>(|failure| {
            failure
                .0
                .iter()
                .map(|error| {
                    json!({
                        "instance_path": error.instance_path,
                        "schema_path": error.schema_path,
                        "message": error.message,
                    })
                })
                .collect()
        })
}

/// Customer routes backed by `store`.
///
/// # Errors
/// Returns an error if the customer schema does not compile.
pub fn router(store: CustomerStore) -> anyhow::Result<Router> {
    let state = Customers {
        store,
        schema: CustomerSchema::new()?,
    };
    Ok(Router::new()
        .route("/customers", post(create))
        .route("/customers/{id}", get(fetch))
        .with_state(state))
}

/// `POST /customers`: validate and store, then redirect to the new record.
async fn create(
    State(Customers { store, schema }): State<Customers>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Redirect, Problem> {
    let media_type = media_type(&headers);
    if media_type != JSON_MEDIA_TYPE {
        return Err(Problem::new(415)
            .with_title("Content type is not understood")
            .with_detail(format!("Cannot decode {media_type}, try {JSON_MEDIA_TYPE}")));
    }

    let document: Value = serde_json::from_slice(&body).map_err(|error| {
        Problem::new(400)
            .with_title("Failed to decode request")
            .with_detail(error.to_string())
            .with_opaque("failure", DecodeFailure(error))
    })?;

    let errors = schema.errors(&document);
    if let Some(error) = most_important(&errors) {
        return Err(Problem::new(422)
            .with_type(SCHEMA_FAILURE)
            .with_title("Failed to process request")
            .with_detail(error.message.clone())
            .with_opaque("failure", SchemaFailure(errors)));
    }

    let id = store.insert(document);
    tracing::info!(customer = %id, "customer created");
    Ok(Redirect::to(&format!("/customers/{id}")))
}

/// `GET /customers/{id}`
async fn fetch(
    State(Customers { store, .. }): State<Customers>,
    Path(id): Path<String>,
) -> Result<Json<Value>, Problem> {
    store.fetch(&id).map(Json).ok_or_else(|| {
        Problem::new(404)
            .with_type(CUSTOMER_NOT_FOUND)
            .with_title(format!("Customer {id} does not exist"))
            .with_instance(format!("/customers/{id}"))
    })
}

/// Media type of the request without parameters; JSON when absent.
fn media_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(JSON_MEDIA_TYPE, |v| v.split(';').next().unwrap_or_default())
        .trim()
        .to_ascii_lowercase()
}

fn category(error: &serde_json::Error) -> &'static str {
    match error.classify() {
        Category::Io => "io",
        Category::Syntax => "syntax",
        Category::Data => "data",
        Category::Eof => "eof",
    }
}

fn customer_details() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "date_of_birth": {"type": "string", "format": "date"},
            "email": {"type": "string", "format": "email"},
            "address": {
                "type": "object",
                "properties": {
                    "address": {"type": "string"},
                    "city": {"type": "string"},
                    "region": {"type": "string"},
                    "country": {"type": "string"},
                    "location_code": {"type": "string"}
                },
                "required": ["address", "country"]
            }
        },
        "required": ["email", "address"]
    })
}
