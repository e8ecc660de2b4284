//! Extension field values and the custom encoding hook.
//!
//! Most extension values are plain JSON and are converted when the field is
//! attached to a [`Problem`](crate::Problem). Values of domain types that have
//! no `serde::Serialize` impl can be attached as *opaque* values instead; the
//! error writer renders them through an [`EncoderRegistry`] at write time.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value of a single extension field.
#[derive(Clone)]
pub enum FieldValue {
    /// Already JSON.
    Json(Value),
    /// Domain value rendered by a registered encoder.
    Opaque(OpaqueValue),
    /// A value whose `Serialize` impl failed when it was attached.
    Invalid {
        type_name: &'static str,
        message: String,
    },
}

impl FieldValue {
    /// Convert any serializable value; a failing `Serialize` impl is kept as
    /// [`FieldValue::Invalid`] so the writer can apply its policy later.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => Self::Json(json),
            Err(e) => Self::Invalid {
                type_name: std::any::type_name::<T>(),
                message: e.to_string(),
            },
        }
    }

    /// Name of the Rust type behind this value, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Json(_) => "serde_json::Value",
            Self::Opaque(opaque) => opaque.type_name,
            Self::Invalid { type_name, .. } => *type_name,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Opaque(o) => f.debug_tuple("Opaque").field(o).finish(),
            Self::Invalid { type_name, message } => f
                .debug_struct("Invalid")
                .field("type_name", type_name)
                .field("message", message)
                .finish(),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Type-erased domain value waiting for an encoder.
#[derive(Clone)]
pub struct OpaqueValue {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl OpaqueValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    fn value_type_id(&self) -> TypeId {
        (*self.value).type_id()
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// What to do when an extension field cannot be rendered as JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationPolicy {
    /// Drop the whole document in favour of a minimal `{"status": N}` and log an error.
    #[default]
    Strict,
    /// Replace the offending field with a diagnostic string and log a warning.
    BestEffort,
}

/// Rendering failure for a single extension field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("field '{key}' holds a {type_name} value and no encoder is registered for it")]
    Unregistered { key: String, type_name: &'static str },
    #[error("field '{key}' holds a {type_name} value that failed to serialize: {message}")]
    Invalid {
        key: String,
        type_name: &'static str,
        message: String,
    },
}

impl EncodeError {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Unregistered { key, .. } | Self::Invalid { key, .. } => key.as_str(),
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Unregistered { type_name, .. } | Self::Invalid { type_name, .. } => *type_name,
        }
    }
}

/// Placeholder written in place of a field under [`SerializationPolicy::BestEffort`].
#[must_use]
pub fn diagnostic_placeholder(type_name: &str) -> Value {
    Value::String(format!("<unserializable: {type_name}>"))
}

type EncodeFn = Arc<dyn Fn(&OpaqueValue) -> Option<Value> + Send + Sync>;

/// Per-type encoders for opaque extension values.
#[derive(Clone, Default)]
pub struct EncoderRegistry {
    encoders: HashMap<TypeId, EncodeFn>,
}

impl EncoderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the encoder for values of type `T`.
    pub fn register<T, F>(&mut self, encode: F)
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let encode: EncodeFn = Arc::new(move |opaque: &OpaqueValue| {
            opaque.downcast_ref::<T>().map(&encode)
        });
        self.encoders.insert(TypeId::of::<T>(), encode);
    }

    #[must_use]
    pub fn with<T, F>(mut self, encode: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.register::<T, F>(encode);
        self
    }

    #[must_use]
    pub fn is_registered<T: Any>(&self) -> bool {
        self.encoders.contains_key(&TypeId::of::<T>())
    }

    /// Render one extension field as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when the value is opaque and no encoder is
    /// registered for its type, or when it failed to serialize on attach.
    pub fn encode(&self, key: &str, value: &FieldValue) -> Result<Value, EncodeError> {
        match value {
            FieldValue::Json(json) => Ok(json.clone()),
            FieldValue::Opaque(opaque) => self
                .encoders
                .get(&opaque.value_type_id())
                .and_then(|encode| encode(opaque))
                .ok_or_else(|| EncodeError::Unregistered {
                    key: key.to_owned(),
                    type_name: opaque.type_name(),
                }),
            FieldValue::Invalid { type_name, message } => Err(EncodeError::Invalid {
                key: key.to_owned(),
                type_name: *type_name,
                message: message.clone(),
            }),
        }
    }
}

impl fmt::Debug for EncoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderRegistry")
            .field("encoders", &self.encoders.len())
            .finish()
    }
}
