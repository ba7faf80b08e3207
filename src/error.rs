//! Validation errors raised while constructing or decoding records

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    /// A mandatory field was absent (or empty where emptiness is meaningless)
    #[error("{entity} is missing mandatory field `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },

    /// A closed-set field carried a value outside its set
    #[error("invalid value for `{field}`: {value:?}")]
    InvalidEnum { field: &'static str, value: String },

    /// A `function` provider message without its name or call payload
    #[error("malformed function message: {0}")]
    MalformedVariant(String),

    #[error("invalid `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ModelError {
    pub(crate) fn missing(entity: &'static str, field: &'static str) -> Self {
        ModelError::MissingField { entity, field }
    }

    pub(crate) fn invalid_enum(field: &'static str, value: impl Into<String>) -> Self {
        ModelError::InvalidEnum {
            field,
            value: value.into(),
        }
    }

    pub(crate) fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        ModelError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
