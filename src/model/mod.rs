//! Application data model: conversations, messages, knowledge items and personas
//!
//! Every record decodes through a permissive raw shape first so that a
//! missing field or an out-of-set value surfaces as a [`ModelError`] rather
//! than an opaque serde message. Optional fields stay optional on the way
//! back out: absent fields are skipped, explicit nulls are kept as nulls.

pub mod conversation;
pub mod knowledge;
pub mod message;
pub mod persona;

pub use conversation::{
    Conversation, ConversationKind, ConversationMetadata, ConversationSettings, Creativity,
};
pub use knowledge::{KnowledgeItem, KnowledgeSection, WebScraperResult};
pub use message::{ChatRole, Message, MessageMetadata};
pub use persona::Persona;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::{ModelError, ModelResult};

/// Distinguishes an explicit `null` from an absent field.
///
/// Used with `#[serde(default)]`: absent stays `None`, `null` becomes
/// `Some(None)`.
pub(crate) fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub(crate) fn require<T>(value: Option<T>, entity: &'static str, field: &'static str) -> ModelResult<T> {
    value.ok_or(ModelError::missing(entity, field))
}

pub(crate) fn require_non_empty(
    value: Option<String>,
    entity: &'static str,
    field: &'static str,
) -> ModelResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ModelError::missing(entity, field)),
    }
}

/// Current time, never earlier than `floor`
pub(crate) fn now_after(floor: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(floor)
}

pub(crate) fn check_order(
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
) -> ModelResult<()> {
    if updated < created {
        return Err(ModelError::invalid_value(
            "updatedAt",
            format!("{} precedes createdAt {}", updated.to_rfc3339(), created.to_rfc3339()),
        ));
    }
    Ok(())
}
