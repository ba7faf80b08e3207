//! A single conversational turn

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{check_order, now_after, require, require_non_empty};
use crate::error::{ModelError, ModelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

impl FromStr for ChatRole {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            "system" => Ok(ChatRole::System),
            other => Err(ModelError::invalid_enum("role", other)),
        }
    }
}

impl TryFrom<String> for ChatRole {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
}

/// One turn of a conversation.
///
/// The first block of fields is the chat-message shape shared with the
/// completion client; the rest is what the application tracks on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawMessage")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub role: ChatRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Raw provider payload, owned by the completion client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,

    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Value>>,
}

impl Message {
    pub fn new<S: Into<String>>(role: ChatRole, text: S) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            role,
            name: None,
            parent_message_id: None,
            conversation_id: None,
            detail: None,
            created_at: now,
            updated_at: now,
            is_error: None,
            metadata: None,
            actions: None,
        }
    }

    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(ChatRole::User, text)
    }

    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self::new(ChatRole::Assistant, text)
    }

    pub fn system<S: Into<String>>(text: S) -> Self {
        Self::new(ChatRole::System, text)
    }

    pub fn with_parent<S: Into<String>>(mut self, parent_message_id: S) -> Self {
        self.parent_message_id = Some(parent_message_id.into());
        self
    }

    pub fn with_actions(mut self, actions: Vec<Value>) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn from_json(json: &str) -> ModelResult<Self> {
        let raw: RawMessage = serde_json::from_str(json)?;
        raw.try_into()
    }

    pub fn from_value(value: Value) -> ModelResult<Self> {
        let raw: RawMessage = serde_json::from_value(value)?;
        raw.try_into()
    }

    pub fn set_text<S: Into<String>>(&mut self, text: S) {
        self.text = text.into();
        self.touch();
    }

    /// Flag the turn as failed during generation
    pub fn mark_error(&mut self, is_error: bool) {
        self.is_error = Some(is_error);
        self.touch();
    }

    pub fn set_favorite(&mut self, favorite: bool) {
        self.metadata
            .get_or_insert_with(MessageMetadata::default)
            .favorite = Some(favorite);
        self.touch();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    pub fn is_favorite(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.favorite)
            .unwrap_or(false)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = now_after(self.updated_at.max(self.created_at));
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: Option<String>,
    text: Option<String>,
    role: Option<String>,
    name: Option<String>,
    parent_message_id: Option<String>,
    conversation_id: Option<String>,
    detail: Option<Value>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    is_error: Option<bool>,
    metadata: Option<MessageMetadata>,
    actions: Option<Vec<Value>>,
}

impl TryFrom<RawMessage> for Message {
    type Error = ModelError;

    fn try_from(raw: RawMessage) -> Result<Self, Self::Error> {
        let role: ChatRole = require(raw.role, "Message", "role")?.parse()?;
        let created_at = require(raw.created_at, "Message", "createdAt")?;
        let updated_at = require(raw.updated_at, "Message", "updatedAt")?;
        check_order(created_at, updated_at)?;

        Ok(Self {
            id: require_non_empty(raw.id, "Message", "id")?,
            text: require(raw.text, "Message", "text")?,
            role,
            name: raw.name,
            parent_message_id: raw.parent_message_id,
            conversation_id: raw.conversation_id,
            detail: raw.detail,
            created_at,
            updated_at,
            is_error: raw.is_error,
            metadata: raw.metadata,
            actions: raw.actions,
        })
    }
}
