//! Conversation aggregate
//!
//! A conversation owns its ordered message sequence and refers to knowledge
//! items and personas by identifier only. Every mutation goes through a
//! method that refreshes `updated_at` in the same call, which keeps
//! `updated_at >= created_at` observable at all times.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::message::Message;
use super::{check_order, now_after, nullable, require, require_non_empty};
use crate::error::{ModelError, ModelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ConversationKind {
    Chat,
    Embedded,
}

impl FromStr for ConversationKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(ConversationKind::Chat),
            // older clients wrote the misspelled form
            "embedded" | "embbeded" => Ok(ConversationKind::Embedded),
            other => Err(ModelError::invalid_enum("type", other)),
        }
    }
}

impl TryFrom<String> for ConversationKind {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Sampling-temperature proxy exposed to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Creativity {
    None,
    Normal,
    High,
}

impl Creativity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Creativity::None => "none",
            Creativity::Normal => "normal",
            Creativity::High => "high",
        }
    }

    /// Default provider temperature for this level
    pub fn temperature(&self) -> f32 {
        match self {
            Creativity::None => 0.1,
            Creativity::Normal => 0.8,
            Creativity::High => 1.0,
        }
    }
}

impl FromStr for Creativity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Creativity::None),
            "normal" => Ok(Creativity::Normal),
            "high" => Ok(Creativity::High),
            other => Err(ModelError::invalid_enum("creativity", other)),
        }
    }
}

impl TryFrom<String> for Creativity {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Creativity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
}

/// Per-conversation generation settings.
///
/// `model`, `max_tokens` and `creativity` are tri-state: `None` is absent,
/// `Some(None)` an explicit null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_tokens: Option<Option<u32>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub creativity: Option<Option<Creativity>>,
}

impl ConversationSettings {
    /// Parse a user-supplied creativity value into the settings
    pub fn with_creativity(mut self, creativity: &str) -> ModelResult<Self> {
        self.creativity = Some(Some(creativity.parse()?));
        Ok(self)
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(Some(model.into()));
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(Some(max_tokens));
        self
    }

    pub fn creativity(&self) -> Option<Creativity> {
        self.creativity.flatten()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_ref().and_then(|m| m.as_deref())
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens.flatten()
    }
}

/// The turn sequence and both timestamps are only reachable through methods,
/// so no caller can skip the `updated_at` refresh.
///
/// ```compile_fail
/// let mut conversation = parley::model::Conversation::new("c1", "Chat").unwrap();
/// conversation.updated_at = conversation.created_at() - chrono::Duration::days(1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawConversation")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub(crate) messages: Vec<Message>,
    pub knowledge: Vec<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ConversationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ConversationMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<ConversationSettings>,
}

impl Conversation {
    pub fn new<I: Into<String>, T: Into<String>>(id: I, title: T) -> ModelResult<Self> {
        let id = require_non_empty(Some(id.into()), "Conversation", "id")?;
        let now = Utc::now();
        Ok(Self {
            id,
            title: title.into(),
            messages: Vec::new(),
            knowledge: Vec::new(),
            created_at: now,
            updated_at: now,
            kind: None,
            persona_id: None,
            system_message: None,
            metadata: None,
            settings: None,
        })
    }

    pub fn with_kind(mut self, kind: ConversationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_settings(mut self, settings: ConversationSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn from_json(json: &str) -> ModelResult<Self> {
        let raw: RawConversation = serde_json::from_str(json)?;
        raw.try_into()
    }

    pub fn from_value(value: Value) -> ModelResult<Self> {
        let raw: RawConversation = serde_json::from_value(value)?;
        raw.try_into()
    }

    /// Append a turn at the tail of the sequence
    pub fn push_message(&mut self, mut message: Message) {
        message.conversation_id = Some(self.id.clone());
        self.messages.push(message);
        self.touch();
        tracing::debug!(
            conversation = %self.id,
            count = self.messages.len(),
            "Appended message"
        );
    }

    /// Edit one message in place; `None` if the index is out of range
    pub fn message_mut<R>(&mut self, index: usize, edit: impl FnOnce(&mut Message) -> R) -> Option<R> {
        let message = self.messages.get_mut(index)?;
        let result = edit(message);
        message.touch();
        self.touch();
        Some(result)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns false if the identifier was already attached
    pub fn attach_knowledge<S: Into<String>>(&mut self, knowledge_id: S) -> bool {
        let knowledge_id = knowledge_id.into();
        if self.knowledge.contains(&knowledge_id) {
            return false;
        }
        self.knowledge.push(knowledge_id);
        self.touch();
        true
    }

    pub fn detach_knowledge(&mut self, knowledge_id: &str) -> bool {
        let before = self.knowledge.len();
        self.knowledge.retain(|k| k != knowledge_id);
        let removed = self.knowledge.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    pub fn set_title<S: Into<String>>(&mut self, title: S) {
        self.title = title.into();
        self.touch();
    }

    pub fn set_system_message(&mut self, system_message: Option<String>) {
        self.system_message = system_message;
        self.touch();
    }

    pub fn set_persona(&mut self, persona_id: Option<String>) {
        self.persona_id = persona_id;
        self.touch();
    }

    pub fn set_settings(&mut self, settings: Option<ConversationSettings>) {
        self.settings = settings;
        self.touch();
    }

    pub fn set_favorite(&mut self, favorite: bool) {
        self.metadata
            .get_or_insert_with(ConversationMetadata::default)
            .favorite = Some(favorite);
        self.touch();
    }

    pub fn is_favorite(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.favorite)
            .unwrap_or(false)
    }

    /// Persona chosen in settings, falling back to the conversation-level one
    pub fn effective_persona_id(&self) -> Option<&str> {
        self.settings
            .as_ref()
            .and_then(|s| s.persona_id.as_deref())
            .or(self.persona_id.as_deref())
    }

    pub fn creativity(&self) -> Option<Creativity> {
        self.settings.as_ref().and_then(|s| s.creativity())
    }

    /// Refresh `updated_at`; never moves it backwards
    pub fn touch(&mut self) {
        self.updated_at = now_after(self.updated_at.max(self.created_at));
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConversation {
    id: Option<String>,
    title: Option<String>,
    messages: Option<Vec<Value>>,
    knowledge: Option<Vec<String>>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    kind: Option<String>,
    persona_id: Option<String>,
    system_message: Option<String>,
    metadata: Option<ConversationMetadata>,
    settings: Option<RawSettings>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    persona_id: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    model: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    max_tokens: Option<Option<u32>>,
    #[serde(default, deserialize_with = "nullable")]
    creativity: Option<Option<String>>,
}

impl TryFrom<RawSettings> for ConversationSettings {
    type Error = ModelError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let creativity = match raw.creativity {
            Some(Some(value)) => Some(Some(value.parse::<Creativity>()?)),
            Some(None) => Some(None),
            None => None,
        };
        Ok(Self {
            persona_id: raw.persona_id,
            model: raw.model,
            max_tokens: raw.max_tokens,
            creativity,
        })
    }
}

impl TryFrom<RawConversation> for Conversation {
    type Error = ModelError;

    fn try_from(raw: RawConversation) -> Result<Self, Self::Error> {
        let id = require_non_empty(raw.id, "Conversation", "id")?;
        let title = require(raw.title, "Conversation", "title")?;
        let messages = require(raw.messages, "Conversation", "messages")?
            .into_iter()
            .map(Message::from_value)
            .collect::<ModelResult<Vec<_>>>()?;
        let knowledge = require(raw.knowledge, "Conversation", "knowledge")?;
        let created_at = require(raw.created_at, "Conversation", "createdAt")?;
        let updated_at = require(raw.updated_at, "Conversation", "updatedAt")?;
        check_order(created_at, updated_at)?;

        let kind = raw.kind.map(|k| k.parse()).transpose()?;
        let settings = raw.settings.map(ConversationSettings::try_from).transpose()?;

        Ok(Self {
            id,
            title,
            messages,
            knowledge,
            created_at,
            updated_at,
            kind,
            persona_id: raw.persona_id,
            system_message: raw.system_message,
            metadata: raw.metadata,
            settings,
        })
    }
}
