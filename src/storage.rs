//! Flat rows for the key-value storage collaborator
//!
//! The store keeps one row per conversation and one per message, with
//! timestamps as RFC 3339 strings. Only the fields listed on the rows are
//! persisted there; everything else lives with the caller.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::model::{ChatRole, Conversation, ConversationMetadata, Message};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRow {
    pub key: String,
    pub title: String,
    pub updated_at: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ConversationMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    pub key: String,
    pub conversation_id: String,
    pub text: String,
    pub role: String,
    pub updated_at: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(field: &'static str, value: &str) -> ModelResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ModelError::invalid_value(field, format!("{:?}: {}", value, e)))
}

impl Conversation {
    /// Split into the conversation row and its message rows, in turn order
    pub fn to_rows(&self) -> (ConversationRow, Vec<MessageRow>) {
        let row = ConversationRow {
            key: self.id.clone(),
            title: self.title.clone(),
            updated_at: format_timestamp(&self.updated_at),
            created_at: format_timestamp(&self.created_at),
            metadata: self.metadata.clone(),
        };

        let messages = self
            .messages
            .iter()
            .map(|m| MessageRow {
                key: m.id.clone(),
                conversation_id: self.id.clone(),
                text: m.text.clone(),
                role: m.role.as_str().to_string(),
                updated_at: format_timestamp(&m.updated_at),
                created_at: format_timestamp(&m.created_at),
                parent_message_id: m.parent_message_id.clone(),
            })
            .collect();

        (row, messages)
    }

    /// Rebuild a conversation from stored rows.
    ///
    /// Rows belonging to other conversations are ignored. Messages are
    /// ordered by creation time; rows with equal timestamps keep the order
    /// they were given in.
    pub fn from_rows(row: ConversationRow, rows: Vec<MessageRow>) -> ModelResult<Self> {
        let mut conversation = Conversation::new(row.key, row.title)?;
        conversation.created_at = parse_timestamp("createdAt", &row.created_at)?;
        conversation.updated_at = parse_timestamp("updatedAt", &row.updated_at)?;
        crate::model::check_order(conversation.created_at, conversation.updated_at)?;
        conversation.metadata = row.metadata;

        let mut messages = Vec::with_capacity(rows.len());
        for message_row in rows {
            if message_row.conversation_id != conversation.id {
                tracing::debug!(
                    conversation = %conversation.id,
                    message = %message_row.key,
                    "Skipping message row of another conversation"
                );
                continue;
            }
            let role: ChatRole = message_row.role.parse()?;
            let mut message = Message::new(role, message_row.text);
            message.id = message_row.key;
            message.conversation_id = Some(message_row.conversation_id);
            message.parent_message_id = message_row.parent_message_id;
            message.created_at = parse_timestamp("createdAt", &message_row.created_at)?;
            message.updated_at = parse_timestamp("updatedAt", &message_row.updated_at)?;
            crate::model::check_order(message.created_at, message.updated_at)?;
            messages.push(message);
        }
        messages.sort_by_key(|m| m.created_at);
        conversation.messages = messages;

        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn conversation() -> Conversation {
        let mut conv = Conversation::new("c1", "Rows").unwrap();
        let start = conv.created_at;
        for (i, text) in ["q1", "a1", "q2"].iter().enumerate() {
            let mut m = if i % 2 == 0 {
                Message::user(*text)
            } else {
                Message::assistant(*text)
            };
            m.created_at = start + Duration::seconds(i as i64 + 1);
            m.updated_at = m.created_at;
            conv.push_message(m);
        }
        conv.set_favorite(true);
        conv
    }

    #[test]
    fn test_rows_round_trip() {
        let conv = conversation();
        let (row, mut messages) = conv.to_rows();
        assert_eq!(row.key, "c1");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, "assistant");

        // store hands rows back in arbitrary order
        messages.reverse();
        let back = Conversation::from_rows(row, messages).unwrap();
        assert_eq!(back.id, conv.id);
        assert_eq!(back.created_at, conv.created_at);
        assert_eq!(back.updated_at, conv.updated_at);
        assert!(back.is_favorite());
        assert_eq!(back.messages, conv.messages);
    }

    #[test]
    fn test_rows_reject_bad_role_and_timestamp() {
        let conv = conversation();
        let (row, mut messages) = conv.to_rows();
        messages[0].role = "robot".to_string();
        assert!(matches!(
            Conversation::from_rows(row.clone(), messages),
            Err(ModelError::InvalidEnum { field: "role", .. })
        ));

        let mut bad = row;
        bad.created_at = "yesterday".to_string();
        assert!(matches!(
            Conversation::from_rows(bad, vec![]),
            Err(ModelError::InvalidValue { field: "createdAt", .. })
        ));
    }

    #[test]
    fn test_rows_skip_foreign_messages() {
        let conv = conversation();
        let (row, mut messages) = conv.to_rows();
        messages[2].conversation_id = "c2".to_string();
        let back = Conversation::from_rows(row, messages).unwrap();
        assert_eq!(back.messages.len(), 2);
    }
}
