//! Chat completion responses and stream reassembly

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};
use crate::model::require;

/// Why a generation turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum FinishReason {
    /// Output produced entirely by the model
    Normal,
    /// Truncated at a caller-supplied stop sequence
    Stop,
    /// Hit the token limit
    Length,
    /// Truncated or masked by the content filter
    ContentFilter,
    FunctionCall,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Normal => "normal",
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::FunctionCall => "function_call",
        }
    }
}

impl FromStr for FinishReason {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(FinishReason::Normal),
            "stop" => Ok(FinishReason::Stop),
            "length" => Ok(FinishReason::Length),
            "content_filter" => Ok(FinishReason::ContentFilter),
            "function_call" => Ok(FinishReason::FunctionCall),
            other => Err(ModelError::invalid_enum("finish_reason", other)),
        }
    }
}

impl TryFrom<String> for FinishReason {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChatResponse")]
pub struct ChatResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    /// Epoch seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    /// Index of this chunk; only present when streaming
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_end: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    pub fn from_json(json: &str) -> ModelResult<Self> {
        let raw: RawChatResponse = serde_json::from_str(json)?;
        raw.try_into()
    }

    pub fn text(&self) -> &str {
        self.result.as_deref().unwrap_or("")
    }
}

#[derive(Deserialize)]
struct RawChatResponse {
    id: Option<String>,
    object: Option<String>,
    created: Option<i64>,
    sentence_id: Option<u32>,
    is_end: Option<bool>,
    finish_reason: Option<String>,
    result: Option<String>,
    usage: Option<Usage>,
}

impl TryFrom<RawChatResponse> for ChatResponse {
    type Error = ModelError;

    fn try_from(raw: RawChatResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            id: require(raw.id, "ChatResponse", "id")?,
            object: raw.object,
            created: raw.created,
            sentence_id: raw.sentence_id,
            is_end: raw.is_end,
            finish_reason: raw.finish_reason.map(|r| r.parse()).transpose()?,
            result: raw.result,
            usage: raw.usage,
        })
    }
}

/// Collects streamed partial responses and joins them in `sentence_id` order,
/// whatever order they arrived in.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    id: Option<String>,
    partials: BTreeMap<u32, ChatResponse>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, partial: ChatResponse) -> ModelResult<()> {
        let sentence_id = partial
            .sentence_id
            .ok_or(ModelError::missing("ChatResponse", "sentence_id"))?;

        match &self.id {
            Some(id) if *id != partial.id => {
                return Err(ModelError::invalid_value(
                    "id",
                    format!("partial belongs to {}, stream is {}", partial.id, id),
                ));
            }
            Some(_) => {}
            None => self.id = Some(partial.id.clone()),
        }

        if self.partials.contains_key(&sentence_id) {
            return Err(ModelError::invalid_value(
                "sentence_id",
                format!("sentence {} received twice", sentence_id),
            ));
        }

        tracing::trace!(sentence_id, "Buffered stream partial");
        self.partials.insert(sentence_id, partial);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.partials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }

    /// True once the chunk flagged `is_end` is buffered and nothing before it is missing
    pub fn is_complete(&self) -> bool {
        match self.partials.iter().next_back() {
            Some((&last, partial)) => {
                partial.is_end == Some(true) && self.partials.len() as u64 == u64::from(last) + 1
            }
            None => false,
        }
    }

    /// Join the buffered chunks into a single response.
    ///
    /// Sentence ids must form the contiguous range `0..n`. Usage, finish
    /// reason and end flag come from the last chunk; `created` and `object`
    /// from the first.
    pub fn finish(self) -> ModelResult<ChatResponse> {
        let id = self
            .id
            .ok_or(ModelError::missing("ChatResponse", "result"))?;

        for (expected, &actual) in self.partials.keys().enumerate() {
            if expected as u64 != u64::from(actual) {
                return Err(ModelError::invalid_value(
                    "sentence_id",
                    format!("sentence {} is missing", expected),
                ));
            }
        }

        let mut partials = self.partials.into_values();
        let Some(first) = partials.next() else {
            return Err(ModelError::missing("ChatResponse", "result"));
        };

        let mut assembled = ChatResponse {
            id,
            object: first.object.clone(),
            created: first.created,
            sentence_id: None,
            is_end: first.is_end,
            finish_reason: first.finish_reason,
            result: Some(first.text().to_string()),
            usage: first.usage.clone(),
        };

        for partial in partials {
            if let Some(result) = assembled.result.as_mut() {
                result.push_str(partial.text());
            }
            assembled.is_end = partial.is_end;
            assembled.finish_reason = partial.finish_reason.or(assembled.finish_reason);
            assembled.usage = partial.usage.or(assembled.usage);
        }

        Ok(assembled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn partial(sentence_id: u32, text: &str) -> ChatResponse {
        ChatResponse {
            id: "as-1".to_string(),
            object: Some("chat.completion".to_string()),
            created: Some(1_700_000_000),
            sentence_id: Some(sentence_id),
            is_end: Some(false),
            finish_reason: None,
            result: Some(text.to_string()),
            usage: None,
        }
    }

    #[test]
    fn test_reassemble_out_of_order() {
        let mut last = partial(2, "world.");
        last.is_end = Some(true);
        last.finish_reason = Some(FinishReason::Normal);
        last.usage = Some(Usage {
            prompt_tokens: Some(4),
            completion_tokens: Some(3),
            total_tokens: Some(7),
        });

        let mut assembler = StreamAssembler::new();
        assembler.push(last).unwrap();
        assembler.push(partial(0, "Hello, ")).unwrap();
        assert!(!assembler.is_complete());
        assembler.push(partial(1, "brave ")).unwrap();
        assert!(assembler.is_complete());

        let response = assembler.finish().unwrap();
        assert_eq!(response.text(), "Hello, brave world.");
        assert_eq!(response.finish_reason, Some(FinishReason::Normal));
        assert_eq!(response.usage.unwrap().total_tokens, Some(7));
        assert_eq!(response.sentence_id, None);
        assert_eq!(response.is_end, Some(true));
    }

    #[test]
    fn test_reassemble_rejects_gap_and_duplicate() {
        let mut assembler = StreamAssembler::new();
        assembler.push(partial(0, "a")).unwrap();
        assert!(assembler.push(partial(0, "a")).is_err());
        assembler.push(partial(2, "c")).unwrap();
        assert!(matches!(
            assembler.finish(),
            Err(ModelError::InvalidValue { field: "sentence_id", .. })
        ));
    }

    #[test]
    fn test_reassemble_rejects_foreign_and_unnumbered() {
        let mut assembler = StreamAssembler::new();
        assembler.push(partial(0, "a")).unwrap();

        let mut foreign = partial(1, "b");
        foreign.id = "as-2".to_string();
        assert!(matches!(
            assembler.push(foreign),
            Err(ModelError::InvalidValue { field: "id", .. })
        ));

        let mut unnumbered = partial(1, "b");
        unnumbered.sentence_id = None;
        assert!(matches!(
            assembler.push(unnumbered),
            Err(ModelError::MissingField { field: "sentence_id", .. })
        ));
        assert_eq!(assembler.len(), 1);
    }

    #[test]
    fn test_finish_reason_values() {
        let response = ChatResponse::from_json(
            r#"{"id": "as-1", "result": "x", "finish_reason": "content_filter"}"#,
        )
        .unwrap();
        assert_eq!(response.finish_reason, Some(FinishReason::ContentFilter));

        let result = ChatResponse::from_json(r#"{"id": "as-1", "finish_reason": "timeout"}"#);
        assert!(matches!(
            result,
            Err(ModelError::InvalidEnum { field: "finish_reason", .. })
        ));
    }

    #[test]
    fn test_response_without_id_rejected() {
        assert!(matches!(
            ChatResponse::from_json(r#"{"result": "x", "sentence_id": 0}"#),
            Err(ModelError::MissingField { entity: "ChatResponse", field: "id" })
        ));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let response = ChatResponse::from_json(r#"{"id": "as-1"}"#).unwrap();
        assert_eq!(serde_json::to_value(&response).unwrap(), json!({"id": "as-1"}));
    }
}
