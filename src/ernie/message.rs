//! Role-tagged messages sent to the ERNIE chat endpoint

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum MessageRole {
    User,
    Assistant,
    Function,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Function => "function",
        }
    }
}

impl FromStr for MessageRole {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "function" => Ok(MessageRole::Function),
            other => Err(ModelError::invalid_enum("role", other)),
        }
    }
}

impl TryFrom<String> for MessageRole {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A function invocation emitted by the model.
///
/// Only [`FunctionCall::new`] and decoding can build one, so the name is
/// never empty and the arguments always parse as JSON.
///
/// ```compile_fail
/// let call = parley::ernie::FunctionCall {
///     name: String::new(),
///     arguments: "{}".to_string(),
///     thoughts: None,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFunctionCall")]
pub struct FunctionCall {
    name: String,
    /// JSON-encoded argument object
    arguments: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    thoughts: Option<String>,
}

impl FunctionCall {
    pub fn new<N: Into<String>, A: Into<String>>(name: N, arguments: A) -> ModelResult<Self> {
        RawFunctionCall {
            name: Some(name.into()),
            arguments: Some(arguments.into()),
            thoughts: None,
        }
        .try_into()
    }

    pub fn with_thoughts<S: Into<String>>(mut self, thoughts: S) -> Self {
        self.thoughts = Some(thoughts.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    pub fn thoughts(&self) -> Option<&str> {
        self.thoughts.as_deref()
    }

    pub fn parsed_arguments(&self) -> ModelResult<Value> {
        Ok(serde_json::from_str(&self.arguments)?)
    }
}

#[derive(Deserialize)]
struct RawFunctionCall {
    name: Option<String>,
    arguments: Option<String>,
    thoughts: Option<String>,
}

impl TryFrom<RawFunctionCall> for FunctionCall {
    type Error = ModelError;

    fn try_from(raw: RawFunctionCall) -> Result<Self, Self::Error> {
        let name = match raw.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => {
                return Err(ModelError::MalformedVariant(
                    "function_call.name is empty".to_string(),
                ))
            }
        };
        let arguments = raw.arguments.ok_or_else(|| {
            ModelError::MalformedVariant("function_call.arguments is missing".to_string())
        })?;
        if let Err(e) = serde_json::from_str::<Value>(&arguments) {
            return Err(ModelError::MalformedVariant(format!(
                "function_call.arguments is not valid JSON: {}",
                e
            )));
        }

        Ok(Self {
            name,
            arguments,
            thoughts: raw.thoughts,
        })
    }
}

/// Closed set of provider message shapes.
///
/// The role tag is fixed by the variant; there is no way to change it on an
/// existing value. `Function` messages are built through
/// [`ErnieMessage::function`] outside this crate.
///
/// ```compile_fail
/// let call = parley::ernie::FunctionCall::new("lookup", "{}").unwrap();
/// let msg = parley::ernie::ErnieMessage::Function {
///     name: String::new(),
///     content: String::new(),
///     function_call: call,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase", try_from = "RawErnieMessage")]
pub enum ErnieMessage {
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    #[non_exhaustive]
    Function {
        name: String,
        content: String,
        function_call: FunctionCall,
    },
}

impl ErnieMessage {
    pub fn user<S: Into<String>>(content: S) -> Self {
        ErnieMessage::User {
            content: content.into(),
        }
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        ErnieMessage::Assistant {
            content: content.into(),
        }
    }

    pub fn function<N, C>(name: N, content: C, function_call: FunctionCall) -> ModelResult<Self>
    where
        N: Into<String>,
        C: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ModelError::MalformedVariant("name is empty".to_string()));
        }
        Ok(ErnieMessage::Function {
            name,
            content: content.into(),
            function_call,
        })
    }

    pub fn from_json(json: &str) -> ModelResult<Self> {
        let raw: RawErnieMessage = serde_json::from_str(json)?;
        raw.try_into()
    }

    pub fn from_value(value: Value) -> ModelResult<Self> {
        let raw: RawErnieMessage = serde_json::from_value(value)?;
        raw.try_into()
    }

    pub fn role(&self) -> MessageRole {
        match self {
            ErnieMessage::User { .. } => MessageRole::User,
            ErnieMessage::Assistant { .. } => MessageRole::Assistant,
            ErnieMessage::Function { .. } => MessageRole::Function,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ErnieMessage::User { content }
            | ErnieMessage::Assistant { content }
            | ErnieMessage::Function { content, .. } => content,
        }
    }

    pub fn function_call(&self) -> Option<&FunctionCall> {
        match self {
            ErnieMessage::Function { function_call, .. } => Some(function_call),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawErnieMessage {
    role: Option<String>,
    content: Option<String>,
    name: Option<String>,
    function_call: Option<Value>,
}

impl TryFrom<RawErnieMessage> for ErnieMessage {
    type Error = ModelError;

    fn try_from(raw: RawErnieMessage) -> Result<Self, Self::Error> {
        let role: MessageRole = raw
            .role
            .ok_or(ModelError::missing("ErnieMessage", "role"))?
            .parse()?;
        let content = raw
            .content
            .ok_or(ModelError::missing("ErnieMessage", "content"))?;

        match role {
            MessageRole::User => Ok(ErnieMessage::User { content }),
            MessageRole::Assistant => Ok(ErnieMessage::Assistant { content }),
            MessageRole::Function => {
                let name = raw
                    .name
                    .ok_or_else(|| ModelError::MalformedVariant("name is missing".to_string()))?;
                let call = raw.function_call.ok_or_else(|| {
                    ModelError::MalformedVariant("function_call is missing".to_string())
                })?;
                let raw_call: RawFunctionCall = serde_json::from_value(call).map_err(|e| {
                    ModelError::MalformedVariant(format!("function_call: {}", e))
                })?;
                ErnieMessage::function(name, content, raw_call.try_into()?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_call() -> FunctionCall {
        FunctionCall::new("lookup_weather", r#"{"city":"Beijing"}"#).unwrap()
    }

    #[test]
    fn test_function_message_empty_name() {
        let result = ErnieMessage::function("", "sunny", weather_call());
        assert!(matches!(result, Err(ModelError::MalformedVariant(_))));
    }

    #[test]
    fn test_function_message_round_trip() {
        let msg = ErnieMessage::function(
            "lookup_weather",
            r#"{"temp":21}"#,
            weather_call().with_thoughts("user asked for the weather"),
        )
        .unwrap();
        assert_eq!(msg.role(), MessageRole::Function);

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "function");
        assert_eq!(value["name"], "lookup_weather");
        assert_eq!(value["function_call"]["arguments"], r#"{"city":"Beijing"}"#);

        let back = ErnieMessage::from_value(value).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.role(), MessageRole::Function);
        assert_eq!(
            back.function_call().unwrap().parsed_arguments().unwrap(),
            json!({"city": "Beijing"})
        );
    }

    #[test]
    fn test_function_message_missing_payload() {
        let result = ErnieMessage::from_value(json!({
            "role": "function",
            "name": "lookup_weather",
            "content": "sunny"
        }));
        assert!(matches!(result, Err(ModelError::MalformedVariant(_))));

        let result = ErnieMessage::from_value(json!({
            "role": "function",
            "content": "sunny",
            "function_call": { "name": "lookup_weather", "arguments": "{}" }
        }));
        assert!(matches!(result, Err(ModelError::MalformedVariant(_))));
    }

    #[test]
    fn test_function_call_arguments_must_be_json() {
        assert!(matches!(
            FunctionCall::new("lookup_weather", "city=Beijing"),
            Err(ModelError::MalformedVariant(_))
        ));
        assert!(matches!(
            FunctionCall::new(" ", "{}"),
            Err(ModelError::MalformedVariant(_))
        ));
    }

    #[test]
    fn test_function_call_accessors() {
        let call = weather_call().with_thoughts("needs a lookup");
        assert_eq!(call.name(), "lookup_weather");
        assert_eq!(call.arguments(), r#"{"city":"Beijing"}"#);
        assert_eq!(call.thoughts(), Some("needs a lookup"));
    }

    #[test]
    fn test_function_call_decode_validates() {
        let result: Result<FunctionCall, _> =
            serde_json::from_value(json!({"name": "", "arguments": "{}"}));
        assert!(result.is_err());

        let result: Result<FunctionCall, _> =
            serde_json::from_value(json!({"name": "lookup_weather", "arguments": "not json"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_user_and_assistant_tags() {
        let user = serde_json::to_value(ErnieMessage::user("hi")).unwrap();
        assert_eq!(user, json!({"role": "user", "content": "hi"}));

        let assistant: ErnieMessage =
            serde_json::from_value(json!({"role": "assistant", "content": "hello"})).unwrap();
        assert_eq!(assistant.role(), MessageRole::Assistant);
        assert_eq!(assistant.content(), "hello");
    }

    #[test]
    fn test_unknown_role() {
        let result = ErnieMessage::from_value(json!({"role": "system", "content": "x"}));
        assert!(matches!(
            result,
            Err(ModelError::InvalidEnum { field: "role", .. })
        ));
    }
}
