//! Chat completion request body

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::message::ErnieMessage;
use crate::config::Config;
use crate::error::{ModelError, ModelResult};
use crate::model::{require, ChatRole, Conversation, Persona};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

impl PropertySchema {
    pub fn new<K: Into<String>>(kind: K) -> Self {
        Self {
            kind: kind.into(),
            description: None,
            allowed: None,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_enum(mut self, allowed: Vec<String>) -> Self {
        self.allowed = Some(allowed);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionParameters {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: BTreeMap<String, PropertySchema>,
    pub required: Vec<String>,
}

impl Default for FunctionParameters {
    fn default() -> Self {
        Self {
            kind: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

/// A function the model may call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: FunctionParameters,
}

impl FunctionSchema {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, description: D) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: FunctionParameters::default(),
        }
    }

    pub fn with_property<S: Into<String>>(
        mut self,
        name: S,
        schema: PropertySchema,
        required: bool,
    ) -> Self {
        let name = name.into();
        if required {
            self.parameters.required.push(name.clone());
        }
        self.parameters.properties.insert(name, schema);
        self
    }

    fn validate(&self) -> ModelResult<()> {
        if self.name.trim().is_empty() {
            return Err(ModelError::missing("FunctionSchema", "name"));
        }
        if let Some(missing) = self
            .parameters
            .required
            .iter()
            .find(|r| !self.parameters.properties.contains_key(r.as_str()))
        {
            return Err(ModelError::invalid_value(
                "functions",
                format!("`{}` requires undeclared property `{}`", self.name, missing),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChatRequest")]
pub struct ChatRequest {
    pub messages: Vec<ErnieMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<FunctionSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ErnieMessage>) -> Self {
        Self {
            messages,
            functions: None,
            temperature: None,
            top_p: None,
            penalty_score: None,
            stream: None,
            system: None,
            user_id: None,
        }
    }

    pub fn with_functions(mut self, functions: Vec<FunctionSchema>) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_penalty_score(mut self, penalty_score: f32) -> Self {
        self.penalty_score = Some(penalty_score);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_system<S: Into<String>>(mut self, system: S) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Decode and validate a request body
    pub fn from_json(json: &str) -> ModelResult<Self> {
        let raw: RawChatRequest = serde_json::from_str(json)?;
        let request = ChatRequest::try_from(raw)?;
        request.validate()?;
        Ok(request)
    }

    /// Check the request against the endpoint's accepted ranges
    pub fn validate(&self) -> ModelResult<()> {
        let last = self
            .messages
            .last()
            .ok_or(ModelError::missing("ChatRequest", "messages"))?;
        if matches!(last, ErnieMessage::Assistant { .. }) {
            return Err(ModelError::invalid_value(
                "messages",
                "the last message must come from the user or a function",
            ));
        }

        check_range("temperature", self.temperature, |t| t > 0.0 && t <= 1.0, "(0, 1]")?;
        check_range("top_p", self.top_p, |p| (0.0..=1.0).contains(&p), "[0, 1]")?;
        check_range(
            "penalty_score",
            self.penalty_score,
            |p| (1.0..=2.0).contains(&p),
            "[1, 2]",
        )?;

        for function in self.functions.iter().flatten() {
            function.validate()?;
        }
        Ok(())
    }

    /// Build the request for the next turn of `conversation`.
    ///
    /// Turns flagged as errors and system turns are left out; the system
    /// prompt comes from the conversation override, else the persona.
    pub fn from_conversation(
        conversation: &Conversation,
        persona: Option<&Persona>,
        config: &Config,
    ) -> ModelResult<Self> {
        let messages: Vec<ErnieMessage> = conversation
            .messages()
            .iter()
            .filter(|m| !m.is_error())
            .filter_map(|m| match m.role {
                ChatRole::User => Some(ErnieMessage::user(m.text.clone())),
                ChatRole::Assistant => Some(ErnieMessage::assistant(m.text.clone())),
                ChatRole::System => None,
            })
            .collect();

        let mut request = ChatRequest::new(messages).with_stream(config.provider.stream);

        let system = conversation
            .system_message
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| persona.map(|p| p.instructions.clone()));
        if let Some(system) = system {
            request = request.with_system(system);
        }

        if let Some(creativity) = conversation.creativity() {
            request = request.with_temperature(config.temperature_for(creativity));
        }

        if let Some(user_id) = &config.provider.user_id {
            request = request.with_user_id(user_id.clone());
        }

        request.validate()?;
        tracing::debug!(
            conversation = %conversation.id,
            messages = request.messages.len(),
            "Built chat request"
        );
        Ok(request)
    }
}

#[derive(Deserialize)]
struct RawChatRequest {
    messages: Option<Vec<Value>>,
    functions: Option<Vec<FunctionSchema>>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    penalty_score: Option<f32>,
    stream: Option<bool>,
    system: Option<String>,
    user_id: Option<String>,
}

impl TryFrom<RawChatRequest> for ChatRequest {
    type Error = ModelError;

    fn try_from(raw: RawChatRequest) -> Result<Self, Self::Error> {
        let messages = require(raw.messages, "ChatRequest", "messages")?
            .into_iter()
            .map(ErnieMessage::from_value)
            .collect::<ModelResult<Vec<_>>>()?;

        Ok(Self {
            messages,
            functions: raw.functions,
            temperature: raw.temperature,
            top_p: raw.top_p,
            penalty_score: raw.penalty_score,
            stream: raw.stream,
            system: raw.system,
            user_id: raw.user_id,
        })
    }
}

fn check_range(
    field: &'static str,
    value: Option<f32>,
    accept: impl Fn(f32) -> bool,
    range: &str,
) -> ModelResult<()> {
    match value {
        Some(v) if !accept(v) => Err(ModelError::invalid_value(
            field,
            format!("{} is outside {}", v, range),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationSettings, Message};
    use serde_json::json;

    #[test]
    fn test_absent_fields_are_omitted() {
        let request = ChatRequest::new(vec![ErnieMessage::user("hi")]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"messages": [{"role": "user", "content": "hi"}]}));
    }

    #[test]
    fn test_validate_ranges() {
        let base = ChatRequest::new(vec![ErnieMessage::user("hi")]);
        assert!(base.validate().is_ok());
        assert!(base.clone().with_temperature(0.0).validate().is_err());
        assert!(base.clone().with_temperature(1.0).validate().is_ok());
        assert!(base.clone().with_top_p(1.5).validate().is_err());
        assert!(base.clone().with_penalty_score(0.5).validate().is_err());
        assert!(base.with_penalty_score(1.2).validate().is_ok());
    }

    #[test]
    fn test_validate_messages() {
        assert!(matches!(
            ChatRequest::new(vec![]).validate(),
            Err(ModelError::MissingField { field: "messages", .. })
        ));
        let trailing_assistant =
            ChatRequest::new(vec![ErnieMessage::user("hi"), ErnieMessage::assistant("hello")]);
        assert!(trailing_assistant.validate().is_err());
    }

    #[test]
    fn test_from_json_error_kinds() {
        assert!(matches!(
            ChatRequest::from_json(r#"{"stream": true}"#),
            Err(ModelError::MissingField { entity: "ChatRequest", field: "messages" })
        ));

        let unknown_role = json!({"messages": [{"role": "system", "content": "x"}]});
        assert!(matches!(
            ChatRequest::from_json(&unknown_role.to_string()),
            Err(ModelError::InvalidEnum { field: "role", .. })
        ));

        let nameless_function = json!({"messages": [
            {"role": "user", "content": "weather?"},
            {
                "role": "function",
                "content": "{}",
                "function_call": {"name": "lookup_weather", "arguments": "{}"}
            }
        ]});
        assert!(matches!(
            ChatRequest::from_json(&nameless_function.to_string()),
            Err(ModelError::MalformedVariant(_))
        ));

        let ok = json!({"messages": [{"role": "user", "content": "hi"}], "top_p": 0.5});
        let request = ChatRequest::from_json(&ok.to_string()).unwrap();
        assert_eq!(request.top_p, Some(0.5));
    }

    #[test]
    fn test_function_schema_required_fields() {
        let schema = FunctionSchema::new("lookup_weather", "Current weather for a city").with_property(
            "city",
            PropertySchema::new("string").with_description("City name"),
            true,
        );
        let request = ChatRequest::new(vec![ErnieMessage::user("weather?")])
            .with_functions(vec![schema.clone()]);
        assert!(request.validate().is_ok());

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["functions"][0]["parameters"]["required"], json!(["city"]));
        assert_eq!(
            value["functions"][0]["parameters"]["properties"]["city"]["type"],
            "string"
        );

        let mut broken = schema;
        broken.parameters.required.push("date".to_string());
        let request = ChatRequest::new(vec![ErnieMessage::user("weather?")])
            .with_functions(vec![broken]);
        assert!(matches!(
            request.validate(),
            Err(ModelError::InvalidValue { field: "functions", .. })
        ));
    }

    #[test]
    fn test_from_conversation() {
        let mut conversation = Conversation::new("c1", "Chat")
            .unwrap()
            .with_settings(ConversationSettings::default().with_creativity("high").unwrap());
        conversation.push_message(Message::system("ignored"));
        conversation.push_message(Message::user("first"));
        let mut failed = Message::assistant("half an ans");
        failed.mark_error(true);
        conversation.push_message(failed);
        conversation.push_message(Message::user("again"));

        let persona = Persona::new("p1", "Guide", "Answer briefly.").unwrap();
        let config = Config::default();
        let request =
            ChatRequest::from_conversation(&conversation, Some(&persona), &config).unwrap();

        let contents: Vec<&str> = request.messages.iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["first", "again"]);
        assert_eq!(request.system.as_deref(), Some("Answer briefly."));
        assert_eq!(request.temperature, Some(1.0));

        conversation.set_system_message(Some("Be formal.".to_string()));
        let request =
            ChatRequest::from_conversation(&conversation, Some(&persona), &config).unwrap();
        assert_eq!(request.system.as_deref(), Some("Be formal."));
    }
}
