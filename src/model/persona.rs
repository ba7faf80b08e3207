use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{require, require_non_empty};
use crate::error::{ModelError, ModelResult};

/// Reusable system-instruction preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPersona")]
pub struct Persona {
    pub id: String,
    pub title: String,
    pub instructions: String,
}

impl Persona {
    pub fn new<I, T, S>(id: I, title: T, instructions: S) -> ModelResult<Self>
    where
        I: Into<String>,
        T: Into<String>,
        S: Into<String>,
    {
        RawPersona {
            id: Some(id.into()),
            title: Some(title.into()),
            instructions: Some(instructions.into()),
        }
        .try_into()
    }

    pub fn from_json(json: &str) -> ModelResult<Self> {
        let raw: RawPersona = serde_json::from_str(json)?;
        raw.try_into()
    }

    pub fn from_value(value: Value) -> ModelResult<Self> {
        let raw: RawPersona = serde_json::from_value(value)?;
        raw.try_into()
    }
}

#[derive(Deserialize)]
struct RawPersona {
    id: Option<String>,
    title: Option<String>,
    instructions: Option<String>,
}

impl TryFrom<RawPersona> for Persona {
    type Error = ModelError;

    fn try_from(raw: RawPersona) -> Result<Self, Self::Error> {
        Ok(Self {
            id: require_non_empty(raw.id, "Persona", "id")?,
            title: require(raw.title, "Persona", "title")?,
            instructions: require_non_empty(raw.instructions, "Persona", "instructions")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_persona_requires_instructions() {
        assert!(matches!(
            Persona::new("p1", "Editor", "  "),
            Err(ModelError::MissingField {
                field: "instructions",
                ..
            })
        ));
    }

    #[test]
    fn test_persona_decode() {
        let persona = Persona::from_value(json!({
            "id": "p1",
            "title": "Editor",
            "instructions": "Rewrite the text in plain English."
        }))
        .unwrap();
        assert_eq!(persona.title, "Editor");

        let missing = Persona::from_value(json!({ "id": "p1", "instructions": "x" }));
        assert!(matches!(
            missing,
            Err(ModelError::MissingField { field: "title", .. })
        ));
    }
}
