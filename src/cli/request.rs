//! Request command implementation

use anyhow::{Context, Result};
use std::path::Path;

use super::read_file;
use crate::config::Config;
use crate::ernie::ChatRequest;
use crate::model::{Conversation, Persona};

pub fn build(
    config: &Config,
    conversation_path: &Path,
    persona_path: Option<&Path>,
) -> Result<(String, ChatRequest)> {
    let conversation = Conversation::from_json(&read_file(conversation_path)?)
        .with_context(|| format!("Invalid conversation in {}", conversation_path.display()))?;

    let persona = match persona_path {
        Some(path) => Some(
            Persona::from_json(&read_file(path)?)
                .with_context(|| format!("Invalid persona in {}", path.display()))?,
        ),
        None => None,
    };

    if let (Some(persona), Some(wanted)) = (&persona, conversation.effective_persona_id()) {
        if persona.id != wanted {
            tracing::warn!(
                persona = %persona.id,
                expected = wanted,
                "Persona file does not match the conversation's persona"
            );
        }
    }

    let request = ChatRequest::from_conversation(&conversation, persona.as_ref(), config)
        .context("Conversation cannot be sent as-is")?;
    Ok((config.model_for(&conversation).to_string(), request))
}

pub fn run(config: &Config, conversation_path: &Path, persona_path: Option<&Path>) -> Result<()> {
    let (model, request) = build(config, conversation_path, persona_path)?;
    tracing::info!(model = %model, messages = request.messages.len(), "Prepared chat request");

    println!("# model: {}", model);
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}
