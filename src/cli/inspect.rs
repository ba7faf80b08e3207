//! Inspect command implementation

use anyhow::{Context, Result};
use std::path::Path;

use super::{read_file, truncate};
use crate::config::Config;
use crate::model::Conversation;

pub fn run(config: &Config, path: &Path) -> Result<()> {
    let conversation = Conversation::from_json(&read_file(path)?)
        .with_context(|| format!("Invalid conversation in {}", path.display()))?;
    tracing::info!(conversation = %conversation.id, "Inspecting conversation");

    println!("\n{}", "=".repeat(80));
    println!("Conversation: {} ({})", conversation.title, conversation.id);
    println!(
        "Created: {} | Updated: {}",
        conversation.created_at().format("%Y-%m-%d %H:%M"),
        conversation.updated_at().format("%Y-%m-%d %H:%M")
    );
    println!(
        "Model: {} | Creativity: {}",
        config.model_for(&conversation),
        conversation
            .creativity()
            .map(|c| c.as_str())
            .unwrap_or("-")
    );
    if let Some(persona) = conversation.effective_persona_id() {
        println!("Persona: {}", persona);
    }
    if !conversation.knowledge.is_empty() {
        println!("Knowledge: {}", conversation.knowledge.join(", "));
    }
    if conversation.is_favorite() {
        println!("★ Favorite");
    }
    println!("{}", "=".repeat(80));

    if conversation.messages().is_empty() {
        println!("\nNo messages yet.");
        return Ok(());
    }

    println!(
        "\n{:<4} {:<10} {:<12} {:<6} {}",
        "#", "Role", "Time", "Flags", "Text"
    );
    println!("{}", "-".repeat(80));

    for (i, msg) in conversation.messages().iter().enumerate() {
        let mut flags = String::new();
        if msg.is_error() {
            flags.push('!');
        }
        if msg.is_favorite() {
            flags.push('★');
        }
        println!(
            "{:<4} {:<10} {:<12} {:<6} {}",
            i,
            msg.role.as_str(),
            msg.created_at().format("%m-%d %H:%M"),
            flags,
            truncate(&msg.text, 45)
        );
    }

    Ok(())
}
