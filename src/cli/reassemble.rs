//! Reassemble command implementation

use anyhow::{Context, Result};
use std::path::Path;

use super::read_file;
use crate::ernie::{ChatResponse, StreamAssembler};

/// Read one partial response per line and join them
pub fn assemble(path: &Path) -> Result<ChatResponse> {
    let content = read_file(path)?;
    let mut assembler = StreamAssembler::new();

    for (line_number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // SSE captures prefix each event with `data:`
        let line = line.strip_prefix("data:").map(str::trim).unwrap_or(line);

        let partial = ChatResponse::from_json(line)
            .with_context(|| format!("Line {}: invalid response", line_number + 1))?;
        assembler
            .push(partial)
            .with_context(|| format!("Line {}: rejected", line_number + 1))?;
    }

    if !assembler.is_complete() {
        tracing::warn!(chunks = assembler.len(), "Stream has no final chunk");
    }
    Ok(assembler.finish()?)
}

pub fn run(path: &Path) -> Result<()> {
    let response = assemble(path)?;
    tracing::info!(id = %response.id, "Reassembled stream");
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
