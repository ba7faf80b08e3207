//! Validate command implementation

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::read_file;
use crate::ernie::{ChatRequest, ChatResponse, ErnieMessage};
use crate::error::ModelError;
use crate::model::{Conversation, KnowledgeItem, Message, Persona};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordKind {
    Conversation,
    Message,
    Knowledge,
    Persona,
    ProviderMessage,
    Request,
    Response,
}

impl RecordKind {
    fn check(&self, json: &str) -> Result<(), ModelError> {
        match self {
            RecordKind::Conversation => Conversation::from_json(json).map(|_| ()),
            RecordKind::Message => Message::from_json(json).map(|_| ()),
            RecordKind::Knowledge => KnowledgeItem::from_json(json).map(|_| ()),
            RecordKind::Persona => Persona::from_json(json).map(|_| ()),
            RecordKind::ProviderMessage => ErnieMessage::from_json(json).map(|_| ()),
            RecordKind::Request => ChatRequest::from_json(json).map(|_| ()),
            RecordKind::Response => ChatResponse::from_json(json).map(|_| ()),
        }
    }
}

/// Verdict for one file
#[derive(Debug)]
pub struct Verdict {
    pub path: PathBuf,
    pub error: Option<String>,
}

/// Check a single file, or every `*.json` file below a directory
pub fn check_path(path: &Path, kind: RecordKind) -> Result<Vec<Verdict>> {
    let files: Vec<PathBuf> = if path.is_dir() {
        let mut files = vec![];
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().map(|e| e == "json").unwrap_or(false)
            {
                files.push(entry.into_path());
            }
        }
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut verdicts = Vec::with_capacity(files.len());
    for file in files {
        let content = read_file(&file)?;
        let error = kind.check(&content).err().map(|e| e.to_string());
        if let Some(ref e) = error {
            tracing::debug!(file = %file.display(), error = %e, "Record rejected");
        }
        verdicts.push(Verdict { path: file, error });
    }
    Ok(verdicts)
}

pub fn run(path: &Path, kind: RecordKind) -> Result<()> {
    let verdicts = check_path(path, kind)?;
    tracing::info!(files = verdicts.len(), kind = ?kind, "Validated records");

    if verdicts.is_empty() {
        println!("No JSON files found under {}", path.display());
        return Ok(());
    }

    let mut failed = 0;
    for verdict in &verdicts {
        match &verdict.error {
            None => println!("✅ {}", verdict.path.display()),
            Some(e) => {
                failed += 1;
                println!("❌ {}: {}", verdict.path.display(), e);
            }
        }
    }

    println!("\n{} valid, {} invalid", verdicts.len() - failed, failed);
    if failed > 0 {
        bail!("{} record(s) failed validation", failed);
    }
    Ok(())
}
