//! Ingested reference documents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{require, require_non_empty};
use crate::error::{ModelError, ModelResult};

/// Item type assigned to documents built from a scraped web page
pub const WEB_PAGE_TYPE: &str = "url";

/// One chunk of a document.
///
/// `embedding` is `None` until the section has been vectorized. Its length is
/// whatever the embedding model produced and is preserved as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawKnowledgeSection")]
pub struct KnowledgeSection {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl KnowledgeSection {
    pub fn new<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            embedding: None,
            url: None,
        }
    }

    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawKnowledgeItem")]
pub struct KnowledgeItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sections: Vec<KnowledgeSection>,
    pub updated_at: DateTime<Utc>,
    /// Opaque to this crate; shape is owned by the ingesting collaborator
    pub metadata: Value,
}

/// Output of the page scraper, as handed over for ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebScraperResult {
    pub url: String,
    pub markdown: String,
    pub favicon: String,
    pub title: String,
}

impl KnowledgeItem {
    pub fn new<I, T, K>(id: I, title: T, kind: K) -> ModelResult<Self>
    where
        I: Into<String>,
        T: Into<String>,
        K: Into<String>,
    {
        Ok(Self {
            id: require_non_empty(Some(id.into()), "KnowledgeItem", "id")?,
            title: title.into(),
            kind: kind.into(),
            sections: Vec::new(),
            updated_at: Utc::now(),
            metadata: Value::Null,
        })
    }

    pub fn from_json(json: &str) -> ModelResult<Self> {
        let raw: RawKnowledgeItem = serde_json::from_str(json)?;
        raw.try_into()
    }

    pub fn from_value(value: Value) -> ModelResult<Self> {
        let raw: RawKnowledgeItem = serde_json::from_value(value)?;
        raw.try_into()
    }

    /// Build a document from a scraped page, one section per top-level block
    pub fn from_web_scrape(page: WebScraperResult) -> Self {
        let sections = split_markdown(&page.markdown)
            .into_iter()
            .map(|block| KnowledgeSection::new(block).with_url(page.url.clone()))
            .collect();

        let title = if page.title.trim().is_empty() {
            page.url.clone()
        } else {
            page.title
        };

        tracing::debug!(url = %page.url, "Built knowledge item from scraped page");

        Self {
            id: Uuid::new_v4().to_string(),
            title,
            kind: WEB_PAGE_TYPE.to_string(),
            sections,
            updated_at: Utc::now(),
            metadata: json!({ "url": page.url, "favicon": page.favicon }),
        }
    }

    pub fn push_section(&mut self, section: KnowledgeSection) {
        self.sections.push(section);
        self.updated_at = Utc::now().max(self.updated_at);
    }

    /// Indices of sections still waiting for an embedding
    pub fn pending_sections(&self) -> Vec<usize> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_embedded())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn set_embedding(&mut self, index: usize, embedding: Vec<f64>) -> ModelResult<()> {
        let len = self.sections.len();
        let section = self.sections.get_mut(index).ok_or_else(|| {
            ModelError::invalid_value(
                "sections",
                format!("index {} out of range for {} sections", index, len),
            )
        })?;
        section.embedding = Some(embedding);
        self.updated_at = Utc::now().max(self.updated_at);
        Ok(())
    }

    pub fn is_fully_embedded(&self) -> bool {
        self.sections.iter().all(KnowledgeSection::is_embedded)
    }

    /// Shared vector length of the embedded sections, `None` if none are embedded
    pub fn embedding_dimension(&self) -> ModelResult<Option<usize>> {
        let mut dimension = None;
        for (i, embedding) in self
            .sections
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.embedding.as_ref().map(|e| (i, e)))
        {
            match dimension {
                None => dimension = Some(embedding.len()),
                Some(d) if d != embedding.len() => {
                    return Err(ModelError::invalid_value(
                        "embedding",
                        format!("section {} has length {}, expected {}", i, embedding.len(), d),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(dimension)
    }
}

/// Split markdown at top-level blocks: a new block starts at every heading
/// that follows a blank line. Empty blocks are dropped.
fn split_markdown(markdown: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut previous_blank = true;

    for line in markdown.lines() {
        let is_heading = line.trim_start().starts_with('#');
        if is_heading && previous_blank && !current.is_empty() {
            push_block(&mut blocks, &current);
            current.clear();
        }
        previous_blank = line.trim().is_empty();
        current.push(line);
    }
    push_block(&mut blocks, &current);

    blocks
}

fn push_block(blocks: &mut Vec<String>, lines: &[&str]) {
    let block = lines.join("\n").trim().to_string();
    if !block.is_empty() {
        blocks.push(block);
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawKnowledgeItem {
    id: Option<String>,
    title: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    sections: Option<Vec<Option<RawKnowledgeSection>>>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "super::nullable")]
    metadata: Option<Option<Value>>,
}

#[derive(Deserialize)]
struct RawKnowledgeSection {
    content: Option<String>,
    embedding: Option<Vec<f64>>,
    url: Option<String>,
}

impl TryFrom<RawKnowledgeSection> for KnowledgeSection {
    type Error = ModelError;

    fn try_from(raw: RawKnowledgeSection) -> Result<Self, Self::Error> {
        Ok(Self {
            content: require(raw.content, "KnowledgeSection", "content")?,
            embedding: raw.embedding,
            url: raw.url,
        })
    }
}

impl TryFrom<RawKnowledgeItem> for KnowledgeItem {
    type Error = ModelError;

    fn try_from(raw: RawKnowledgeItem) -> Result<Self, Self::Error> {
        let sections = require(raw.sections, "KnowledgeItem", "sections")?
            .into_iter()
            .map(|s| {
                s.ok_or(ModelError::missing("KnowledgeItem", "sections[]"))
                    .and_then(KnowledgeSection::try_from)
            })
            .collect::<ModelResult<Vec<_>>>()?;
        let metadata = require(raw.metadata, "KnowledgeItem", "metadata")?.unwrap_or(Value::Null);

        Ok(Self {
            id: require_non_empty(raw.id, "KnowledgeItem", "id")?,
            title: require(raw.title, "KnowledgeItem", "title")?,
            kind: require(raw.kind, "KnowledgeItem", "type")?,
            sections,
            updated_at: require(raw.updated_at, "KnowledgeItem", "updatedAt")?,
            metadata,
        })
    }
}
