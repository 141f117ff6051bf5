use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Display sentinel for metadata fields that could not be recovered.
/// Absent fields stay `None` in the data model; the sentinel only
/// appears at the presentation boundary.
pub const NOT_AVAILABLE: &str = "N/A";

/// Doc type assumed when the filename does not carry one.
pub const DEFAULT_DOC_TYPE: &str = "officina";

/// Tags recovered from the `BRAND_MODEL[_YEAR][_TYPE...]` filename
/// convention, plus ingestion context attached by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualMetadata {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<String>,
    pub doc_type: String,
    /// 1-based page number within the source PDF.
    pub page: u32,
    pub filename: String,
    pub source_path: String,
    pub ocr_processed: bool,
}

impl ManualMetadata {
    pub fn brand_display(&self) -> &str {
        self.brand.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn model_display(&self) -> &str {
        self.model.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn year_display(&self) -> &str {
        self.year.as_deref().unwrap_or(NOT_AVAILABLE)
    }
}

/// One page of extracted manual text, before chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDocument {
    pub text: String,
    pub metadata: ManualMetadata,
}

/// The atomic retrievable unit: a bounded text window plus the full
/// metadata of the page it came from. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualChunk {
    pub content: String,
    pub metadata: ManualMetadata,
}

/// Conjunctive metadata-equality constraints applied at the vector
/// store layer. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    conditions: BTreeMap<String, String>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    pub fn brand(self, brand: impl Into<String>) -> Self {
        self.with("brand", brand)
    }

    pub fn model(self, model: impl Into<String>) -> Self {
        self.with("model", model)
    }

    pub fn year(self, year: impl Into<String>) -> Self {
        self.with("year", year)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.conditions.iter()
    }
}

/// A ranked citation returned alongside an answer. Derived per query,
/// never persisted; metadata gaps are rendered with the `N/A` sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedSource {
    /// 1-based position in the result set.
    pub index: usize,
    pub brand: String,
    pub model: String,
    pub year: String,
    pub page: u32,
    pub filename: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Response shape of `ManualChatbot::ask`. Always well formed: on any
/// internal failure `answer` holds a fixed apology, `sources` is empty
/// and the raw error text lands in `error` for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<RetrievedSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read-only introspection of the vector index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_vector_count: u64,
    pub dimension: usize,
    pub namespaces: Vec<String>,
}

/// Which extraction path produced a loaded document. Fallbacks stay
/// silent in behavior but observable in the result (callers can tell
/// "used OCR" from "OCR capability absent").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    PlainText,
    Ocr,
    OcrUnavailable,
}

/// Per-brand inventory of the manual corpus on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusStats {
    pub total_manuals: usize,
    pub by_brand: BTreeMap<String, usize>,
}
