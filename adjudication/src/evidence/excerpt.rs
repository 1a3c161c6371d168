//! Excerpt and document types — the immutable evidence catalog.

use serde::{Deserialize, Serialize};

/// Category of a source document and its excerpts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcerptCategory {
    /// Internal policy material.
    Policy,
    /// Contract clauses.
    Contractual,
    /// Supporting proof documents (invoices, emails, logs).
    Evidentiary,
}

impl ExcerptCategory {
    /// All categories in the fixed bundle presentation order.
    pub const ALL: [ExcerptCategory; 3] = [
        ExcerptCategory::Policy,
        ExcerptCategory::Contractual,
        ExcerptCategory::Evidentiary,
    ];

    /// Section heading used when rendering a bundle context block.
    pub fn heading(self) -> &'static str {
        match self {
            Self::Policy => "POLICY_EXCERPTS",
            Self::Contractual => "CONTRACT_EXCERPTS",
            Self::Evidentiary => "EVIDENCE_EXCERPTS",
        }
    }
}

impl std::fmt::Display for ExcerptCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Policy => write!(f, "policy"),
            Self::Contractual => write!(f, "contractual"),
            Self::Evidentiary => write!(f, "evidentiary"),
        }
    }
}

/// A source document. Never handed to reasoners directly; only its
/// excerpts are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document identifier (filename stem by default).
    pub doc_id: String,
    pub category: ExcerptCategory,
    /// Title extracted from the first markdown heading.
    pub title: String,
    /// Full raw content.
    pub content: String,
    /// blake3 hex digest of the content, for integrity checks.
    pub content_hash: String,
}

impl Document {
    pub fn new(
        doc_id: impl Into<String>,
        category: ExcerptCategory,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let content_hash = blake3::hash(content.as_bytes()).to_hex().to_string();
        Self {
            doc_id: doc_id.into(),
            category,
            title: title.into(),
            content,
            content_hash,
        }
    }
}

/// A minimal, independently-citable unit of evidence.
///
/// Immutable once created; lives in the process-wide catalog and is
/// scoped per run by bundle selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Excerpt {
    /// Stable id, e.g. `POL-001`.
    pub id: String,
    /// Formatted citation marker, e.g. `[CITE=POL-001]`.
    pub cite_token: String,
    /// Parent document id.
    pub doc_id: String,
    pub category: ExcerptCategory,
    /// Excerpt content.
    pub text: String,
}

impl Excerpt {
    pub fn new(
        id: impl Into<String>,
        doc_id: impl Into<String>,
        category: ExcerptCategory,
        text: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let cite_token = format!("[CITE={}]", id);
        Self {
            id,
            cite_token,
            doc_id: doc_id.into(),
            category,
            text: text.into(),
        }
    }
}

/// The process-wide excerpt catalog, grouped by category in the fixed
/// presentation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcerptCatalog {
    pub documents: Vec<Document>,
    pub excerpts: Vec<Excerpt>,
}

impl ExcerptCatalog {
    /// Excerpts of one category, in catalog order.
    pub fn by_category(&self, category: ExcerptCategory) -> Vec<&Excerpt> {
        self.excerpts
            .iter()
            .filter(|e| e.category == category)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.excerpts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excerpts.is_empty()
    }
}
