//! Evidence bundles — the per-run immutable snapshot of excerpts and
//! the derived citation whitelist.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::excerpt::{Excerpt, ExcerptCatalog, ExcerptCategory};

/// No excerpts were selected for the question. Never swallowed: the
/// caller decides whether this is a configuration error or grounds for
/// an insufficiency verdict, but it must never approve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no excerpts selected for question: {question}")]
pub struct EmptyBundleError {
    pub question: String,
}

/// Retrieval seam: question → ordered excerpts.
///
/// Treated as a pure function of the question and the catalog state;
/// the bundle builder relies on that for fingerprint determinism.
pub trait ExcerptSelector: Send + Sync {
    fn select(&self, question: &str) -> Vec<Excerpt>;
}

/// Shipped selector: the first N excerpts of each category, in fixed
/// category order. Deterministic and retrieval-free; swap in an
/// embedding-backed selector behind the same trait when one exists.
#[derive(Debug, Clone)]
pub struct CategoryLimitSelector {
    catalog: ExcerptCatalog,
    limits: [usize; 3],
}

impl CategoryLimitSelector {
    pub fn new(catalog: ExcerptCatalog) -> Self {
        Self {
            catalog,
            limits: [2, 2, 2],
        }
    }

    /// Override the per-category limit (policy, contractual, evidentiary).
    pub fn with_limit(mut self, category: ExcerptCategory, limit: usize) -> Self {
        self.limits[match category {
            ExcerptCategory::Policy => 0,
            ExcerptCategory::Contractual => 1,
            ExcerptCategory::Evidentiary => 2,
        }] = limit;
        self
    }
}

impl ExcerptSelector for CategoryLimitSelector {
    fn select(&self, _question: &str) -> Vec<Excerpt> {
        let mut out = Vec::new();
        for (i, category) in ExcerptCategory::ALL.into_iter().enumerate() {
            out.extend(
                self.catalog
                    .by_category(category)
                    .into_iter()
                    .take(self.limits[i])
                    .cloned(),
            );
        }
        out
    }
}

/// The per-run evidence snapshot: ordered excerpts plus the citation
/// whitelist derived from their ids. Read-only for the rest of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    excerpts: Vec<Excerpt>,
    whitelist: BTreeSet<String>,
}

impl EvidenceBundle {
    /// Build the bundle for a question. Deduplicates by excerpt id,
    /// preserving first occurrence, so bundle order is a pure function
    /// of the selector output.
    pub fn build(
        selector: &dyn ExcerptSelector,
        question: &str,
    ) -> Result<EvidenceBundle, EmptyBundleError> {
        let mut seen = BTreeSet::new();
        let mut excerpts = Vec::new();
        for excerpt in selector.select(question) {
            if seen.insert(excerpt.id.clone()) {
                excerpts.push(excerpt);
            }
        }

        if excerpts.is_empty() {
            return Err(EmptyBundleError {
                question: question.to_string(),
            });
        }

        Ok(EvidenceBundle {
            whitelist: seen,
            excerpts,
        })
    }

    /// Construct directly from excerpts (tests and replay tooling).
    pub fn from_excerpts(excerpts: Vec<Excerpt>) -> Result<EvidenceBundle, EmptyBundleError> {
        struct Fixed(Vec<Excerpt>);
        impl ExcerptSelector for Fixed {
            fn select(&self, _q: &str) -> Vec<Excerpt> {
                self.0.clone()
            }
        }
        Self::build(&Fixed(excerpts), "")
    }

    /// Excerpts in bundle order.
    pub fn excerpts(&self) -> &[Excerpt] {
        &self.excerpts
    }

    /// Excerpt ids in bundle order (the fingerprint input).
    pub fn excerpt_ids(&self) -> Vec<String> {
        self.excerpts.iter().map(|e| e.id.clone()).collect()
    }

    /// The citation whitelist.
    pub fn whitelist(&self) -> &BTreeSet<String> {
        &self.whitelist
    }

    pub fn contains(&self, excerpt_id: &str) -> bool {
        self.whitelist.contains(excerpt_id)
    }

    /// Render the shared context block handed to every reasoner:
    /// the question followed by cite-tokenized excerpts grouped under
    /// category headings.
    pub fn context_block(&self, question: &str) -> String {
        let mut parts = vec![format!("## QUESTION\n{}", question)];
        for category in ExcerptCategory::ALL {
            parts.push(format!("\n## {}", category.heading()));
            for excerpt in self.excerpts.iter().filter(|e| e.category == category) {
                parts.push(format!("{}\n{}\n", excerpt.cite_token, excerpt.text));
            }
        }
        parts.join("\n")
    }
}
