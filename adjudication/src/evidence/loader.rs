//! Document ingestion — markdown files with pre-placed `[CITE=XXX-###]`
//! markers are split into excerpts with stable ids.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use super::excerpt::{Document, Excerpt, ExcerptCatalog, ExcerptCategory};

/// Marker regex. The text of an excerpt runs from the end of its
/// marker to the next marker (or end of document).
fn cite_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[CITE=([A-Z]{3}-\d{3})\]").expect("valid cite regex"))
}

/// Load a single markdown document from disk.
pub fn load_document(path: &Path, category: ExcerptCategory) -> Result<Document> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read document {}", path.display()))?;
    let doc_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let title = extract_title(&content).unwrap_or_else(|| doc_id.clone());
    Ok(Document::new(doc_id, category, title, content))
}

/// First markdown `# ` heading, if any.
fn extract_title(content: &str) -> Option<String> {
    content
        .lines()
        .find(|l| l.starts_with("# "))
        .map(|l| l[2..].trim().to_string())
}

/// Split a document into excerpt blocks on its cite markers.
///
/// Markers without trailing text produce empty excerpts and are
/// dropped; trailing `---` separators are stripped.
pub fn parse_excerpts(doc: &Document) -> Vec<Excerpt> {
    let re = cite_marker();
    let matches: Vec<_> = re.captures_iter(&doc.content).collect();
    let mut excerpts = Vec::with_capacity(matches.len());

    for (i, cap) in matches.iter().enumerate() {
        let id = cap.get(1).expect("capture group").as_str();
        let start = cap.get(0).expect("match").end();
        let end = matches
            .get(i + 1)
            .map(|next| next.get(0).expect("match").start())
            .unwrap_or(doc.content.len());

        let text = doc.content[start..end]
            .trim()
            .trim_end_matches("---")
            .trim()
            .to_string();
        if text.is_empty() {
            continue;
        }
        excerpts.push(Excerpt::new(id, &doc.doc_id, doc.category, text));
    }

    excerpts
}

/// Load every `*.md` document under `docs_dir` into a catalog.
///
/// Category is inferred from the filename prefix (`policy*`,
/// `contract*`, anything else is evidentiary). Files are visited in
/// sorted order so the catalog — and everything fingerprinted from it
/// downstream — is deterministic across runs.
pub fn load_catalog(docs_dir: &Path) -> Result<ExcerptCatalog> {
    let mut paths: Vec<_> = std::fs::read_dir(docs_dir)
        .with_context(|| format!("failed to read docs dir {}", docs_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();

    let mut catalog = ExcerptCatalog::default();
    for path in paths {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let category = category_for_stem(&stem);
        let doc = load_document(&path, category)?;
        let excerpts = parse_excerpts(&doc);
        debug!(doc = %doc.doc_id, category = %category, count = excerpts.len(), "parsed document");
        catalog.excerpts.extend(excerpts);
        catalog.documents.push(doc);
    }

    Ok(catalog)
}

fn category_for_stem(stem: &str) -> ExcerptCategory {
    if stem.starts_with("policy") {
        ExcerptCategory::Policy
    } else if stem.starts_with("contract") {
        ExcerptCategory::Contractual
    } else {
        ExcerptCategory::Evidentiary
    }
}
