//! Evidence handling — documents, excerpts, and per-run bundles.
//!
//! Excerpts are the only citable units in the system. A run sees a
//! fixed, ordered bundle of them; the bundle's id set is the citation
//! whitelist every reasoner output is checked against.

mod bundle;
mod excerpt;
mod loader;

pub use bundle::{CategoryLimitSelector, EmptyBundleError, EvidenceBundle, ExcerptSelector};
pub use excerpt::{Document, Excerpt, ExcerptCatalog, ExcerptCategory};
pub use loader::{load_catalog, load_document, parse_excerpts};
