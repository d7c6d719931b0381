//! Document domain
//!
//! Discovery, extraction and candidate clustering over a vault of Markdown
//! notes. Nothing here mutates a document.

pub mod cluster;
pub mod extractor;
pub mod scanner;
pub mod segment;

pub use cluster::{ConceptGroup, cluster};
pub use extractor::{
    ExtractConfig, Extraction, Extractor, KeywordOccurrence, LinkOccurrence, concept_of, extract,
};
pub use scanner::{Scanner, scan};
pub use segment::{Segment, Segmenter};
