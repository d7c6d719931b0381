//! Edit planning
//!
//! Turns oracle verdicts into byte-offset insertions. Edits only ever insert
//! text; nothing in the original document is replaced or removed.

use std::collections::HashSet;

use tracing::warn;

use crate::config::MarkerPlacement;
use crate::domain::document::{KeywordOccurrence, LinkOccurrence};
use crate::domain::knowledge::RelationshipType;

/// Insert `text` at byte `offset` of the original document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub offset: usize,
    pub text: String,
}

impl Edit {
    pub fn new(offset: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            text: text.into(),
        }
    }
}

/// Edits for one document
///
/// Edits sharing an offset end up in the document in the order they were
/// planned.
#[derive(Debug, Clone)]
pub struct AnnotationPlan {
    placement: MarkerPlacement,
    edits: Vec<Edit>,
    /// (anchor offset, marker text) pairs already planned
    markers: HashSet<(usize, String)>,
    /// Byte ranges already wrapped as keyword links
    wrapped: Vec<(usize, usize)>,
}

impl Default for AnnotationPlan {
    fn default() -> Self {
        Self::new(MarkerPlacement::LineEnd)
    }
}

impl AnnotationPlan {
    pub fn new(placement: MarkerPlacement) -> Self {
        Self {
            placement,
            edits: Vec::new(),
            markers: HashSet::new(),
            wrapped: Vec::new(),
        }
    }

    /// Plan a relationship marker for `link`
    ///
    /// Returns false when nothing was planned: the line already carries a
    /// marker, or the same marker is already planned at the same place.
    pub fn add_marker(&mut self, link: &LinkOccurrence, relationship: RelationshipType) -> bool {
        if link.existing_relation.is_some() {
            return false;
        }

        let offset = match self.placement {
            MarkerPlacement::LineEnd => link.line_end,
            MarkerPlacement::AfterOccurrence => link.byte_end,
        };
        let text = format!(" {}", relationship.marker());

        if !self.markers.insert((offset, text.clone())) {
            return false;
        }
        self.edits.push(Edit::new(offset, text));
        true
    }

    /// Plan a wiki link around a keyword occurrence
    ///
    /// The occurrence becomes `[[key]]`, or `[[key|raw]]` when its text differs
    /// from the concept key. Overlapping wraps are skipped.
    pub fn add_wrap(&mut self, occurrence: &KeywordOccurrence, key: &str) -> bool {
        let (start, end) = (occurrence.byte_start, occurrence.byte_end);
        if start >= end {
            return false;
        }
        if self.wrapped.iter().any(|&(s, e)| start < e && s < end) {
            warn!(
                path = %occurrence.source_file.display(),
                line = occurrence.line_index + 1,
                keyword = %occurrence.raw_text,
                "Skipping overlapping keyword link"
            );
            return false;
        }

        let open = if occurrence.raw_text == key {
            "[[".to_string()
        } else {
            format!("[[{}|", key)
        };
        self.wrapped.push((start, end));
        self.edits.push(Edit::new(start, open));
        self.edits.push(Edit::new(end, "]]"));
        true
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn into_edits(self) -> Vec<Edit> {
        self.edits
    }
}
