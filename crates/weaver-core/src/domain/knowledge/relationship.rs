//! Relationship vocabulary and records
//!
//! The vocabulary is closed: every relationship written into a document or
//! persisted in the graph is one of the eight [`RelationshipType`] variants.
//! The Chinese label doubles as the in-document marker text (`[[支撑观点]]`)
//! and the persisted value.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of relationships between two concepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    /// Source supports the target's argument
    #[serde(rename = "支撑观点")]
    Supports,
    /// Source refutes the target's argument
    #[serde(rename = "反驳观点")]
    Refutes,
    /// Source illustrates the target with an example
    #[serde(rename = "举例说明")]
    Exemplifies,
    /// Source defines the target concept
    #[serde(rename = "定义概念")]
    Defines,
    /// Source belongs to the target category
    #[serde(rename = "属于分类")]
    IsA,
    /// Source contains the target as a part
    #[serde(rename = "包含部分")]
    HasPart,
    /// Source leads into the target topic
    #[serde(rename = "引出主题")]
    Introduces,
    /// Plain mention, also the fallback when nothing better is known
    #[serde(rename = "简单提及")]
    Mentions,
}

impl RelationshipType {
    /// Marker label as written into documents
    pub fn label(&self) -> &'static str {
        match self {
            Self::Supports => "支撑观点",
            Self::Refutes => "反驳观点",
            Self::Exemplifies => "举例说明",
            Self::Defines => "定义概念",
            Self::IsA => "属于分类",
            Self::HasPart => "包含部分",
            Self::Introduces => "引出主题",
            Self::Mentions => "简单提及",
        }
    }

    /// English identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supports => "supports",
            Self::Refutes => "refutes",
            Self::Exemplifies => "exemplifies",
            Self::Defines => "defines",
            Self::IsA => "is_a",
            Self::HasPart => "has_part",
            Self::Introduces => "introduces",
            Self::Mentions => "mentions",
        }
    }

    /// Exact label lookup, used to tell markers apart from links
    pub fn from_label(label: &str) -> Option<Self> {
        Self::all().iter().copied().find(|r| r.label() == label)
    }

    /// Parse from a label or an English identifier
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(found) = Self::from_label(s) {
            return Some(found);
        }
        match s.to_lowercase().replace(['-', ' '], "_").as_str() {
            "supports" => Some(Self::Supports),
            "refutes" => Some(Self::Refutes),
            "exemplifies" => Some(Self::Exemplifies),
            "defines" => Some(Self::Defines),
            "is_a" | "isa" => Some(Self::IsA),
            "has_part" | "haspart" => Some(Self::HasPart),
            "introduces" => Some(Self::Introduces),
            "mentions" => Some(Self::Mentions),
            _ => None,
        }
    }

    /// Get all relationship types
    pub fn all() -> &'static [RelationshipType] {
        &[
            Self::Supports,
            Self::Refutes,
            Self::Exemplifies,
            Self::Defines,
            Self::IsA,
            Self::HasPart,
            Self::Introduces,
            Self::Mentions,
        ]
    }

    /// In-document marker, e.g. `[[支撑观点]]`
    pub fn marker(&self) -> String {
        format!("[[{}]]", self.label())
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Where a verdict came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    /// Parsed from a remote oracle reply
    Oracle,
    /// Produced by the rule-based offline oracle
    Rule,
    /// Read back from a marker already present in a document
    Existing,
    /// Default used after the oracle kept failing
    Fallback { attempts: u32, reason: String },
}

impl Origin {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// A relationship discovered between two concepts
///
/// Records are immutable and append-only: both the annotator and the graph
/// store consume the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub source_concept: String,
    pub target_concept: String,
    pub relationship: RelationshipType,
    pub context: String,
    pub source_file: PathBuf,
    pub confidence: f32,
    pub origin: Origin,
    pub created_at: DateTime<Utc>,
}

impl RelationshipRecord {
    pub fn new(
        source_concept: impl Into<String>,
        target_concept: impl Into<String>,
        relationship: RelationshipType,
    ) -> Self {
        Self {
            source_concept: source_concept.into(),
            target_concept: target_concept.into(),
            relationship,
            context: String::new(),
            source_file: PathBuf::new(),
            confidence: 1.0,
            origin: Origin::Oracle,
            created_at: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_file = path.into();
        self
    }

    /// Set the confidence (clamped to 0.0-1.0)
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_type_roundtrip() {
        for rel_type in RelationshipType::all() {
            assert_eq!(RelationshipType::parse(rel_type.label()), Some(*rel_type));
            assert_eq!(RelationshipType::parse(rel_type.as_str()), Some(*rel_type));
        }
        assert_eq!(RelationshipType::all().len(), 8);
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(RelationshipType::parse("Is-A"), Some(RelationshipType::IsA));
        assert_eq!(RelationshipType::parse(" 支撑观点 "), Some(RelationshipType::Supports));
        assert_eq!(RelationshipType::parse("related_to"), None);
    }

    #[test]
    fn test_from_label_is_exact() {
        assert_eq!(RelationshipType::from_label("举例说明"), Some(RelationshipType::Exemplifies));
        assert_eq!(RelationshipType::from_label("举例说明 "), None);
        assert_eq!(RelationshipType::from_label("exemplifies"), None);
    }

    #[test]
    fn test_marker_and_display() {
        assert_eq!(RelationshipType::Supports.marker(), "[[支撑观点]]");
        assert_eq!(RelationshipType::Mentions.to_string(), "简单提及");
    }

    #[test]
    fn test_serializes_as_label() {
        let json = serde_json::to_string(&RelationshipType::HasPart).unwrap();
        assert_eq!(json, "\"包含部分\"");
        let back: RelationshipType = serde_json::from_str("\"引出主题\"").unwrap();
        assert_eq!(back, RelationshipType::Introduces);
    }

    #[test]
    fn test_record_builder() {
        let record = RelationshipRecord::new("关系", "感受", RelationshipType::Supports)
            .with_context("关系不会在乎事实如何")
            .with_source_file("/vault/关系.md")
            .with_confidence(1.5)
            .with_origin(Origin::Fallback {
                attempts: 3,
                reason: "timeout".to_string(),
            });

        assert_eq!(record.confidence, 1.0);
        assert!(record.origin.is_fallback());
        assert_eq!(record.source_file, PathBuf::from("/vault/关系.md"));
    }

    #[test]
    fn test_origin_serialization() {
        let json = serde_json::to_value(Origin::Fallback {
            attempts: 2,
            reason: "rate limited".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "fallback");
        assert_eq!(json["attempts"], 2);
        assert_eq!(serde_json::to_value(Origin::Oracle).unwrap()["kind"], "oracle");
    }
}
