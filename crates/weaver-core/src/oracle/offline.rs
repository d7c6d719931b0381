//! Rule-based oracle for runs without network access
//!
//! Deterministic: the same question always gets the same answer.

use async_trait::async_trait;

use crate::domain::document::ConceptGroup;
use crate::domain::knowledge::{Origin, RelationshipType};

use super::{ConceptVerdict, RelationVerdict, RelationshipOracle};

const RULE_CONFIDENCE: f32 = 0.5;
const DEFAULT_CONFIDENCE: f32 = 0.3;

/// Cue words checked in order; the first hit wins
const CUES: &[(&str, RelationshipType)] = &[
    ("例如", RelationshipType::Exemplifies),
    ("比如", RelationshipType::Exemplifies),
    ("for example", RelationshipType::Exemplifies),
    ("但是", RelationshipType::Refutes),
    ("然而", RelationshipType::Refutes),
    ("however", RelationshipType::Refutes),
    ("是指", RelationshipType::Defines),
    ("定义", RelationshipType::Defines),
    ("is defined as", RelationshipType::Defines),
    ("属于", RelationshipType::IsA),
    ("包含", RelationshipType::HasPart),
    ("包括", RelationshipType::HasPart),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineOracle;

impl OfflineOracle {
    pub fn new() -> Self {
        Self
    }

    fn classify(context: &str) -> Option<RelationshipType> {
        let lowered = context.to_lowercase();
        CUES.iter()
            .find(|(cue, _)| lowered.contains(cue))
            .map(|(_, relationship)| *relationship)
    }
}

#[async_trait]
impl RelationshipOracle for OfflineOracle {
    async fn infer_relation(&self, _source: &str, _target: &str, context: &str) -> RelationVerdict {
        match Self::classify(context) {
            Some(relationship) => RelationVerdict {
                relationship,
                confidence: RULE_CONFIDENCE,
                origin: Origin::Rule,
            },
            None => RelationVerdict {
                relationship: RelationshipType::Mentions,
                confidence: DEFAULT_CONFIDENCE,
                origin: Origin::Rule,
            },
        }
    }

    async fn same_concept(&self, group: &ConceptGroup) -> ConceptVerdict {
        ConceptVerdict {
            same: group.files().len() >= 2,
            confidence: RULE_CONFIDENCE,
            origin: Origin::Rule,
        }
    }
}
