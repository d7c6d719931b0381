//! Candidate clustering of keyword occurrences

use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexMap;

use super::extractor::KeywordOccurrence;

/// Occurrences sharing one normalized form
///
/// A group is only a candidate: the oracle decides whether its members really
/// name the same concept.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptGroup {
    pub key: String,
    pub members: Vec<KeywordOccurrence>,
}

impl ConceptGroup {
    /// Distinct files the members come from, sorted
    pub fn files(&self) -> Vec<&Path> {
        self.members
            .iter()
            .map(|m| m.source_file.as_path())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Group occurrences by normalized form, keeping first-appearance order
///
/// Groups with fewer than `min_occurrences` members are dropped.
pub fn cluster(occurrences: Vec<KeywordOccurrence>, min_occurrences: usize) -> Vec<ConceptGroup> {
    let mut groups: IndexMap<String, Vec<KeywordOccurrence>> = IndexMap::new();
    for occurrence in occurrences {
        groups
            .entry(occurrence.normalized.clone())
            .or_default()
            .push(occurrence);
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() >= min_occurrences)
        .map(|(key, members)| ConceptGroup { key, members })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn occurrence(file: &str, normalized: &str, raw: &str) -> KeywordOccurrence {
        KeywordOccurrence {
            source_file: PathBuf::from(file),
            normalized: normalized.to_string(),
            raw_text: raw.to_string(),
            line_index: 0,
            byte_start: 0,
            byte_end: raw.len(),
            context: String::new(),
        }
    }

    #[test]
    fn test_cluster_groups_by_normalized_form() {
        let groups = cluster(
            vec![
                occurrence("a.md", "焦虑", "焦虑"),
                occurrence("a.md", "anxiety", "Anxiety"),
                occurrence("b.md", "焦虑", "焦虑"),
                occurrence("b.md", "anxiety", "ANXIETY"),
                occurrence("b.md", "失眠", "失眠"),
            ],
            2,
        );

        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["焦虑", "anxiety"]);
        assert_eq!(groups[1].members[1].raw_text, "ANXIETY");
        assert_eq!(groups[0].files(), vec![Path::new("a.md"), Path::new("b.md")]);
    }

    #[test]
    fn test_cluster_threshold() {
        let occurrences = vec![
            occurrence("a.md", "焦虑", "焦虑"),
            occurrence("a.md", "焦虑", "焦虑"),
            occurrence("b.md", "焦虑", "焦虑"),
        ];
        assert_eq!(cluster(occurrences.clone(), 3).len(), 1);
        assert!(cluster(occurrences, 4).is_empty());
    }

    #[test]
    fn test_single_file_group() {
        let groups = cluster(
            vec![occurrence("a.md", "焦虑", "焦虑"), occurrence("a.md", "焦虑", "焦虑")],
            2,
        );
        assert_eq!(groups[0].files().len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_cluster_empty() {
        assert!(cluster(Vec::new(), 2).is_empty());
    }
}
