//! Duplicate groups produced by the grouper.

use std::fmt;

/// Why two messages were linked.
///
/// Ordered from strongest to weakest, so `min()` over a set picks the
/// strongest method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMethod {
    /// Identical booking references.
    ExactReference,
    /// Booking references within one typo of each other.
    FuzzyReference,
    /// Same flight number on the same travel date.
    FlightDate,
    /// Text embeddings agree on a pair already linked by another method.
    Semantic,
}

impl MatchMethod {
    pub fn label(self) -> &'static str {
        match self {
            Self::ExactReference => "exact-reference",
            Self::FuzzyReference => "fuzzy-reference",
            Self::FlightDate => "flight-date",
            Self::Semantic => "semantic",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How sure the grouper is that the members belong together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Confidence implied by the set of methods that linked a group.
    ///
    /// Singletons (no methods) are `High`: there is no link to doubt.
    pub fn from_methods(methods: &[MatchMethod]) -> Self {
        if methods.is_empty()
            || methods.contains(&MatchMethod::ExactReference)
            || methods.contains(&MatchMethod::Semantic)
        {
            Self::High
        } else if methods.contains(&MatchMethod::FlightDate) {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Messages that describe the same booking (or its lineage: original,
/// schedule change, cancellation).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DuplicateGroup {
    /// Member message ids, oldest first.
    pub message_ids: Vec<String>,
    /// The member forwarded downstream: always `message_ids[0]`.
    pub representative: String,
    /// Every method that contributed a link inside the group, strongest first.
    pub methods: Vec<MatchMethod>,
    /// Strongest method among `methods`; `None` for singletons.
    pub strongest: Option<MatchMethod>,
    pub confidence: Confidence,
}

impl DuplicateGroup {
    pub fn len(&self) -> usize {
        self.message_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message_ids.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.message_ids.len() == 1
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.message_ids.iter().any(|id| id == message_id)
    }

    /// Members other than the representative, by position.
    pub fn duplicates(&self) -> impl Iterator<Item = &str> {
        self.message_ids.iter().skip(1).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strongest_method_is_minimum() {
        let methods = [MatchMethod::FlightDate, MatchMethod::FuzzyReference];
        assert_eq!(methods.iter().min(), Some(&MatchMethod::FuzzyReference));
    }

    #[test]
    fn test_confidence_from_methods() {
        assert_eq!(Confidence::from_methods(&[]), Confidence::High);
        assert_eq!(
            Confidence::from_methods(&[MatchMethod::ExactReference]),
            Confidence::High
        );
        assert_eq!(
            Confidence::from_methods(&[MatchMethod::FlightDate, MatchMethod::Semantic]),
            Confidence::High
        );
        assert_eq!(
            Confidence::from_methods(&[MatchMethod::FuzzyReference, MatchMethod::FlightDate]),
            Confidence::Medium
        );
        assert_eq!(
            Confidence::from_methods(&[MatchMethod::FuzzyReference]),
            Confidence::Low
        );
    }

    #[test]
    fn test_duplicates_skip_representative() {
        let group = DuplicateGroup {
            message_ids: vec!["a".into(), "b".into(), "c".into()],
            representative: "a".into(),
            methods: vec![MatchMethod::ExactReference],
            strongest: Some(MatchMethod::ExactReference),
            confidence: Confidence::High,
        };
        assert_eq!(group.duplicates().collect::<Vec<_>>(), vec!["b", "c"]);
        assert!(group.contains("c"));
        assert!(!group.is_singleton());
    }

    #[test]
    fn test_duplicates_keep_members_sharing_representative_id() {
        let group = DuplicateGroup {
            message_ids: vec!["a".into(), "a".into(), "b".into()],
            representative: "a".into(),
            methods: vec![MatchMethod::FlightDate],
            strongest: Some(MatchMethod::FlightDate),
            confidence: Confidence::Medium,
        };
        assert_eq!(group.duplicates().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(group.duplicates().count(), group.len() - 1);
    }
}
