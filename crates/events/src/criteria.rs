//! Tag & type criteria: which events make up one entity's history.
//!
//! Criteria are composable predicates over an event's type name and tag set.
//! A single-identifier criteria reads "has tag (K, V) AND type ∈ types". When a
//! command's target is known by several correlated ids, the criteria becomes a
//! disjunction so the same physical occurrence is found through any of them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use tagstream_core::{DomainError, DomainResult, Tag, TagSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum Criteria {
    /// Matches every event.
    Any,
    /// The event carries all of these tags.
    HasTags(TagSet),
    /// The event type is one of these names.
    OfTypes(BTreeSet<String>),
    /// Every inner criteria matches.
    And(Vec<Criteria>),
    /// At least one inner criteria matches.
    Either(Vec<Criteria>),
}

impl Criteria {
    pub fn having_tags(tags: impl IntoIterator<Item = Tag>) -> Self {
        Criteria::HasTags(tags.into_iter().collect())
    }

    pub fn having_tag(tag: Tag) -> Self {
        Criteria::HasTags(TagSet::new().with(tag))
    }

    pub fn of_types<S: Into<String>>(types: impl IntoIterator<Item = S>) -> Self {
        Criteria::OfTypes(types.into_iter().map(Into::into).collect())
    }

    /// `self AND type ∈ types`.
    pub fn and_being_one_of_types<S: Into<String>>(self, types: impl IntoIterator<Item = S>) -> Self {
        self.and(Criteria::of_types(types))
    }

    pub fn and(self, other: Criteria) -> Self {
        match self {
            Criteria::And(mut inner) => {
                inner.push(other);
                Criteria::And(inner)
            }
            first => Criteria::And(vec![first, other]),
        }
    }

    pub fn either(first: Criteria, second: Criteria) -> Self {
        Criteria::Either(vec![first, second])
    }

    pub fn either_all(alternatives: impl IntoIterator<Item = Criteria>) -> Self {
        Criteria::Either(alternatives.into_iter().collect())
    }

    /// Evaluate against one event's type name and tags.
    pub fn matches(&self, event_type: &str, tags: &TagSet) -> bool {
        match self {
            Criteria::Any => true,
            Criteria::HasTags(required) => required.iter().all(|t| tags.contains(t)),
            Criteria::OfTypes(types) => types.contains(event_type),
            Criteria::And(inner) => inner.iter().all(|c| c.matches(event_type, tags)),
            Criteria::Either(inner) => inner.iter().any(|c| c.matches(event_type, tags)),
        }
    }

    /// Every tag mentioned anywhere in the predicate.
    pub fn tags(&self) -> TagSet {
        let mut out = TagSet::new();
        self.collect_tags(&mut out);
        out
    }

    fn collect_tags(&self, out: &mut TagSet) {
        match self {
            Criteria::HasTags(tags) => {
                for t in tags {
                    out.insert(t.clone());
                }
            }
            Criteria::And(inner) | Criteria::Either(inner) => {
                for c in inner {
                    c.collect_tags(out);
                }
            }
            Criteria::Any | Criteria::OfTypes(_) => {}
        }
    }

    /// Every event type name the predicate can select, or `None` when unrestricted.
    pub fn types(&self) -> Option<BTreeSet<String>> {
        match self {
            Criteria::Any | Criteria::HasTags(_) => None,
            Criteria::OfTypes(types) => Some(types.clone()),
            Criteria::And(inner) => inner
                .iter()
                .filter_map(Criteria::types)
                .reduce(|a, b| a.intersection(&b).cloned().collect()),
            Criteria::Either(inner) => {
                let mut union = BTreeSet::new();
                for c in inner {
                    union.extend(c.types()?);
                }
                Some(union)
            }
        }
    }
}

/// Build the criteria selecting one logical entity's history.
///
/// - One identifier: `has tag AND type ∈ relevant_types`.
/// - Several correlated identifiers: a disjunction of the above, one branch per tag.
///
/// Fails with `InvalidId` when no identifier is given and with `Validation` when
/// the type set is empty. Blank ids are already rejected by [`Tag::new`].
pub fn resolve(identifiers: &[Tag], relevant_types: &[&str]) -> DomainResult<Criteria> {
    if identifiers.is_empty() {
        return Err(DomainError::invalid_id("at least one identifier is required"));
    }
    if relevant_types.is_empty() {
        return Err(DomainError::validation("at least one event type is required"));
    }

    let mut branches: Vec<Criteria> = identifiers
        .iter()
        .map(|tag| Criteria::having_tag(tag.clone()).and_being_one_of_types(relevant_types.iter().copied()))
        .collect();

    if branches.len() == 1 {
        Ok(branches.remove(0))
    } else {
        Ok(Criteria::Either(branches))
    }
}
