//! Correlation tags.
//!
//! A tag is a `(key, value)` pair such as `("Booking", "b-123")`. Events carry
//! one tag per correlated entity, which is how an entity's history is found
//! without a single owning stream id.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A correlation dimension and value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Build a tag, rejecting blank keys and values.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> DomainResult<Self> {
        let key = key.into();
        let value = value.into();
        if key.trim().is_empty() {
            return Err(DomainError::invalid_id("tag key cannot be blank"));
        }
        if value.trim().is_empty() {
            return Err(DomainError::invalid_id(format!(
                "tag value for '{key}' cannot be blank"
            )));
        }
        Ok(Self { key, value })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl core::fmt::Display for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Ordered, duplicate-free set of tags carried by one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<Tag>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: Tag) -> bool {
        self.0.insert(tag)
    }

    pub fn with(mut self, tag: Tag) -> Self {
        self.0.insert(tag);
        self
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.0.contains(tag)
    }

    /// First value stored under `key`, if any.
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|t| t.key() == key).map(Tag::value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for TagSet {
    type Item = Tag;
    type IntoIter = std::collections::btree_set::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::collections::btree_set::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_rejected() {
        assert!(matches!(Tag::new("Booking", "  "), Err(DomainError::InvalidId(_))));
        assert!(matches!(Tag::new("", "b-1"), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn tag_set_deduplicates() {
        let tag = Tag::new("Guest", "g-1").unwrap();
        let set = TagSet::new().with(tag.clone()).with(tag.clone());
        assert_eq!(set.len(), 1);
        assert_eq!(set.value_of("Guest"), Some("g-1"));
        assert_eq!(set.value_of("Booking"), None);
    }
}
