//! Cross-entity lookups made while projecting.
//!
//! A view sometimes shows data owned by another entity (a doctor's name, a
//! container's location) that may not be known yet when the event is applied.
//! Projections never fail on a missing lookup and never make a value up on
//! their own: each lookup names its [`LookupFallback`].

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

/// What to store when a lookup finds nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupFallback {
    /// Store this text instead.
    Placeholder(String),
    /// Leave whatever the record already holds (possibly nothing).
    KeepExisting,
}

/// Source of names/labels keyed by id.
pub trait Directory: Send + Sync {
    fn resolve(&self, id: &str) -> Option<String>;
}

impl<D> Directory for Arc<D>
where
    D: Directory + ?Sized,
{
    fn resolve(&self, id: &str) -> Option<String> {
        (**self).resolve(id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(id.into(), value.into());
        }
    }

    pub fn with(self, id: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(id, value);
        self
    }
}

impl Directory for InMemoryDirectory {
    fn resolve(&self, id: &str) -> Option<String> {
        self.entries.read().ok()?.get(id).cloned()
    }
}

/// A directory paired with its fallback policy.
#[derive(Debug)]
pub struct Lookup<D> {
    kind: &'static str,
    directory: D,
    fallback: LookupFallback,
}

impl<D> Lookup<D>
where
    D: Directory,
{
    pub fn new(kind: &'static str, directory: D, fallback: LookupFallback) -> Self {
        Self {
            kind,
            directory,
            fallback,
        }
    }

    pub fn fallback(&self) -> &LookupFallback {
        &self.fallback
    }

    /// Resolve `id`, falling back per policy. `existing` is the value the
    /// record holds today.
    pub fn resolve(&self, id: &str, existing: Option<&str>) -> Option<String> {
        if let Some(value) = self.directory.resolve(id) {
            return Some(value);
        }

        debug!(lookup = self.kind, id, fallback = ?self.fallback, "lookup missed, applying fallback");
        match &self.fallback {
            LookupFallback::Placeholder(text) => Some(text.clone()),
            LookupFallback::KeepExisting => existing.map(str::to_string),
        }
    }
}
