//! Projection cursor persistence.
//!
//! A cursor is the last log position a projection acknowledged. Persisting it
//! lets a worker resume after a restart; clearing it triggers a full rebuild.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tagstream_core::Position;

use crate::read_model::StoreError;

pub trait ProjectionCursorStore: Send + Sync {
    /// Last acknowledged position, `Position::ZERO` when none was saved.
    fn get_cursor(&self, projection_name: &str) -> Result<Position, StoreError>;

    fn update_cursor(&self, projection_name: &str, position: Position) -> Result<(), StoreError>;

    fn clear_cursor(&self, projection_name: &str) -> Result<(), StoreError>;
}

impl<C> ProjectionCursorStore for Arc<C>
where
    C: ProjectionCursorStore + ?Sized,
{
    fn get_cursor(&self, projection_name: &str) -> Result<Position, StoreError> {
        (**self).get_cursor(projection_name)
    }

    fn update_cursor(&self, projection_name: &str, position: Position) -> Result<(), StoreError> {
        (**self).update_cursor(projection_name, position)
    }

    fn clear_cursor(&self, projection_name: &str) -> Result<(), StoreError> {
        (**self).clear_cursor(projection_name)
    }
}

#[derive(Debug)]
pub struct InMemoryCursorStore {
    cursors: RwLock<BTreeMap<String, Position>>,
    available: AtomicBool,
}

impl Default for InMemoryCursorStore {
    fn default() -> Self {
        Self {
            cursors: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("cursor store switched off".to_string()))
        }
    }
}

impl ProjectionCursorStore for InMemoryCursorStore {
    fn get_cursor(&self, projection_name: &str) -> Result<Position, StoreError> {
        self.check()?;
        let cursors = self
            .cursors
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(cursors.get(projection_name).copied().unwrap_or(Position::ZERO))
    }

    fn update_cursor(&self, projection_name: &str, position: Position) -> Result<(), StoreError> {
        self.check()?;
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        // Never move backwards; a stale writer must not undo progress.
        let entry = cursors.entry(projection_name.to_string()).or_insert(Position::ZERO);
        if position > *entry {
            *entry = position;
        }
        Ok(())
    }

    fn clear_cursor(&self, projection_name: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        cursors.remove(projection_name);
        Ok(())
    }
}
