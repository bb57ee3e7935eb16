use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tagstream_core::Position;
use tagstream_events::Criteria;

use super::r#trait::{AppendCondition, EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// In-memory event log.
///
/// One vector guarded by a `RwLock`; index `i` holds position `i + 1`. Intended
/// for tests and development. `set_available(false)` simulates an unreachable
/// log so callers can exercise their system-error paths.
#[derive(Debug)]
pub struct InMemoryEventStore {
    log: RwLock<Vec<StoredEvent>>,
    available: AtomicBool,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self {
            log: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.log.read().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the whole log.
    pub fn all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.ensure_available()?;
        Ok(self.read_log()?.clone())
    }

    fn ensure_available(&self) -> Result<(), EventStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EventStoreError::Unavailable("in-memory log switched off".to_string()))
        }
    }

    fn read_log(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<StoredEvent>>, EventStoreError> {
        self.log
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))
    }

    fn index_after(position: Position, len: usize) -> usize {
        usize::try_from(position.value()).map_or(len, |i| i.min(len))
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        condition: Option<AppendCondition>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.ensure_available()?;

        for (idx, e) in events.iter().enumerate() {
            if e.event_type.trim().is_empty() {
                return Err(EventStoreError::InvalidAppend(format!(
                    "event at index {idx} has no type"
                )));
            }
            if e.tags.is_empty() {
                return Err(EventStoreError::InvalidAppend(format!(
                    "event '{}' at index {idx} carries no correlation tag",
                    e.event_type
                )));
            }
        }

        let mut log = self
            .log
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        if let Some(condition) = &condition {
            let start = Self::index_after(condition.lower_bound(), log.len());
            if let Some(conflict) = log[start..].iter().find(|e| condition.is_violated_by(e)) {
                return Err(EventStoreError::Concurrency(format!(
                    "'{}' committed at position {} after {}",
                    conflict.event_type,
                    conflict.position,
                    condition.lower_bound()
                )));
            }
        }

        if events.is_empty() {
            return Ok(vec![]);
        }

        let mut next = Position::new(log.len() as u64).next();
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            committed.push(StoredEvent {
                position: next,
                event_id: e.event_id,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                tags: e.tags,
                payload: e.payload,
            });
            next = next.next();
        }
        log.extend(committed.iter().cloned());

        Ok(committed)
    }

    fn read(&self, criteria: &Criteria) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.ensure_available()?;
        let log = self.read_log()?;
        Ok(log.iter().filter(|e| e.matches(criteria)).cloned().collect())
    }

    fn read_after(&self, position: Position, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.ensure_available()?;
        let log = self.read_log()?;
        let start = Self::index_after(position, log.len());
        Ok(log[start..].iter().take(limit).cloned().collect())
    }

    fn head(&self) -> Result<Position, EventStoreError> {
        self.ensure_available()?;
        Ok(Position::new(self.read_log()?.len() as u64))
    }
}
