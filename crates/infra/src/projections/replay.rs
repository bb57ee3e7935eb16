//! Rebuilding read models by replaying the log.
//!
//! A replay runs as a tokio task: it pages through the whole log, resets the
//! projection and feeds it every event in position order. Progress can be
//! polled and the task cancelled through the returned [`ReplayHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use tagstream_core::Position;
use tagstream_events::{Projection, ProjectionError, ProjectionRunner};

use crate::event_store::{EventFilter, EventQuery, EventStoreError, Pagination, StoredEvent};

const PAGE_SIZE: u32 = 1000;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("replay failed: {0}")]
    Failed(String),

    #[error("replay cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPhase {
    Loading,
    Clearing,
    Replaying,
    Complete,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayProgress {
    pub projection: String,
    /// Events the projection handles.
    pub total_events: u64,
    pub processed_events: u64,
    /// Cursor to persist once the replay completed.
    pub last_position: Position,
    pub phase: ReplayPhase,
    pub dry_run: bool,
    pub error: Option<String>,
}

impl ReplayProgress {
    pub fn is_finished(&self) -> bool {
        matches!(
            self.phase,
            ReplayPhase::Complete | ReplayPhase::Failed | ReplayPhase::Cancelled
        )
    }
}

#[derive(Debug, Clone)]
pub struct ReplayHandle {
    progress: Arc<RwLock<ReplayProgress>>,
    cancellation: Arc<AtomicBool>,
}

impl ReplayHandle {
    pub async fn progress(&self) -> ReplayProgress {
        self.progress.read().await.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.load(Ordering::Relaxed)
    }

    pub async fn wait_for_completion(&self) -> Result<ReplayProgress, ReplayError> {
        loop {
            let progress = self.progress.read().await.clone();
            match progress.phase {
                ReplayPhase::Complete => return Ok(progress),
                ReplayPhase::Cancelled => return Err(ReplayError::Cancelled),
                ReplayPhase::Failed => {
                    return Err(ReplayError::Failed(progress.error.unwrap_or_default()));
                }
                _ => tokio::time::sleep(tokio::time::Duration::from_millis(10)).await,
            }
        }
    }
}

/// Start rebuilding `projection` from the full log.
///
/// With `dry_run` the projection is neither reset nor written; the task only
/// loads and counts the events it would apply.
pub async fn replay_projection<Q, P>(query: Arc<Q>, projection: Arc<P>, dry_run: bool) -> ReplayHandle
where
    Q: EventQuery + 'static,
    P: Projection + 'static,
{
    let progress = Arc::new(RwLock::new(ReplayProgress {
        projection: projection.name().to_string(),
        total_events: 0,
        processed_events: 0,
        last_position: Position::ZERO,
        phase: ReplayPhase::Loading,
        dry_run,
        error: None,
    }));
    let cancellation = Arc::new(AtomicBool::new(false));

    let handle = ReplayHandle {
        progress: progress.clone(),
        cancellation: cancellation.clone(),
    };

    tokio::spawn(async move {
        let name = projection.name().to_string();
        let result = run_replay(query, projection, dry_run, progress.clone(), cancellation).await;

        let mut prog = progress.write().await;
        match result {
            Ok(()) => {
                prog.phase = ReplayPhase::Complete;
                info!(projection = %name, events = prog.processed_events, dry_run, "replay complete");
            }
            Err(ReplayError::Cancelled) => {
                prog.phase = ReplayPhase::Cancelled;
                warn!(projection = %name, "replay cancelled");
            }
            Err(e) => {
                prog.phase = ReplayPhase::Failed;
                warn!(projection = %name, error = %e, "replay failed");
                prog.error = Some(e.to_string());
            }
        }
    });

    handle
}

async fn set_phase(progress: &RwLock<ReplayProgress>, phase: ReplayPhase) {
    progress.write().await.phase = phase;
}

fn check_cancelled(cancellation: &AtomicBool) -> Result<(), ReplayError> {
    if cancellation.load(Ordering::Relaxed) {
        Err(ReplayError::Cancelled)
    } else {
        Ok(())
    }
}

async fn run_replay<Q, P>(
    query: Arc<Q>,
    projection: Arc<P>,
    dry_run: bool,
    progress: Arc<RwLock<ReplayProgress>>,
    cancellation: Arc<AtomicBool>,
) -> Result<(), ReplayError>
where
    Q: EventQuery,
    P: Projection,
{
    set_phase(&progress, ReplayPhase::Loading).await;
    info!(projection = projection.name(), dry_run, "replay loading events");

    let mut events: Vec<StoredEvent> = Vec::new();
    let mut offset = 0u32;
    loop {
        check_cancelled(&cancellation)?;

        let page = query
            .query_events(EventFilter::default(), Pagination::new(Some(PAGE_SIZE), Some(offset)))
            .await?;
        events.extend(page.events.into_iter().filter(|e| projection.handles(&e.event_type)));

        if !page.has_more {
            break;
        }
        offset += PAGE_SIZE;
    }

    {
        let mut prog = progress.write().await;
        prog.total_events = events.len() as u64;
    }
    check_cancelled(&cancellation)?;

    set_phase(&progress, ReplayPhase::Clearing).await;
    if !dry_run {
        projection.reset()?;
    }
    check_cancelled(&cancellation)?;

    set_phase(&progress, ReplayPhase::Replaying).await;
    let mut runner = ProjectionRunner::new(projection.clone());
    for (processed, event) in events.iter().enumerate() {
        check_cancelled(&cancellation)?;

        if !dry_run {
            runner.apply(&event.to_envelope())?;
        }

        let mut prog = progress.write().await;
        prog.processed_events = processed as u64 + 1;
        prog.last_position = event.position;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use serde_json::{Value as JsonValue, json};

    use tagstream_core::{EventId, Tag, TagSet};
    use tagstream_events::EventEnvelope;

    use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};

    use super::*;

    #[derive(Default)]
    struct Latest {
        values: Mutex<BTreeMap<String, JsonValue>>,
    }

    impl Projection for Latest {
        fn name(&self) -> &str {
            "latest"
        }

        fn event_types(&self) -> &[&'static str] {
            &["test.value_set"]
        }

        fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
            let key = envelope.tags().value_of("Key").unwrap_or_default().to_string();
            self.values
                .lock()
                .map_err(|e| ProjectionError::Store(e.to_string()))?
                .insert(key, envelope.payload().clone());
            Ok(())
        }

        fn reset(&self) -> Result<(), ProjectionError> {
            self.values
                .lock()
                .map_err(|e| ProjectionError::Store(e.to_string()))?
                .clear();
            Ok(())
        }
    }

    fn seed(store: &InMemoryEventStore) {
        let events = (0..5)
            .map(|i| UncommittedEvent {
                event_id: EventId::new(),
                event_type: if i == 2 { "test.other" } else { "test.value_set" }.to_string(),
                event_version: 1,
                occurred_at: chrono::Utc::now(),
                tags: TagSet::new().with(Tag::new("Key", format!("k-{}", i % 2)).unwrap()),
                payload: json!({ "i": i }),
            })
            .collect();
        store.append(events, None).unwrap();
    }

    #[tokio::test]
    async fn replay_rebuilds_the_view() {
        let store = Arc::new(InMemoryEventStore::new());
        seed(&store);
        let projection = Arc::new(Latest::default());
        projection
            .values
            .lock()
            .unwrap()
            .insert("stale".to_string(), json!(null));

        let handle = replay_projection(store, projection.clone(), false).await;
        let done = handle.wait_for_completion().await.unwrap();

        assert_eq!(done.total_events, 4);
        assert_eq!(done.processed_events, 4);
        assert_eq!(done.last_position, Position::new(5));
        let values = projection.values.lock().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["k-0"], json!({ "i": 4 }));
        assert_eq!(values["k-1"], json!({ "i": 3 }));
    }

    #[tokio::test]
    async fn dry_run_leaves_the_view_alone() {
        let store = Arc::new(InMemoryEventStore::new());
        seed(&store);
        let projection = Arc::new(Latest::default());

        let handle = replay_projection(store, projection.clone(), true).await;
        let done = handle.wait_for_completion().await.unwrap();

        assert!(done.dry_run);
        assert_eq!(done.processed_events, 4);
        assert!(projection.values.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let store = Arc::new(InMemoryEventStore::new());
        seed(&store);

        let handle = replay_projection(store, Arc::new(Latest::default()), false).await;
        handle.cancel();
        assert!(matches!(handle.wait_for_completion().await, Err(ReplayError::Cancelled)));
        assert_eq!(handle.progress().await.phase, ReplayPhase::Cancelled);
    }

    #[tokio::test]
    async fn unavailable_log_fails_the_replay() {
        let store = Arc::new(InMemoryEventStore::new());
        store.set_available(false);

        let handle = replay_projection(store, Arc::new(Latest::default()), false).await;
        assert!(matches!(handle.wait_for_completion().await, Err(ReplayError::Failed(_))));
    }
}
