use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use tagstream_core::Position;
use tagstream_events::{Applied, EventBus, EventEnvelope, Projection, ProjectionError, ProjectionRunner, Subscription};

use crate::config::RuntimeConfig;
use crate::event_store::{EventStore, EventStoreError};
use crate::projections::ProjectionCursorStore;
use crate::read_model::StoreError;
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Log(#[from] EventStoreError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("cursor store: {0}")]
    Cursor(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Poll interval when no bus notification arrives.
    pub tick: Duration,
    /// Events read from the log per catch-up call.
    pub batch: usize,
    /// Backoff for re-applying a failing event.
    pub retry: RetryPolicy,
}

impl WorkerSettings {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            tick: config.worker_tick,
            batch: config.worker_batch,
            retry: config.projection_retry,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

/// Handle to observe, stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    shutdown: mpsc::Sender<()>,
    cursor: Arc<AtomicU64>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last position the projection acknowledged.
    pub fn cursor(&self) -> Position {
        Position::new(self.cursor.load(Ordering::SeqCst))
    }

    /// Block until the cursor reaches `position` or `timeout` elapses.
    pub fn wait_until(&self, position: Position, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.cursor() < position {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// Returns false when the worker thread had panicked.
    pub fn shutdown(mut self) -> bool {
        if self.shutdown.send(()).is_err() {
            debug!(worker = %self.name, "worker already gone before shutdown");
        }
        let Some(join) = self.join.take() else {
            return true;
        };
        match join.join() {
            Ok(()) => true,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(worker = %self.name, cursor = %self.cursor(), reason = %reason, "projection worker panicked");
                false
            }
        }
    }
}

/// Background read-model projector.
///
/// The worker owns one projection. It wakes on every bus notification (or each
/// tick when the bus is quiet), reads the log after its cursor and applies the
/// events in position order. The cursor is persisted after every acknowledged
/// event, so a restarted worker resumes where it stopped and a re-delivered
/// event is skipped.
///
/// A failing event is retried with backoff and never acknowledged on failure.
/// After the retries are exhausted the worker waits for the next wake-up and
/// starts again from the same event. Command handling never waits on it.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    pub fn spawn<P, S, B, C>(
        projection: P,
        log: S,
        bus: &B,
        cursors: C,
        settings: WorkerSettings,
    ) -> Result<WorkerHandle, WorkerError>
    where
        P: Projection + 'static,
        S: EventStore + 'static,
        B: EventBus<EventEnvelope<JsonValue>>,
        C: ProjectionCursorStore + 'static,
    {
        let name = projection.name().to_string();
        let start = cursors.get_cursor(&name)?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let wakeups = bus.subscribe();
        let cursor = Arc::new(AtomicU64::new(start.value()));

        let worker = Worker {
            name: name.clone(),
            runner: ProjectionRunner::with_cursor(projection, start),
            log,
            cursors,
            settings,
            cursor: cursor.clone(),
        };

        let join = thread::Builder::new()
            .name(format!("projection-{name}"))
            .spawn(move || worker.run(wakeups, shutdown_rx))?;

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            cursor,
            join: Some(join),
        })
    }
}

struct Worker<P, S, C>
where
    P: Projection,
{
    name: String,
    runner: ProjectionRunner<P>,
    log: S,
    cursors: C,
    settings: WorkerSettings,
    cursor: Arc<AtomicU64>,
}

impl<P, S, C> Worker<P, S, C>
where
    P: Projection,
    S: EventStore,
    C: ProjectionCursorStore,
{
    fn run(mut self, wakeups: Subscription<EventEnvelope<JsonValue>>, shutdown: mpsc::Receiver<()>) {
        info!(worker = %self.name, cursor = %self.runner.cursor(), "projection worker started");

        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match self.catch_up() {
                Ok(0) => {}
                Ok(applied) => debug!(worker = %self.name, applied, cursor = %self.runner.cursor(), "caught up"),
                Err(err) => warn!(
                    worker = %self.name,
                    cursor = %self.runner.cursor(),
                    error = %err,
                    "projection catch-up failed, retrying on next wake-up"
                ),
            }

            if !self.wait(&wakeups, &shutdown) {
                break;
            }
        }

        info!(worker = %self.name, cursor = %self.runner.cursor(), "projection worker stopped");
    }

    /// Wait for a bus notification or the tick. Returns false on shutdown.
    fn wait(&self, wakeups: &Subscription<EventEnvelope<JsonValue>>, shutdown: &mpsc::Receiver<()>) -> bool {
        match wakeups.recv_timeout(self.settings.tick) {
            Ok(_) => {
                // One catch-up covers every pending notification.
                wakeups.drain();
                true
            }
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => {
                // No bus anymore: keep polling the log on the tick.
                matches!(shutdown.recv_timeout(self.settings.tick), Err(RecvTimeoutError::Timeout))
            }
        }
    }

    /// Apply everything after the cursor. Returns how many events the
    /// projection consumed.
    fn catch_up(&mut self) -> Result<usize, WorkerError> {
        let mut applied = 0;
        loop {
            let batch = self.log.read_after(self.runner.cursor(), self.settings.batch)?;
            if batch.is_empty() {
                return Ok(applied);
            }

            for event in batch {
                let envelope = event.into_envelope();
                if self.apply_with_retry(&envelope)? == Applied::Applied {
                    applied += 1;
                }
                self.acknowledge();
            }
        }
    }

    fn apply_with_retry(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, ProjectionError> {
        let mut retry = 0;
        loop {
            match self.runner.apply(envelope) {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    retry += 1;
                    let Some(delay) = self.settings.retry.delay_for(retry) else {
                        return Err(err);
                    };
                    warn!(
                        worker = %self.name,
                        position = %envelope.position(),
                        event_type = envelope.event_type(),
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "projection apply failed, backing off"
                    );
                    thread::sleep(delay);
                }
            }
        }
    }

    fn acknowledge(&self) {
        let position = self.runner.cursor();
        self.cursor.store(position.value(), Ordering::SeqCst);
        // An unsaved cursor only means re-delivery after a restart, which the
        // projection tolerates.
        if let Err(err) = self.cursors.update_cursor(&self.name, position) {
            warn!(worker = %self.name, position = %position, error = %err, "failed to persist projection cursor");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    use serde_json::json;

    use tagstream_core::{EventId, Tag, TagSet};
    use tagstream_events::InMemoryEventBus;

    use crate::event_store::{InMemoryEventStore, PublishingEventStore, UncommittedEvent};
    use crate::projections::InMemoryCursorStore;

    use super::*;

    #[derive(Default)]
    struct Flaky {
        values: Mutex<BTreeMap<String, i64>>,
        failing: AtomicBool,
    }

    impl Projection for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn event_types(&self) -> &[&'static str] {
            &["test.value_set"]
        }

        fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ProjectionError::Store("switched off".to_string()));
            }
            let key = envelope.tags().value_of("Key").unwrap_or_default().to_string();
            let value = envelope.payload()["v"].as_i64().unwrap_or_default();
            self.values
                .lock()
                .map_err(|e| ProjectionError::Store(e.to_string()))?
                .insert(key, value);
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

    fn event(key: &str, v: i64) -> UncommittedEvent {
        UncommittedEvent {
            event_id: EventId::new(),
            event_type: "test.value_set".to_string(),
            event_version: 1,
            occurred_at: chrono::Utc::now(),
            tags: TagSet::new().with(Tag::new("Key", key).unwrap()),
            payload: json!({ "v": v }),
        }
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            tick: Duration::from_millis(20),
            batch: 2,
            retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(5)),
        }
    }

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn log() -> (Arc<PublishingEventStore<Arc<InMemoryEventStore>, Bus>>, Bus) {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let store = Arc::new(PublishingEventStore::new(Arc::new(InMemoryEventStore::new()), bus.clone()));
        (store, bus)
    }

    #[test]
    fn worker_applies_published_events_and_persists_its_cursor() {
        let (store, bus) = log();
        let projection = Arc::new(Flaky::default());
        let cursors = Arc::new(InMemoryCursorStore::new());

        let handle =
            ProjectionWorker::spawn(projection.clone(), store.clone(), &bus, cursors.clone(), settings()).unwrap();
        store.append(vec![event("a", 1), event("b", 2), event("a", 3)], None).unwrap();

        assert!(handle.wait_until(Position::new(3), Duration::from_secs(5)));
        assert!(handle.shutdown());

        assert_eq!(projection.values.lock().unwrap()["a"], 3);
        assert_eq!(cursors.get_cursor("flaky").unwrap(), Position::new(3));
    }

    #[test]
    fn failing_events_are_not_acknowledged_until_they_apply() {
        let (store, bus) = log();
        let projection = Arc::new(Flaky::default());
        projection.failing.store(true, Ordering::SeqCst);
        let cursors = Arc::new(InMemoryCursorStore::new());

        let handle =
            ProjectionWorker::spawn(projection.clone(), store.clone(), &bus, cursors.clone(), settings()).unwrap();
        store.append(vec![event("a", 1)], None).unwrap();

        assert!(!handle.wait_until(Position::new(1), Duration::from_millis(150)));
        assert_eq!(cursors.get_cursor("flaky").unwrap(), Position::ZERO);

        projection.failing.store(false, Ordering::SeqCst);
        assert!(handle.wait_until(Position::new(1), Duration::from_secs(5)));
        handle.shutdown();
        assert_eq!(projection.values.lock().unwrap()["a"], 1);
    }

    #[test]
    fn restarted_worker_resumes_from_the_saved_cursor() {
        let (store, bus) = log();
        let cursors = Arc::new(InMemoryCursorStore::new());
        store.append(vec![event("a", 1), event("a", 2)], None).unwrap();
        cursors.update_cursor("flaky", Position::new(1)).unwrap();

        let projection = Arc::new(Flaky::default());
        let handle = ProjectionWorker::spawn(projection.clone(), store, &bus, cursors, settings()).unwrap();
        assert!(handle.wait_until(Position::new(2), Duration::from_secs(5)));
        handle.shutdown();

        // Only position 2 was applied.
        assert_eq!(projection.values.lock().unwrap().len(), 1);
        assert_eq!(projection.values.lock().unwrap()["a"], 2);
    }

    #[test]
    fn worker_catches_up_on_the_tick_without_a_notification() {
        let (store, bus) = log();
        // Written behind the bus's back.
        store.store().append(vec![event("a", 7)], None).unwrap();

        let projection = Arc::new(Flaky::default());
        let handle = ProjectionWorker::spawn(
            projection.clone(),
            store,
            &bus,
            Arc::new(InMemoryCursorStore::new()),
            settings(),
        )
        .unwrap();
        assert!(handle.wait_until(Position::new(1), Duration::from_secs(5)));
        assert_eq!(handle.name(), "flaky");
        handle.shutdown();
    }

    struct Exploding;

    impl Projection for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn event_types(&self) -> &[&'static str] {
            &["test.value_set"]
        }

        fn apply(&self, _envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
            panic!("view corrupted");
        }

        fn reset(&self) -> Result<(), ProjectionError> {
            Ok(())
        }
    }

    #[test]
    fn shutdown_reports_a_panicked_worker() {
        let (store, bus) = log();
        store.store().append(vec![event("a", 1)], None).unwrap();

        let handle =
            ProjectionWorker::spawn(Exploding, store, &bus, Arc::new(InMemoryCursorStore::new()), settings()).unwrap();
        assert!(!handle.wait_until(Position::new(1), Duration::from_millis(100)));
        assert!(!handle.shutdown());
    }
}
