use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tagstream_events::{EventEnvelope, InMemoryEventBus, ProjectionRunner};
use tagstream_infra::command_dispatcher::CommandDispatcher;
use tagstream_infra::event_store::{EventStore, InMemoryEventStore, StoredEvent, UncommittedEvent};
use tagstream_infra::projections::RaceRatingsProjection;
use tagstream_infra::read_model::InMemoryReadModelStore;
use tagstream_rating::{
    RaceRated, RaceRatingCommand, RaceRatingEvent, RaceRatings, RaceTarget, RateRace, Rating, UpdateRaceRating,
};

type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

/// Naive CRUD simulation: one mutable row per race, no history.
#[derive(Debug, Clone)]
struct NaiveRatingTable {
    inner: Arc<RwLock<HashMap<(String, String), u8>>>,
}

impl NaiveRatingTable {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn upsert(&self, race_id: &str, user_id: &str, rating: i32) -> Result<(), ()> {
        let rating = u8::try_from(rating).map_err(|_| ())?;
        if !(1..=10).contains(&rating) {
            return Err(());
        }
        let mut map = self.inner.write().unwrap();
        map.insert((race_id.to_string(), user_id.to_string()), rating);
        Ok(())
    }
}

fn setup() -> (Dispatcher, Arc<InMemoryEventStore>) {
    let log = Arc::new(InMemoryEventStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    (CommandDispatcher::new(log.clone(), bus), log)
}

fn rate(race_id: &str, user_id: &str, rating: i32) -> RaceRatingCommand {
    RaceRatingCommand::Rate(RateRace {
        race_id: race_id.to_string(),
        user_id: user_id.to_string(),
        rating,
        comment: None,
        occurred_at: Utc::now(),
    })
}

fn rated(race_id: &str, user: usize) -> UncommittedEvent {
    UncommittedEvent::from_typed(&RaceRatingEvent::RaceRated(RaceRated {
        race_id: race_id.to_string(),
        user_id: format!("u-{user}"),
        rating: Rating::new((user % 10 + 1) as i32).unwrap(),
        comment: None,
        occurred_at: Utc::now(),
    }))
    .unwrap()
}

/// A log with `count` ratings spread over a handful of races.
fn seeded_log(count: usize) -> Arc<InMemoryEventStore> {
    let log = Arc::new(InMemoryEventStore::new());
    let events = (0..count).map(|i| rated(&format!("r-{}", i % 8), i)).collect();
    log.append(events, None).unwrap();
    log
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(1000);

    // First rating of a race (empty history)
    group.bench_function("rate_fresh_race", |b| {
        let (dispatcher, _) = setup();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            dispatcher
                .dispatch::<RaceRatings>(rate(&format!("r-{n}"), "u-1", black_box(7)))
                .unwrap();
        });
    });

    // Updating a rating on a race whose history keeps growing
    group.bench_function("update_rating_with_history", |b| {
        let (dispatcher, _) = setup();
        dispatcher.dispatch::<RaceRatings>(rate("r-1", "u-1", 5)).unwrap();

        let mut flip = false;
        b.iter(|| {
            flip = !flip;
            let cmd = RaceRatingCommand::UpdateRating(UpdateRaceRating {
                race_id: "r-1".to_string(),
                user_id: "u-1".to_string(),
                rating: black_box(if flip { 9 } else { 4 }),
                comment: None,
                occurred_at: Utc::now(),
            });
            dispatcher.dispatch::<RaceRatings>(cmd).unwrap();
        });
    });

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch_size), batch_size, |b, &size| {
            let log = InMemoryEventStore::new();
            b.iter(|| {
                let batch = (0..size).map(|i| rated("r-1", i)).collect();
                black_box(log.append(batch, None).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_state_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_rebuild");

    for history in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*history as u64));
        group.bench_with_input(BenchmarkId::from_parameter(history), history, |b, &size| {
            let (dispatcher, _) = setup();
            for user in 0..size {
                dispatcher
                    .dispatch::<RaceRatings>(rate("r-1", &format!("u-{user}"), (user % 10 + 1) as i32))
                    .unwrap();
            }
            let target = RaceTarget("r-1".to_string());
            b.iter(|| {
                let projected = dispatcher.load::<RaceRatings>(black_box(&target)).unwrap();
                black_box(projected.state.average());
            });
        });
    }

    group.finish();
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild_speed");

    for count in [100usize, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &size| {
            let log = seeded_log(size);
            let envelopes: Vec<_> = log.all().unwrap().into_iter().map(StoredEvent::into_envelope).collect();
            let store = Arc::new(InMemoryReadModelStore::new());
            let mut runner = ProjectionRunner::new(RaceRatingsProjection::new(store));

            b.iter(|| {
                black_box(runner.rebuild_from_scratch(&envelopes).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_event_sourcing_vs_naive_crud(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_sourcing_vs_naive_crud");
    group.sample_size(1000);

    group.bench_function("event_sourcing_rate", |b| {
        let (dispatcher, _) = setup();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            dispatcher
                .dispatch::<RaceRatings>(rate(&format!("r-{n}"), "u-1", black_box(6)))
                .unwrap();
        });
    });

    group.bench_function("naive_crud_rate", |b| {
        let table = NaiveRatingTable::new();
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            table.upsert(&format!("r-{n}"), "u-1", black_box(6)).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_event_append_throughput,
    bench_state_rebuild,
    bench_projection_rebuild_speed,
    bench_event_sourcing_vs_naive_crud
);
criterion_main!(benches);
