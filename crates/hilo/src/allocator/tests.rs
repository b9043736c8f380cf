use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use futures::future::try_join_all;

use crate::{
    allocator::HiLoGenerator,
    chunk::{MAX_COUNTER, MAX_RESERVE_ATTEMPTS},
    error::Error,
    record::{COUNTER_ROW_KEY, CounterRecord, TableRecord},
    store::{
        MemoryStore, StoreAdapter, StoreError, TimeoutStore,
        testing::{
            ConflictingStore, CountingStore, FlakyStore, StallingStore, UnavailableStore,
        },
    },
};

async fn stored_max<S: StoreAdapter>(store: &S, key: &str) -> u64 {
    let row = store.get(key, COUNTER_ROW_KEY).await.unwrap().unwrap();
    CounterRecord::read_entity(&row.value).unwrap().current_max
}

fn assert_strictly_increasing(ids: &[u64]) {
    for pair in ids.windows(2) {
        assert!(pair[0] < pair[1], "{} is not below {}", pair[0], pair[1]);
    }
}

#[test]
fn rejects_zero_chunk_size() {
    let store = Arc::new(MemoryStore::new());
    assert!(matches!(
        HiLoGenerator::new("orders", 0, store),
        Err(Error::InvalidChunkSize)
    ));
}

#[test]
fn rejects_chunk_size_beyond_id_space() {
    for chunk_size in [MAX_COUNTER + 1, u64::MAX] {
        assert!(matches!(
            HiLoGenerator::new("orders", chunk_size, Arc::new(MemoryStore::new())),
            Err(Error::InvalidChunkSize)
        ));
    }
}

#[tokio::test]
async fn largest_chunk_matches_stored_max() {
    let store = Arc::new(MemoryStore::new());
    let generator = HiLoGenerator::new("orders", MAX_COUNTER, Arc::clone(&store)).unwrap();

    assert_eq!(generator.next_id().await.unwrap(), 1);
    assert_eq!(generator.remaining().unwrap(), MAX_COUNTER - 1);
    assert_eq!(stored_max(&*store, "orders").await, MAX_COUNTER);
}

#[tokio::test]
async fn deleted_counter_is_not_reissued() {
    let store = Arc::new(MemoryStore::new());
    let generator = HiLoGenerator::new("orders", 10, Arc::clone(&store)).unwrap();

    let first: Vec<u64> = generator.next_ids(10).await.unwrap();
    assert_eq!(first, (1..=10).collect::<Vec<_>>());
    assert!(store.remove("orders", COUNTER_ROW_KEY).unwrap());

    // The recreated record claims 1..=10 again, below the held range.
    let err = generator.next_id().await.unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Malformed(_))), "{err:?}");
    assert!(err.to_string().contains("moved backwards"));
    assert_eq!(generator.remaining().unwrap(), 0);
    assert_eq!(generator.try_next_id_local().unwrap(), None);
}

#[test]
fn rejects_empty_key() {
    let store = Arc::new(MemoryStore::new());
    assert!(matches!(
        HiLoGenerator::new("", 10, store),
        Err(Error::InvalidKey)
    ));
}

#[test]
fn fresh_generator_holds_no_range() {
    let generator = HiLoGenerator::new("orders", 10, Arc::new(MemoryStore::new())).unwrap();
    assert_eq!(generator.remaining().unwrap(), 0);
    assert_eq!(generator.try_next_id_local().unwrap(), None);
    assert_eq!(generator.key(), "orders");
    assert_eq!(generator.chunk_size(), 10);
}

#[tokio::test]
async fn chunk_is_reused_until_exhausted() {
    let store = Arc::new(CountingStore::new());
    let generator = HiLoGenerator::new("orders", 100, Arc::clone(&store)).unwrap();

    assert_eq!(generator.next_id().await.unwrap(), 1);
    assert_eq!(store.gets(), 1);
    assert_eq!(store.writes(), 1);
    assert_eq!(stored_max(&store.inner, "orders").await, 100);

    for expected in 2..=100 {
        assert_eq!(generator.next_id().await.unwrap(), expected);
    }
    assert_eq!(store.gets(), 1, "no store access inside the first chunk");
    assert_eq!(store.writes(), 1);
    assert_eq!(generator.remaining().unwrap(), 0);

    assert_eq!(generator.next_id().await.unwrap(), 101);
    assert_eq!(store.gets(), 2);
    assert_eq!(store.writes(), 2);
    assert_eq!(stored_max(&store.inner, "orders").await, 200);
    assert_eq!(generator.remaining().unwrap(), 99);
}

#[tokio::test]
async fn sequential_ids_are_unique_and_increasing() {
    let generator = HiLoGenerator::new("orders", 7, Arc::new(MemoryStore::new())).unwrap();

    let ids = generator.next_ids(100).await.unwrap();
    assert_eq!(ids, (1..=100).collect::<Vec<_>>());
}

#[tokio::test]
async fn fresh_instance_continues_after_stored_max() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_if_absent(CounterRecord::new("orders", 500).write_entity().unwrap())
        .await
        .unwrap();
    let generator = HiLoGenerator::new("orders", 50, Arc::clone(&store)).unwrap();

    let ids = generator.next_ids(50).await.unwrap();
    assert_eq!(ids, (501..=550).collect::<Vec<_>>());
    assert_eq!(stored_max(&*store, "orders").await, 550);
}

#[tokio::test]
async fn restarted_process_never_reissues() {
    let store = Arc::new(MemoryStore::new());

    let first = HiLoGenerator::new("orders", 10, Arc::clone(&store)).unwrap();
    let before = first.next_ids(3).await.unwrap();
    drop(first);

    let second = HiLoGenerator::new("orders", 10, Arc::clone(&store)).unwrap();
    let after = second.next_id().await.unwrap();

    assert_eq!(before, vec![1, 2, 3]);
    // The unused tail of the first chunk is skipped, never reused.
    assert_eq!(after, 11);
}

#[tokio::test]
async fn contention_fails_after_bounded_attempts() {
    let store = Arc::new(ConflictingStore::default());
    let generator = HiLoGenerator::new("orders", 25, Arc::clone(&store)).unwrap();

    let err = generator.next_id().await.unwrap_err();
    assert!(err.is_contention());
    let message = err.to_string();
    assert!(message.contains("orders") && message.contains("chunk_size=25"));
    assert_eq!(
        store.writes.load(core::sync::atomic::Ordering::SeqCst),
        MAX_RESERVE_ATTEMPTS as usize
    );
    assert_eq!(generator.remaining().unwrap(), 0);

    // The caller may retry at a higher level; each call gets a fresh budget.
    assert!(generator.next_id().await.unwrap_err().is_contention());
    assert_eq!(
        store.writes.load(core::sync::atomic::Ordering::SeqCst),
        2 * MAX_RESERVE_ATTEMPTS as usize
    );
}

#[tokio::test]
async fn store_failure_propagates_without_state_change() {
    let store = Arc::new(UnavailableStore::default());
    let generator = HiLoGenerator::new("orders", 25, Arc::clone(&store)).unwrap();

    let err = generator.next_id().await.unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Unavailable(_))));
    assert_eq!(store.gets.load(core::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(generator.remaining().unwrap(), 0);

    assert!(generator.next_id().await.is_err());
    assert_eq!(store.gets.load(core::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn timed_out_reservation_releases_the_permit() {
    let store = Arc::new(TimeoutStore::new(StallingStore, Duration::from_millis(100)));
    let generator = HiLoGenerator::new("orders", 25, store).unwrap();

    for _ in 0..2 {
        let err = generator.next_id().await.unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Timeout)));
    }
    assert_eq!(generator.remaining().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_caller_releases_the_permit() {
    let generator = Arc::new(HiLoGenerator::new("orders", 25, Arc::new(StallingStore)).unwrap());

    let abandoned = tokio::time::timeout(Duration::from_millis(10), generator.next_id()).await;
    assert!(abandoned.is_err());

    // A second caller can still take the permit instead of deadlocking.
    let retried = tokio::time::timeout(Duration::from_millis(10), generator.next_id()).await;
    assert!(retried.is_err());
    assert_eq!(generator.remaining().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_callers_share_one_reservation() {
    let store = Arc::new(CountingStore::new());
    let generator = Arc::new(HiLoGenerator::new("orders", 100, Arc::clone(&store)).unwrap());

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let generator = Arc::clone(&generator);
            tokio::spawn(async move { generator.next_id().await })
        })
        .collect();

    let mut ids: Vec<u64> = try_join_all(tasks)
        .await
        .unwrap()
        .into_iter()
        .map(Result::unwrap)
        .collect();
    ids.sort_unstable();

    assert_eq!(ids, (1..=50).collect::<Vec<_>>());
    assert_eq!(store.writes(), 1, "exactly one reservation reached the store");
    assert_eq!(store.gets(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn single_flight_reserves_one_chunk_per_exhaustion() {
    let store = Arc::new(CountingStore::new());
    let generator = Arc::new(HiLoGenerator::new("orders", 10, Arc::clone(&store)).unwrap());

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let generator = Arc::clone(&generator);
            tokio::spawn(async move { generator.next_id().await })
        })
        .collect();

    let results = try_join_all(tasks).await.unwrap();
    let ids: HashSet<u64> = results.into_iter().map(Result::unwrap).collect();

    assert_eq!(ids.len(), 50, "duplicate ids issued");
    assert_eq!(ids, (1..=50).collect::<HashSet<_>>());
    // ceil(50 / 10) reservations, none wasted.
    assert_eq!(store.writes(), 5);
    assert_eq!(store.gets(), 5);
    assert_eq!(stored_max(&store.inner, "orders").await, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn each_caller_observes_increasing_ids() {
    let generator = Arc::new(HiLoGenerator::new("orders", 16, Arc::new(MemoryStore::new())).unwrap());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let generator = Arc::clone(&generator);
            tokio::spawn(async move { generator.next_ids(200).await })
        })
        .collect();

    let per_task: Vec<Vec<u64>> = try_join_all(tasks)
        .await
        .unwrap()
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let mut all = HashSet::new();
    for ids in &per_task {
        assert_strictly_increasing(ids);
        for id in ids {
            assert!(all.insert(*id), "duplicate id {id}");
        }
    }
    assert_eq!(all, (1..=1600).collect::<HashSet<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn instances_sharing_a_store_never_overlap() {
    const INSTANCES: usize = 3;
    const CHUNK: u64 = 50;
    const IDS_PER_INSTANCE: usize = 150;

    // Three injected conflicts on top of the races themselves. Every lost race
    // is paid for by another instance's successful write, and the others make
    // six writes in total, so no instance can lose ten times in a row.
    let store = Arc::new(FlakyStore::new(MemoryStore::new(), 3));

    let tasks: Vec<_> = (0..INSTANCES)
        .map(|_| {
            // A separate generator per instance stands in for a separate
            // process: no shared range, no shared permit.
            let generator = HiLoGenerator::new("orders", CHUNK, Arc::clone(&store)).unwrap();
            tokio::spawn(async move { generator.next_ids(IDS_PER_INSTANCE).await })
        })
        .collect();

    let per_instance: Vec<Vec<u64>> = try_join_all(tasks)
        .await
        .unwrap()
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let mut owner_of_chunk: HashMap<u64, usize> = HashMap::new();
    let mut all = HashSet::new();
    for (instance, ids) in per_instance.iter().enumerate() {
        assert_strictly_increasing(ids);
        for id in ids {
            assert!(all.insert(*id), "id {id} issued twice");
            let chunk = (id - 1) / CHUNK;
            let owner = *owner_of_chunk.entry(chunk).or_insert(instance);
            assert_eq!(owner, instance, "chunk {chunk} claimed by two instances");
        }
    }

    let total = (INSTANCES * IDS_PER_INSTANCE) as u64;
    assert_eq!(all, (1..=total).collect::<HashSet<_>>());
    assert_eq!(stored_max(&store.inner, "orders").await, total);
}
