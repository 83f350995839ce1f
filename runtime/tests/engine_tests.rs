//! End-to-end tests of the runtime services over the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use exam_seating_core::allocation::AllocationError;
use exam_seating_core::environment::Clock;
use exam_seating_core::lifecycle::NoticeOutcome;
use exam_seating_core::store::SeatStore;
use exam_seating_core::types::{OfferingId, RegistrationStatus, StudentId};
use exam_seating_runtime::{Engine, EngineConfig, RetryPolicy};
use exam_seating_testing::fixtures::{signed_notice, test_verifier, CatalogFixture, TEST_FEE};
use exam_seating_testing::helpers::init_test_tracing;
use exam_seating_testing::{test_clock, InMemorySeatStore, ManualClock};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

fn engine(store: &InMemorySeatStore, clock: Arc<dyn Clock>) -> Engine {
    let config = EngineConfig {
        retry: RetryPolicy::builder()
            .max_retries(10)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(20))
            .build(),
        ..EngineConfig::default()
    };
    Engine::new(Arc::new(store.clone()), clock, test_verifier(), config)
}

async fn allocate_many(
    engine: &Engine,
    offering_id: OfferingId,
    students: usize,
) -> Vec<Result<exam_seating_core::types::Registration, AllocationError>> {
    let tasks = (0..students).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.allocator().allocate(StudentId::new(), offering_id).await })
    });
    join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.expect("allocation task panicked"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_students_two_single_seats() {
    init_test_tracing();
    let store = InMemorySeatStore::new();
    let catalog = CatalogFixture::new(&[1, 1]);
    catalog.seed(&store).await.unwrap();
    let engine = engine(&store, Arc::new(test_clock()));

    let results = allocate_many(&engine, catalog.offering.id, 3).await;

    let allocated: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let exhausted = results
        .iter()
        .filter(|r| matches!(r, Err(AllocationError::CapacityExhausted)))
        .count();
    assert_eq!(allocated.len(), 2);
    assert_eq!(exhausted, 1);
    assert_ne!(allocated[0].assigned_location, allocated[1].assigned_location);
    for location in &catalog.locations {
        assert_eq!(store.occupancy(catalog.offering.id, location.id).await, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rush_never_oversells() {
    let store = InMemorySeatStore::new();
    let catalog = CatalogFixture::new(&[5, 3, 2]);
    catalog.seed(&store).await.unwrap();
    let engine = engine(&store, Arc::new(test_clock()));

    let results = allocate_many(&engine, catalog.offering.id, 25).await;

    let allocated = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(allocated, 10);
    assert!(results
        .iter()
        .all(|r| r.is_ok() || matches!(r, Err(AllocationError::CapacityExhausted))));
    for location in &catalog.locations {
        assert_eq!(
            store.occupancy(catalog.offering.id, location.id).await,
            location.capacity
        );
    }

    let mut index_numbers: Vec<_> = store
        .registrations()
        .await
        .into_iter()
        .map(|r| r.index_number.as_str().to_string())
        .collect();
    index_numbers.sort();
    index_numbers.dedup();
    assert_eq!(index_numbers.len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_student_racing_gets_one_registration() {
    let store = InMemorySeatStore::new();
    let catalog = CatalogFixture::new(&[10]);
    catalog.seed(&store).await.unwrap();
    let engine = engine(&store, Arc::new(test_clock()));
    let student = StudentId::new();

    let tasks = (0..5).map(|_| {
        let engine = engine.clone();
        let offering_id = catalog.offering.id;
        tokio::spawn(async move { engine.allocator().allocate(student, offering_id).await })
    });
    let results: Vec<_> = join_all(tasks).await.into_iter().map(Result::unwrap).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(AllocationError::DuplicateRegistration))));
    assert_eq!(store.occupancy(catalog.offering.id, catalog.locations[0].id).await, 1);
}

#[tokio::test]
async fn registration_lifecycle_end_to_end() {
    init_test_tracing();
    let store = InMemorySeatStore::new();
    let catalog = CatalogFixture::new(&[1]);
    catalog.seed(&store).await.unwrap();
    let clock = Arc::new(ManualClock::new(test_clock().now()));
    let engine = engine(&store, clock.clone());

    // first student pays, second is turned away
    let paid = engine
        .allocator()
        .allocate(StudentId::new(), catalog.offering.id)
        .await
        .unwrap();
    let outcome = engine
        .payments()
        .process(signed_notice(paid.id, TEST_FEE, 2, "PAY-100"))
        .await;
    assert_eq!(outcome, Ok(NoticeOutcome::Applied));
    assert_eq!(
        engine
            .allocator()
            .allocate(StudentId::new(), catalog.offering.id)
            .await,
        Err(AllocationError::CapacityExhausted)
    );

    // a chargeback frees the seat for someone else
    engine
        .payments()
        .process(signed_notice(paid.id, TEST_FEE, -3, "PAY-100"))
        .await
        .unwrap();
    let late = engine
        .allocator()
        .allocate(StudentId::new(), catalog.offering.id)
        .await
        .unwrap();

    // who never pays and loses the seat after the hold
    clock.advance(chrono::Duration::hours(49));
    let report = engine.sweeper().run_once().await.unwrap();
    assert_eq!(report.registrations_expired, 1);

    let stored = engine.store().registration(late.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RegistrationStatus::Rejected);
    assert_eq!(store.occupancy(catalog.offering.id, catalog.locations[0].id).await, 0);
    assert_eq!(store.revenue_entries().await.len(), 2);
    // received, confirmed, rejected (chargeback), received, rejected (expiry)
    assert_eq!(store.notifications().await.len(), 5);
}
