//! # Exam Seating Testing
//!
//! Testing utilities for the exam seating workspace.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - A Given-When-Then harness for reducers
//! - An in-memory [`SeatStore`](exam_seating_core::store::SeatStore)
//! - Catalog and signed-notice fixtures
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use exam_seating_testing::{fixtures::CatalogFixture, InMemorySeatStore};
//!
//! #[tokio::test]
//! async fn test_allocation() {
//!     let store = InMemorySeatStore::new();
//!     let catalog = CatalogFixture::new(&[1, 1]);
//!     catalog.seed(&store).await.unwrap();
//!     // ...
//! }
//! ```

use chrono::{DateTime, Utc};
use exam_seating_core::environment::Clock;

pub mod fixtures;
mod reducer_test;
pub mod store;

pub use reducer_test::{assertions, ReducerTest};
pub use store::InMemorySeatStore;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use exam_seating_testing::mocks::FixedClock;
    /// use exam_seating_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that tests can move forward, e.g. past a pending hold.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time.lock().map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Test helpers and utilities
pub mod helpers {
    /// Installs a test-friendly tracing subscriber once per process.
    ///
    /// Honors `RUST_LOG`; later calls are no-ops.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Any gateway status code, biased toward the documented ones.
    pub fn status_code() -> impl Strategy<Value = i32> {
        prop_oneof![
            4 => prop::sample::select(vec![2, 0, -1, -2, -3]),
            1 => any::<i32>(),
        ]
    }

    /// Capacities for a small set of ranked locations.
    pub fn capacities() -> impl Strategy<Value = Vec<u32>> {
        prop::collection::vec(1u32..4, 1..5)
    }
}

// Re-export commonly used items
pub use mocks::{test_clock, FixedClock, ManualClock};
