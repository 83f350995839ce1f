//! `PostgreSQL` seat store for exam seating.
//!
//! Implements [`SeatStore`](exam_seating_core::store::SeatStore) on `sqlx`
//! with runtime-checked queries, so the crate builds without a live
//! database. Schema changes ship as embedded migrations under
//! `migrations/`, applied by [`PostgresSeatStore::migrate`].
//!
//! # Example
//!
//! ```ignore
//! use exam_seating_postgres::PostgresSeatStore;
//! use std::time::Duration;
//!
//! let store = PostgresSeatStore::from_pool(pool).with_lock_timeout(Duration::from_millis(500));
//! store.migrate().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
mod store;

pub use store::{PostgresSeatStore, PostgresSeatTransaction, DEFAULT_LOCK_TIMEOUT};
