//! Storage abstraction for seats, registrations and the payment ledger.
//!
//! A [`SeatStore`] hands out [`SeatTransaction`]s. Every engine operation
//! (allocate, reschedule, apply a notice, expire a hold) runs inside one
//! transaction: either everything it wrote is committed, or nothing is.
//!
//! # Locking contract
//!
//! - [`SeatTransaction::lock_priority_list`] locks every (offering, location)
//!   row of the offering, in rank order, until the transaction ends.
//! - [`SeatTransaction::lock_registration`] locks one registration row.
//! - A lock that cannot be acquired within the store's configured bound
//!   fails with [`StoreError::LockTimeout`]; the caller may retry.
//!
//! Dropping a transaction without calling [`SeatTransaction::commit`] rolls
//! it back.
//!
//! Methods return boxed futures so both traits stay dyn-compatible.

use crate::capacity::{CapacityError, PriorityList};
use crate::types::{
    Exam, ExamId, Location, LocationId, NotificationRequest, Offering, OfferingId, PaymentNotice,
    Registration, RegistrationId, RevenueEntry, RevenueLedger, StudentId,
};
use crate::verification::NoticeAuditEntry;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row lock could not be acquired in time, or the database aborted the
    /// transaction to break a deadlock or serialization conflict
    #[error("lock timeout")]
    LockTimeout,

    /// A uniqueness constraint rejected the write
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A referenced row does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Database or connection error
    #[error("database error: {0}")]
    Database(String),

    /// A location administration rule was violated
    #[error(transparent)]
    Conflict(#[from] CapacityError),
}

impl StoreError {
    /// Whether retrying the whole transaction may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout)
    }
}

/// Entry point to the store.
pub trait SeatStore: Send + Sync {
    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if no connection is available and
    /// [`StoreError::LockTimeout`] if the store itself is contended.
    fn begin(&self) -> StoreFuture<'_, Box<dyn SeatTransaction>>;

    /// Loads a registration without locking it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn registration(&self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>>;

    /// Unlocked priority-list snapshot, for display.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn priority_list(&self, offering_id: OfferingId) -> StoreFuture<'_, PriorityList>;

    /// Appends an audit entry in its own transaction.
    ///
    /// Used for notices rejected before the apply phase starts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on failure.
    fn record_audit(&self, entry: NoticeAuditEntry) -> StoreFuture<'_, ()>;

    /// Checks that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] when it is not.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

/// One open transaction.
#[allow(clippy::missing_errors_doc)]
pub trait SeatTransaction: Send {
    // ========== Catalog ==========

    /// Loads an offering.
    fn offering(&mut self, id: OfferingId) -> StoreFuture<'_, Option<Offering>>;

    /// Loads an exam.
    fn exam(&mut self, id: ExamId) -> StoreFuture<'_, Option<Exam>>;

    /// Inserts a location.
    fn insert_location<'a>(&'a mut self, location: &'a Location) -> StoreFuture<'a, ()>;

    /// Inserts an exam.
    fn insert_exam<'a>(&'a mut self, exam: &'a Exam) -> StoreFuture<'a, ()>;

    /// Inserts an offering.
    fn insert_offering<'a>(&'a mut self, offering: &'a Offering) -> StoreFuture<'a, ()>;

    /// Attaches a location to an offering with zero occupancy.
    fn attach_location(
        &mut self,
        offering_id: OfferingId,
        location_id: LocationId,
        rank: u32,
    ) -> StoreFuture<'_, ()>;

    // ========== Capacity ==========

    /// Locks and returns the offering's priority list.
    fn lock_priority_list(&mut self, offering_id: OfferingId) -> StoreFuture<'_, PriorityList>;

    /// Takes one seat if `occupancy < capacity`; returns whether it did.
    fn reserve(&mut self, offering_id: OfferingId, location_id: LocationId) -> StoreFuture<'_, bool>;

    /// Gives back one seat, never going below zero.
    fn release(&mut self, offering_id: OfferingId, location_id: LocationId) -> StoreFuture<'_, ()>;

    /// Changes a location's capacity; refuses to go below any occupancy.
    fn set_capacity(&mut self, location_id: LocationId, capacity: u32) -> StoreFuture<'_, Location>;

    /// Deletes a location that holds no seats.
    fn delete_location(&mut self, location_id: LocationId) -> StoreFuture<'_, ()>;

    // ========== Registrations ==========

    /// Finds the registration of a student on an offering.
    fn find_registration(
        &mut self,
        student_id: StudentId,
        offering_id: OfferingId,
    ) -> StoreFuture<'_, Option<Registration>>;

    /// Loads and locks a registration.
    fn lock_registration(&mut self, id: RegistrationId) -> StoreFuture<'_, Option<Registration>>;

    /// Next value of the index-number sequence.
    fn next_index_sequence(&mut self) -> StoreFuture<'_, u64>;

    /// Inserts a registration; a second one for (student, offering) fails with
    /// [`StoreError::UniqueViolation`].
    fn insert_registration<'a>(&'a mut self, registration: &'a Registration) -> StoreFuture<'a, ()>;

    /// Overwrites status, placement and timestamps of a registration.
    fn update_registration<'a>(&'a mut self, registration: &'a Registration) -> StoreFuture<'a, ()>;

    /// Pending registrations created before `cutoff`.
    fn pending_older_than(&mut self, cutoff: DateTime<Utc>) -> StoreFuture<'_, Vec<RegistrationId>>;

    /// Marks upcoming offerings that start before `now` as completed.
    fn complete_past_offerings(&mut self, now: DateTime<Utc>) -> StoreFuture<'_, u64>;

    // ========== Payments ==========

    /// Stores a verified notice; returns `false` if the same
    /// (registration, transaction id, status code) was already stored.
    fn insert_payment_notice<'a>(&'a mut self, notice: &'a PaymentNotice) -> StoreFuture<'a, bool>;

    /// Revenue entries booked for a registration.
    fn revenue_ledger(&mut self, registration_id: RegistrationId) -> StoreFuture<'_, RevenueLedger>;

    /// Appends a revenue entry; returns `false` if (registration, status)
    /// already exists.
    fn insert_revenue<'a>(&'a mut self, entry: &'a RevenueEntry) -> StoreFuture<'a, bool>;

    /// Writes a notification request to the outbox.
    fn enqueue_notification<'a>(
        &'a mut self,
        request: &'a NotificationRequest,
    ) -> StoreFuture<'a, ()>;

    /// Appends an audit entry as part of this transaction.
    fn record_audit<'a>(&'a mut self, entry: &'a NoticeAuditEntry) -> StoreFuture<'a, ()>;

    // ========== Completion ==========

    /// Commits all writes.
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()>;
}
