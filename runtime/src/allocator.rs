//! Seat allocation and reschedule.
//!
//! Each attempt is one store transaction: offering check, existence check,
//! first-fit reservation, registration insert and outbox write either all
//! commit or none do. Lock timeouts are retried with backoff; every retry
//! re-runs the existence check first.

use crate::metrics::{AllocationMetrics, SeatMetrics};
use crate::retry::{retry_with_predicate, RetryPolicy};
use exam_seating_core::allocation::{self, AllocationError, DEFAULT_INDEX_PREFIX};
use exam_seating_core::environment::Clock;
use exam_seating_core::store::{SeatStore, SeatTransaction, StoreError};
use exam_seating_core::types::{
    ExamId, IndexNumber, LocationId, NotificationRequest, OfferingId, Registration,
    RegistrationId, StudentId,
};
use std::sync::Arc;
use std::time::Instant;

/// Locks the offering's priority list and takes the first free seat.
///
/// Returns `None` when every location is full.
///
/// # Errors
///
/// Propagates store failures, including [`StoreError::LockTimeout`].
pub async fn reserve_first_fit(
    tx: &mut dyn SeatTransaction,
    offering_id: OfferingId,
) -> Result<Option<LocationId>, StoreError> {
    let list = tx.lock_priority_list(offering_id).await?;
    for slot in list.candidates() {
        // With the rows locked this succeeds on the first candidate; the loop
        // covers stores that cannot lock.
        if tx.reserve(offering_id, slot.location_id).await? {
            return Ok(Some(slot.location_id));
        }
    }
    Ok(None)
}

async fn exam_title(tx: &mut dyn SeatTransaction, exam_id: ExamId) -> Result<String, StoreError> {
    Ok(tx
        .exam(exam_id)
        .await?
        .map_or_else(|| "your exam".to_string(), |exam| exam.title))
}

/// Places students on seats.
#[derive(Clone)]
pub struct Allocator {
    store: Arc<dyn SeatStore>,
    clock: Arc<dyn Clock>,
    index_prefix: String,
    retry: RetryPolicy,
}

impl Allocator {
    /// Creates an allocator with the default index prefix and retry policy.
    #[must_use]
    pub fn new(store: Arc<dyn SeatStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the prefix of generated index numbers.
    #[must_use]
    pub fn with_index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = prefix.into();
        self
    }

    /// Sets the lock-timeout retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reserves a seat for `student_id` on `offering_id` and creates a
    /// `pending` registration.
    ///
    /// # Errors
    ///
    /// - [`AllocationError::UnknownOffering`] / [`AllocationError::OfferingUnavailable`]
    /// - [`AllocationError::DuplicateRegistration`] if the student is already registered
    /// - [`AllocationError::CapacityExhausted`] if every location is full
    /// - [`AllocationError::LockTimeout`] once retries are exhausted
    #[tracing::instrument(skip(self), fields(%student_id, %offering_id))]
    pub async fn allocate(
        &self,
        student_id: StudentId,
        offering_id: OfferingId,
    ) -> Result<Registration, AllocationError> {
        let started = Instant::now();
        let result = retry_with_predicate(
            self.retry.clone(),
            || self.try_allocate(student_id, offering_id),
            AllocationError::is_retryable,
        )
        .await;

        match &result {
            Ok(registration) => {
                AllocationMetrics::record("allocated", started.elapsed());
                tracing::info!(
                    registration_id = %registration.id,
                    index_number = %registration.index_number,
                    location_id = ?registration.assigned_location,
                    "Seat allocated"
                );
            }
            Err(error) => {
                AllocationMetrics::record(error.outcome(), started.elapsed());
                tracing::info!(outcome = error.outcome(), %error, "Allocation refused");
            }
        }
        result
    }

    async fn try_allocate(
        &self,
        student_id: StudentId,
        offering_id: OfferingId,
    ) -> Result<Registration, AllocationError> {
        let mut tx = self.store.begin().await?;

        let offering = allocation::check_offering(offering_id, tx.offering(offering_id).await?)?;
        if tx.find_registration(student_id, offering_id).await?.is_some() {
            return Err(AllocationError::DuplicateRegistration);
        }

        let location_id = reserve_first_fit(tx.as_mut(), offering_id)
            .await?
            .ok_or(AllocationError::CapacityExhausted)?;

        let now = self.clock.now();
        let sequence = tx.next_index_sequence().await?;
        let index_number = IndexNumber::generate(&self.index_prefix, sequence, now.date_naive());
        let registration =
            allocation::new_registration(student_id, &offering, location_id, index_number, now);
        tx.insert_registration(&registration).await?;

        let title = exam_title(tx.as_mut(), offering.exam_id).await?;
        let notice = NotificationRequest::for_registration(
            &registration,
            "Registration received",
            format!(
                "Your seat for {title} is reserved. Index number: {}. Complete the payment to confirm it.",
                registration.index_number
            ),
            now,
        );
        tx.enqueue_notification(&notice).await?;

        tx.commit().await?;
        Ok(registration)
    }

    /// Moves a `pending` or `registered` registration to another offering of
    /// the same exam, taking a seat there before giving back the old one.
    ///
    /// # Errors
    ///
    /// - [`AllocationError::UnknownRegistration`]
    /// - [`AllocationError::UnknownOffering`] / [`AllocationError::OfferingUnavailable`]
    /// - [`AllocationError::NotReschedulable`] for rejected registrations,
    ///   other exams or the current offering
    /// - [`AllocationError::DuplicateRegistration`] if the student already
    ///   holds a registration there
    /// - [`AllocationError::CapacityExhausted`] if the target is full
    #[tracing::instrument(skip(self), fields(%registration_id, %target_offering_id))]
    pub async fn reschedule(
        &self,
        registration_id: RegistrationId,
        target_offering_id: OfferingId,
    ) -> Result<Registration, AllocationError> {
        let result = retry_with_predicate(
            self.retry.clone(),
            || self.try_reschedule(registration_id, target_offering_id),
            AllocationError::is_retryable,
        )
        .await;

        match &result {
            Ok(registration) => {
                SeatMetrics::record_release();
                tracing::info!(
                    from = ?registration.rescheduled_from,
                    location_id = ?registration.assigned_location,
                    "Registration rescheduled"
                );
            }
            Err(error) => tracing::info!(outcome = error.outcome(), %error, "Reschedule refused"),
        }
        result
    }

    async fn try_reschedule(
        &self,
        registration_id: RegistrationId,
        target_offering_id: OfferingId,
    ) -> Result<Registration, AllocationError> {
        let mut tx = self.store.begin().await?;

        let mut registration = tx
            .lock_registration(registration_id)
            .await?
            .ok_or_else(|| AllocationError::UnknownRegistration(registration_id.to_string()))?;
        let target = allocation::check_offering(
            target_offering_id,
            tx.offering(target_offering_id).await?,
        )?;
        allocation::check_reschedule(&registration, &target)?;
        if tx
            .find_registration(registration.student_id, target.id)
            .await?
            .is_some()
        {
            return Err(AllocationError::DuplicateRegistration);
        }

        let location_id = reserve_first_fit(tx.as_mut(), target.id)
            .await?
            .ok_or(AllocationError::CapacityExhausted)?;
        if let Some((offering_id, old_location)) = registration.held_seat() {
            tx.release(offering_id, old_location).await?;
        }

        let now = self.clock.now();
        allocation::apply_reschedule(&mut registration, &target, location_id, now);
        tx.update_registration(&registration).await?;

        let title = exam_title(tx.as_mut(), target.exam_id).await?;
        let notice = NotificationRequest::for_registration(
            &registration,
            "Registration rescheduled",
            format!(
                "Your registration {} for {title} moved to the sitting on {}.",
                registration.index_number,
                target.starts_at.format("%Y-%m-%d %H:%M UTC")
            ),
            now,
        );
        tx.enqueue_notification(&notice).await?;

        tx.commit().await?;
        Ok(registration)
    }
}
