//! Location administration.

use crate::retry::{retry_with_predicate, RetryPolicy};
use exam_seating_core::capacity::PriorityList;
use exam_seating_core::store::{SeatStore, StoreError};
use exam_seating_core::types::{Location, LocationId, OfferingId};
use std::sync::Arc;

/// Changes locations and their attachment to offerings.
///
/// Capacity rules live in the store: it refuses a capacity below any
/// offering's occupancy and deleting an occupied location.
#[derive(Clone)]
pub struct LocationAdmin {
    store: Arc<dyn SeatStore>,
    retry: RetryPolicy,
}

impl LocationAdmin {
    /// Creates an admin service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SeatStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the lock-timeout retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Priority list of an offering, read without locks.
    ///
    /// # Errors
    ///
    /// Any store failure.
    pub async fn priority_list(&self, offering_id: OfferingId) -> Result<PriorityList, StoreError> {
        self.store.priority_list(offering_id).await
    }

    /// Sets the total capacity of a location.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when `capacity` is zero or below the
    /// occupancy of any offering using the location;
    /// [`StoreError::NotFound`] for an unknown location.
    #[tracing::instrument(skip(self))]
    pub async fn set_capacity(
        &self,
        location_id: LocationId,
        capacity: u32,
    ) -> Result<Location, StoreError> {
        let location = retry_with_predicate(
            self.retry.clone(),
            || async {
                let mut tx = self.store.begin().await?;
                let location = tx.set_capacity(location_id, capacity).await?;
                tx.commit().await?;
                Ok::<_, StoreError>(location)
            },
            StoreError::is_retryable,
        )
        .await?;
        tracing::info!(capacity, "Location capacity changed");
        Ok(location)
    }

    /// Deletes a location that no offering has students at.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when occupied, [`StoreError::NotFound`] for
    /// an unknown location.
    #[tracing::instrument(skip(self))]
    pub async fn delete_location(&self, location_id: LocationId) -> Result<(), StoreError> {
        retry_with_predicate(
            self.retry.clone(),
            || async {
                let mut tx = self.store.begin().await?;
                tx.delete_location(location_id).await?;
                tx.commit().await
            },
            StoreError::is_retryable,
        )
        .await?;
        tracing::info!("Location deleted");
        Ok(())
    }

    /// Makes a location available to an offering at `rank`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown offering or location,
    /// [`StoreError::UniqueViolation`] if already attached.
    #[tracing::instrument(skip(self))]
    pub async fn attach_location(
        &self,
        offering_id: OfferingId,
        location_id: LocationId,
        rank: u32,
    ) -> Result<(), StoreError> {
        let mut tx = self.store.begin().await?;
        tx.attach_location(offering_id, location_id, rank).await?;
        tx.commit().await
    }
}
