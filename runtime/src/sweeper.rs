//! Periodic housekeeping.
//!
//! - Offerings whose start time has passed move to `completed`.
//! - `pending` registrations older than the hold are rejected and their
//!   seats released, one transaction per registration.

use crate::lifecycle::{load_state, EffectSummary, LifecycleController};
use crate::retry::{retry_with_predicate, RetryPolicy};
use exam_seating_core::environment::Clock;
use exam_seating_core::lifecycle::LifecycleAction;
use exam_seating_core::store::{SeatStore, StoreError};
use exam_seating_core::types::{RegistrationId, RegistrationStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Default time a `pending` registration may hold its seat, in hours.
pub const DEFAULT_PENDING_HOLD_HOURS: i64 = 48;

/// Longest accepted pending hold, in hours (one year).
pub const MAX_PENDING_HOLD_HOURS: i64 = 24 * 365;

/// Shortest interval [`Sweeper::run`] will tick at.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Result of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Offerings moved to `completed`
    pub offerings_completed: u64,
    /// Pending registrations rejected for lack of payment
    pub registrations_expired: usize,
}

/// Runs the housekeeping jobs.
pub struct Sweeper {
    store: Arc<dyn SeatStore>,
    controller: LifecycleController,
    clock: Arc<dyn Clock>,
    pending_hold: chrono::Duration,
    retry: RetryPolicy,
}

impl Sweeper {
    /// Creates a sweeper with the default pending hold.
    #[must_use]
    pub fn new(
        store: Arc<dyn SeatStore>,
        controller: LifecycleController,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            controller,
            clock,
            pending_hold: chrono::Duration::hours(DEFAULT_PENDING_HOLD_HOURS),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets how long a `pending` registration may hold its seat.
    #[must_use]
    pub const fn with_pending_hold(mut self, hold: chrono::Duration) -> Self {
        self.pending_hold = hold;
        self
    }

    /// Sets the lock-timeout retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Marks every upcoming offering that has started as `completed`.
    ///
    /// # Errors
    ///
    /// Any store failure.
    pub async fn complete_offerings(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();
        retry_with_predicate(
            self.retry.clone(),
            || async {
                let mut tx = self.store.begin().await?;
                let completed = tx.complete_past_offerings(now).await?;
                tx.commit().await?;
                Ok::<_, StoreError>(completed)
            },
            StoreError::is_retryable,
        )
        .await
    }

    /// Rejects `pending` registrations older than the hold.
    ///
    /// A registration that fails is logged and left for the next sweep.
    ///
    /// # Errors
    ///
    /// Store failure while listing candidates.
    pub async fn expire_pending(&self) -> Result<usize, StoreError> {
        let Some(cutoff) = self.clock.now().checked_sub_signed(self.pending_hold) else {
            tracing::warn!(hold = %self.pending_hold, "Pending hold out of range; nothing expired");
            return Ok(0);
        };
        let candidates = {
            let mut tx = self.store.begin().await?;
            tx.pending_older_than(cutoff).await?
        };

        let mut expired = 0;
        for registration_id in candidates {
            let result = retry_with_predicate(
                self.retry.clone(),
                || self.expire_one(registration_id),
                StoreError::is_retryable,
            )
            .await;
            match result {
                Ok(Some(summary)) => {
                    summary.record_metrics();
                    expired += 1;
                    tracing::info!(%registration_id, "Expired unpaid registration");
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(%registration_id, %error, "Failed to expire registration");
                }
            }
        }
        Ok(expired)
    }

    async fn expire_one(
        &self,
        registration_id: RegistrationId,
    ) -> Result<Option<EffectSummary>, StoreError> {
        let mut tx = self.store.begin().await?;
        let Some(registration) = tx.lock_registration(registration_id).await? else {
            return Ok(None);
        };
        // A notice may have landed since the listing.
        if registration.status != RegistrationStatus::Pending {
            return Ok(None);
        }

        let mut state = load_state(tx.as_mut(), registration).await?;
        let summary = self
            .controller
            .run(
                tx.as_mut(),
                &mut state,
                LifecycleAction::Expire {
                    hold: self.pending_hold,
                },
            )
            .await?;
        if state.registration.status != RegistrationStatus::Rejected {
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(summary))
    }

    /// Runs both jobs once.
    ///
    /// # Errors
    ///
    /// The first store failure.
    pub async fn run_once(&self) -> Result<SweepReport, StoreError> {
        Ok(SweepReport {
            offerings_completed: self.complete_offerings().await?,
            registrations_expired: self.expire_pending().await?,
        })
    }

    /// Sweeps every `interval` until `shutdown` turns `true`.
    ///
    /// Intervals below [`MIN_SWEEP_INTERVAL`] are raised to it.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        if interval < MIN_SWEEP_INTERVAL {
            tracing::warn!(?interval, "Sweep interval too short; using the minimum");
        }
        let mut ticker = tokio::time::interval(interval.max(MIN_SWEEP_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) => tracing::debug!(?report, "Sweep finished"),
                        Err(error) => tracing::error!(%error, "Sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Sweeper stopped");
                        return;
                    }
                }
            }
        }
    }
}
