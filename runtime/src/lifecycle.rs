//! Effect execution for the registration lifecycle.
//!
//! The reducer in `exam_seating_core::lifecycle` decides; this module does
//! the writes. Every effect runs against the caller's transaction, so a
//! status change, its seat release, its revenue entry and its notification
//! commit together.

use crate::allocator::reserve_first_fit;
use exam_seating_core::effect::Effect;
use exam_seating_core::lifecycle::{
    LifecycleAction, LifecycleEnvironment, LifecycleReducer, RegistrationState,
};
use exam_seating_core::reducer::Reducer;
use exam_seating_core::store::{SeatTransaction, StoreError};
use exam_seating_core::types::{Registration, RevenueStatus};
use std::collections::VecDeque;

/// Writes performed while running an action.
///
/// Metrics are recorded from this only after the transaction commits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EffectSummary {
    /// Seats given back
    pub seats_released: u32,
    /// Gross of newly booked `completed` revenue, in cents
    pub revenue_cents: u64,
    /// Notifications queued
    pub notifications: u32,
}

impl EffectSummary {
    /// Records the summary on the global metrics recorder.
    pub fn record_metrics(&self) {
        for _ in 0..self.seats_released {
            crate::metrics::SeatMetrics::record_release();
        }
        if self.revenue_cents > 0 {
            crate::metrics::NoticeMetrics::record_revenue(self.revenue_cents);
        }
    }
}

/// Loads the lifecycle state for an already locked registration.
///
/// # Errors
///
/// [`StoreError::NotFound`] if the registration's exam is gone, or any
/// store failure.
pub async fn load_state(
    tx: &mut dyn SeatTransaction,
    registration: Registration,
) -> Result<RegistrationState, StoreError> {
    let exam = tx
        .exam(registration.exam_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("exam {}", registration.exam_id)))?;
    let ledger = tx.revenue_ledger(registration.id).await?;
    Ok(RegistrationState::new(registration, exam, ledger))
}

/// Runs lifecycle actions and executes their effects.
#[derive(Clone)]
pub struct LifecycleController {
    reducer: LifecycleReducer,
    env: LifecycleEnvironment,
}

impl LifecycleController {
    /// Creates a controller over `env`.
    #[must_use]
    pub const fn new(env: LifecycleEnvironment) -> Self {
        Self {
            reducer: LifecycleReducer::new(),
            env,
        }
    }

    /// The reducer environment.
    #[must_use]
    pub const fn environment(&self) -> &LifecycleEnvironment {
        &self.env
    }

    /// Reduces `action` and executes the resulting effects in `tx`.
    ///
    /// Effects that produce a follow-up action (seat reacquisition) are fed
    /// back until nothing is left. The caller commits.
    ///
    /// # Errors
    ///
    /// Any store failure; the caller should drop the transaction.
    pub async fn run(
        &self,
        tx: &mut dyn SeatTransaction,
        state: &mut RegistrationState,
        action: LifecycleAction,
    ) -> Result<EffectSummary, StoreError> {
        let mut summary = EffectSummary::default();
        let mut queue = VecDeque::from([action]);

        while let Some(action) = queue.pop_front() {
            let effects = self.reducer.reduce(state, action, &self.env);
            for effect in effects {
                if let Some(feedback) = Self::execute(tx, effect, &mut summary).await? {
                    queue.push_back(feedback);
                }
            }
        }

        Ok(summary)
    }

    async fn execute(
        tx: &mut dyn SeatTransaction,
        effect: Effect,
        summary: &mut EffectSummary,
    ) -> Result<Option<LifecycleAction>, StoreError> {
        match effect {
            Effect::None => {}
            Effect::ReleaseSeat {
                offering_id,
                location_id,
            } => {
                tx.release(offering_id, location_id).await?;
                summary.seats_released += 1;
            }
            Effect::ReacquireSeat { offering_id, notice } => {
                let open = tx
                    .offering(offering_id)
                    .await?
                    .is_some_and(|offering| offering.accepts_registrations());
                if !open {
                    tracing::warn!(%offering_id, "Offering closed; registration not reinstated");
                    return Ok(Some(LifecycleAction::SeatUnavailable));
                }
                let feedback = match reserve_first_fit(tx, offering_id).await? {
                    Some(location_id) => LifecycleAction::SeatReacquired { location_id, notice },
                    None => {
                        tracing::warn!(%offering_id, "No seat left to reinstate registration");
                        LifecycleAction::SeatUnavailable
                    }
                };
                return Ok(Some(feedback));
            }
            Effect::PersistRegistration(registration) => {
                tx.update_registration(&registration).await?;
            }
            Effect::RecordRevenue(entry) => {
                if tx.insert_revenue(&entry).await? {
                    if entry.status == RevenueStatus::Completed {
                        summary.revenue_cents += entry.gross.cents();
                    }
                } else {
                    tracing::debug!(
                        registration_id = %entry.registration_id,
                        status = entry.status.as_str(),
                        "Revenue entry already booked"
                    );
                }
            }
            Effect::Notify(request) => {
                tx.enqueue_notification(&request).await?;
                summary.notifications += 1;
            }
        }
        Ok(None)
    }
}
