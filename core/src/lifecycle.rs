//! Registration lifecycle driven by payment notices.
//!
//! ```text
//!            success                 failure / charged back
//! pending ───────────▶ registered ─────────────────────────┐
//!    │                     ▲                               ▼
//!    │ failure / expiry    │ success (seat re-acquired)  rejected
//!    └─────────────────────┼──────────────────────────────▶ │
//!                          └───────────────────────────────┘
//! ```
//!
//! [`transition`] is the pure table; [`LifecycleReducer`] applies it to a
//! loaded registration and returns the writes as [`Effect`]s. Applying the
//! same terminal notice twice yields [`Transition::Unchanged`] the second
//! time, so a seat is never released twice and revenue is never booked twice.

use crate::effect::Effect;
use crate::environment::Clock;
use crate::reducer::Reducer;
use crate::revenue;
use crate::types::{
    CommissionRate, Exam, LocationId, NotificationRequest, PaymentNotice, Registration,
    RegistrationStatus, RevenueLedger,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Gateway status codes
// ============================================================================

/// Payment status reported by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayStatus {
    /// `2`
    Success,
    /// `0`
    Pending,
    /// `-1`
    Cancelled,
    /// `-2`
    Failed,
    /// `-3`
    ChargedBack,
    /// Any other code; treated as a failure
    Unrecognized(i32),
}

impl GatewayStatus {
    /// Maps a raw gateway code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            2 => Self::Success,
            0 => Self::Pending,
            -1 => Self::Cancelled,
            -2 => Self::Failed,
            -3 => Self::ChargedBack,
            other => Self::Unrecognized(other),
        }
    }

    /// The raw gateway code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Success => 2,
            Self::Pending => 0,
            Self::Cancelled => -1,
            Self::Failed => -2,
            Self::ChargedBack => -3,
            Self::Unrecognized(code) => *code,
        }
    }

    /// Whether the status ends the payment unsuccessfully.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::Success | Self::Pending)
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Pending => f.write_str("pending"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Failed => f.write_str("failed"),
            Self::ChargedBack => f.write_str("charged_back"),
            Self::Unrecognized(code) => write!(f, "unrecognized({code})"),
        }
    }
}

impl PaymentNotice {
    /// Parsed gateway status of the notice.
    #[must_use]
    pub const fn status(&self) -> GatewayStatus {
        GatewayStatus::from_code(self.status_code)
    }
}

// ============================================================================
// Transition table
// ============================================================================

/// Errors from the transition table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// A `pending` notice arrived for a registration that is already terminal
    #[error("stale notice: registration is {current}, notice reports {status}")]
    StaleNotice {
        /// Status of the registration
        current: RegistrationStatus,
        /// Status reported by the notice
        status: GatewayStatus,
    },
}

/// What a notice does to a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// `pending → registered`: keep the seat, book revenue, notify
    Confirm,
    /// `pending → rejected`: release the seat, notify
    Reject,
    /// `registered → rejected`: release the seat, append a refund, notify
    Revoke,
    /// `rejected → registered` if a seat can be taken again
    Reinstate,
    /// Nothing changes
    Unchanged,
}

/// The registration state machine.
///
/// | current \ status | success   | pending     | any failure |
/// |------------------|-----------|-------------|-------------|
/// | pending          | Confirm   | Unchanged   | Reject      |
/// | registered       | Unchanged | StaleNotice | Revoke      |
/// | rejected         | Reinstate | StaleNotice | Unchanged   |
///
/// # Errors
///
/// [`LifecycleError::StaleNotice`] when a terminal registration receives a
/// `pending` status.
pub const fn transition(
    current: RegistrationStatus,
    status: GatewayStatus,
) -> Result<Transition, LifecycleError> {
    use GatewayStatus as G;
    use RegistrationStatus as R;

    match (current, status) {
        (R::Pending, G::Success) => Ok(Transition::Confirm),
        (R::Pending, G::Pending) | (R::Registered, G::Success) => Ok(Transition::Unchanged),
        (R::Pending, _) => Ok(Transition::Reject),
        (R::Registered | R::Rejected, G::Pending) => Err(LifecycleError::StaleNotice { current, status }),
        (R::Registered, _) => Ok(Transition::Revoke),
        (R::Rejected, G::Success) => Ok(Transition::Reinstate),
        (R::Rejected, _) => Ok(Transition::Unchanged),
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// What happened to an inbound notice; stored in the audit log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeOutcome {
    /// The registration changed status
    Applied,
    /// Accepted, no change required
    Unchanged,
    /// Same (registration, transaction, status) already processed
    Duplicate,
    /// Signature or merchant check failed
    SignatureInvalid,
    /// Order id names no registration
    UnknownRegistration,
    /// `pending` status for a terminal registration
    Stale,
    /// Success for a rejected registration, but every seat is taken or the
    /// offering no longer accepts registrations
    SeatUnavailable,
    /// A field could not be parsed
    Malformed,
    /// Verified, but the store failed or stayed locked; needs replay
    ProcessingFailed,
}

impl NoticeOutcome {
    /// Storage and metrics label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Duplicate => "duplicate",
            Self::SignatureInvalid => "signature_invalid",
            Self::UnknownRegistration => "unknown_registration",
            Self::Stale => "stale",
            Self::SeatUnavailable => "seat_unavailable",
            Self::Malformed => "malformed",
            Self::ProcessingFailed => "processing_failed",
        }
    }

    /// Parse from the storage label.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applied" => Some(Self::Applied),
            "unchanged" => Some(Self::Unchanged),
            "duplicate" => Some(Self::Duplicate),
            "signature_invalid" => Some(Self::SignatureInvalid),
            "unknown_registration" => Some(Self::UnknownRegistration),
            "stale" => Some(Self::Stale),
            "seat_unavailable" => Some(Self::SeatUnavailable),
            "malformed" => Some(Self::Malformed),
            "processing_failed" => Some(Self::ProcessingFailed),
            _ => None,
        }
    }
}

impl fmt::Display for NoticeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// State / Action / Environment
// ============================================================================

/// A registration loaded for one lifecycle step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationState {
    /// The registration, updated in place
    pub registration: Registration,
    /// Its exam (for revenue and notification text)
    pub exam: Exam,
    /// Revenue already booked for it
    pub revenue: RevenueLedger,
    /// Outcome of the last action
    pub outcome: Option<NoticeOutcome>,
    /// Error of the last action
    pub last_error: Option<LifecycleError>,
}

impl RegistrationState {
    /// Wraps a loaded registration.
    #[must_use]
    pub const fn new(registration: Registration, exam: Exam, revenue: RevenueLedger) -> Self {
        Self {
            registration,
            exam,
            revenue,
            outcome: None,
            last_error: None,
        }
    }
}

/// Inputs to the lifecycle reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    /// A verified payment notice
    ApplyPayment {
        /// The notice
        notice: Box<PaymentNotice>,
    },

    /// Release a pending registration whose hold has run out
    Expire {
        /// How long a pending registration may hold its seat
        hold: Duration,
    },

    /// Feedback: a seat was taken again for a rejected registration
    SeatReacquired {
        /// Location the seat is at
        location_id: LocationId,
        /// Notice that triggered the attempt
        notice: Box<PaymentNotice>,
    },

    /// Feedback: no seat could be taken again
    SeatUnavailable,
}

/// Dependencies of the lifecycle reducer.
#[derive(Clone)]
pub struct LifecycleEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Commission for exams without their own rate
    pub default_commission: CommissionRate,
}

impl LifecycleEnvironment {
    /// Creates a new `LifecycleEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, default_commission: CommissionRate) -> Self {
        Self {
            clock,
            default_commission,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Applies notices and expiry to a registration.
#[derive(Clone, Copy, Debug, Default)]
pub struct LifecycleReducer;

impl LifecycleReducer {
    /// Creates a new `LifecycleReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn set_status(state: &mut RegistrationState, status: RegistrationStatus, env: &LifecycleEnvironment) {
        state.registration.status = status;
        state.registration.updated_at = env.clock.now();
        state.outcome = Some(NoticeOutcome::Applied);
    }

    fn persist(state: &RegistrationState) -> Effect {
        Effect::PersistRegistration(Box::new(state.registration.clone()))
    }

    fn notify(state: &RegistrationState, title: &str, message: String, env: &LifecycleEnvironment) -> Effect {
        Effect::Notify(Box::new(NotificationRequest::for_registration(
            &state.registration,
            title,
            message,
            env.clock.now(),
        )))
    }

    fn release(state: &RegistrationState) -> Effect {
        match state.registration.assigned_location {
            Some(location_id) => Effect::ReleaseSeat {
                offering_id: state.registration.offering_id,
                location_id,
            },
            None => Effect::None,
        }
    }

    /// Marks the registration `registered` and books revenue if none exists.
    fn confirm(
        state: &mut RegistrationState,
        notice: &PaymentNotice,
        env: &LifecycleEnvironment,
    ) -> SmallVec<[Effect; 4]> {
        Self::set_status(state, RegistrationStatus::Registered, env);

        let mut effects: SmallVec<[Effect; 4]> = smallvec![Self::persist(state)];
        if state.revenue.completed.is_none() {
            let entry = revenue::completed_entry(
                &state.registration,
                &state.exam,
                notice.amount,
                env.default_commission,
                env.clock.now(),
            );
            state.revenue.completed = Some(entry.clone());
            effects.push(Effect::RecordRevenue(Box::new(entry)));
        }
        effects.push(Self::notify(
            state,
            "Registration confirmed",
            format!(
                "Your payment for {} was received. Index number: {}.",
                state.exam.title, state.registration.index_number
            ),
            env,
        ));
        effects
    }

    /// Marks the registration `rejected` and gives back its seat.
    fn reject(
        state: &mut RegistrationState,
        reason: &str,
        env: &LifecycleEnvironment,
    ) -> SmallVec<[Effect; 4]> {
        let release = Self::release(state);
        Self::set_status(state, RegistrationStatus::Rejected, env);

        let mut effects: SmallVec<[Effect; 4]> = SmallVec::new();
        if !release.is_none() {
            effects.push(release);
        }
        effects.push(Self::persist(state));
        effects.push(Self::notify(
            state,
            "Registration rejected",
            format!("Your registration for {} was rejected: {reason}.", state.exam.title),
            env,
        ));
        effects
    }

    fn apply_payment(
        state: &mut RegistrationState,
        notice: Box<PaymentNotice>,
        env: &LifecycleEnvironment,
    ) -> SmallVec<[Effect; 4]> {
        let status = notice.status();
        let step = match transition(state.registration.status, status) {
            Ok(step) => step,
            Err(error) => {
                state.outcome = Some(NoticeOutcome::Stale);
                state.last_error = Some(error);
                return SmallVec::new();
            }
        };

        match step {
            Transition::Confirm => Self::confirm(state, &notice, env),
            Transition::Reject => Self::reject(state, &format!("payment {status}"), env),
            Transition::Revoke => {
                let mut effects = Self::reject(state, &format!("payment {status}"), env);
                if state.revenue.refunded.is_none() {
                    if let Some(completed) = &state.revenue.completed {
                        let refund = revenue::refunded_entry(completed, env.clock.now());
                        state.revenue.refunded = Some(refund.clone());
                        effects.insert(1, Effect::RecordRevenue(Box::new(refund)));
                    }
                }
                effects
            }
            Transition::Reinstate => {
                state.outcome = None;
                smallvec![Effect::ReacquireSeat {
                    offering_id: state.registration.offering_id,
                    notice,
                }]
            }
            Transition::Unchanged => {
                state.outcome = Some(NoticeOutcome::Unchanged);
                SmallVec::new()
            }
        }
    }
}

impl Reducer for LifecycleReducer {
    type State = RegistrationState;
    type Action = LifecycleAction;
    type Environment = LifecycleEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect; 4]> {
        state.last_error = None;

        match action {
            LifecycleAction::ApplyPayment { notice } => Self::apply_payment(state, notice, env),

            LifecycleAction::Expire { hold } => {
                let expired = state.registration.status == RegistrationStatus::Pending
                    && state.registration.created_at + hold <= env.clock.now();
                if expired {
                    Self::reject(state, "payment was not received in time", env)
                } else {
                    state.outcome = Some(NoticeOutcome::Unchanged);
                    SmallVec::new()
                }
            }

            LifecycleAction::SeatReacquired { location_id, notice } => {
                state.registration.assigned_location = Some(location_id);
                Self::confirm(state, &notice, env)
            }

            LifecycleAction::SeatUnavailable => {
                state.outcome = Some(NoticeOutcome::SeatUnavailable);
                SmallVec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GatewayStatus as G;
    use RegistrationStatus as R;

    #[test]
    fn status_codes_map_to_closed_enum() {
        assert_eq!(GatewayStatus::from_code(2), G::Success);
        assert_eq!(GatewayStatus::from_code(0), G::Pending);
        assert_eq!(GatewayStatus::from_code(-1), G::Cancelled);
        assert_eq!(GatewayStatus::from_code(-2), G::Failed);
        assert_eq!(GatewayStatus::from_code(-3), G::ChargedBack);
        assert_eq!(GatewayStatus::from_code(7), G::Unrecognized(7));
        assert_eq!(G::Unrecognized(7).code(), 7);
        assert!(G::Unrecognized(7).is_failure());
        assert!(!G::Pending.is_failure());
    }

    #[test]
    fn transition_table_from_pending() {
        assert_eq!(transition(R::Pending, G::Success), Ok(Transition::Confirm));
        assert_eq!(transition(R::Pending, G::Pending), Ok(Transition::Unchanged));
        for failure in [G::Cancelled, G::Failed, G::ChargedBack, G::Unrecognized(9)] {
            assert_eq!(transition(R::Pending, failure), Ok(Transition::Reject));
        }
    }

    #[test]
    fn transition_table_from_registered() {
        assert_eq!(transition(R::Registered, G::Success), Ok(Transition::Unchanged));
        assert!(matches!(
            transition(R::Registered, G::Pending),
            Err(LifecycleError::StaleNotice { .. })
        ));
        for failure in [G::Cancelled, G::Failed, G::ChargedBack, G::Unrecognized(-9)] {
            assert_eq!(transition(R::Registered, failure), Ok(Transition::Revoke));
        }
    }

    #[test]
    fn transition_table_from_rejected() {
        assert_eq!(transition(R::Rejected, G::Success), Ok(Transition::Reinstate));
        assert!(matches!(
            transition(R::Rejected, G::Pending),
            Err(LifecycleError::StaleNotice { .. })
        ));
        for failure in [G::Cancelled, G::Failed, G::ChargedBack, G::Unrecognized(1)] {
            assert_eq!(transition(R::Rejected, failure), Ok(Transition::Unchanged));
        }
    }

    #[test]
    fn outcome_labels_parse_back() {
        for outcome in [
            NoticeOutcome::Applied,
            NoticeOutcome::Unchanged,
            NoticeOutcome::Duplicate,
            NoticeOutcome::SignatureInvalid,
            NoticeOutcome::UnknownRegistration,
            NoticeOutcome::Stale,
            NoticeOutcome::SeatUnavailable,
            NoticeOutcome::Malformed,
            NoticeOutcome::ProcessingFailed,
        ] {
            assert_eq!(NoticeOutcome::parse(outcome.as_str()), Some(outcome));
        }
    }
}
