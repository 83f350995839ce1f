//! Pure allocation rules.
//!
//! The runtime's allocator loads state inside a transaction and asks these
//! functions what to do; nothing here touches storage.

use crate::store::StoreError;
use crate::types::{
    IndexNumber, LocationId, Offering, OfferingStatus, Registration, RegistrationId,
    RegistrationStatus, StudentId,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Default prefix of generated index numbers.
pub const DEFAULT_INDEX_PREFIX: &str = "EX";

/// Errors returned by allocation and reschedule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// The student already holds a registration for the offering
    #[error("student already registered for this offering")]
    DuplicateRegistration,

    /// Every location of the offering is full
    #[error("no seats left at any location")]
    CapacityExhausted,

    /// The offering does not exist
    #[error("offering {0} not found")]
    UnknownOffering(String),

    /// The offering is completed or cancelled
    #[error("offering is {0} and does not accept registrations")]
    OfferingUnavailable(&'static str),

    /// The registration does not exist
    #[error("registration {0} not found")]
    UnknownRegistration(String),

    /// The registration cannot move to the requested offering
    #[error("registration cannot be rescheduled: {0}")]
    NotReschedulable(String),

    /// A lock could not be acquired in time
    #[error("lock timeout")]
    LockTimeout,

    /// Any other storage failure
    #[error("store error: {0}")]
    Store(StoreError),
}

impl AllocationError {
    /// Whether the caller may retry the whole operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout)
    }

    /// Stable label used for metrics and logs.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::DuplicateRegistration => "duplicate",
            Self::CapacityExhausted => "capacity_exhausted",
            Self::UnknownOffering(_) => "unknown_offering",
            Self::OfferingUnavailable(_) => "offering_unavailable",
            Self::UnknownRegistration(_) => "unknown_registration",
            Self::NotReschedulable(_) => "not_reschedulable",
            Self::LockTimeout => "lock_timeout",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for AllocationError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::LockTimeout => Self::LockTimeout,
            // The only unique key a registration insert can hit is (student, offering).
            StoreError::UniqueViolation(_) => Self::DuplicateRegistration,
            other => Self::Store(other),
        }
    }
}

/// Checks that an offering exists and is open.
///
/// # Errors
///
/// [`AllocationError::UnknownOffering`] when missing,
/// [`AllocationError::OfferingUnavailable`] when completed or cancelled.
pub fn check_offering(
    offering_id: impl ToString,
    offering: Option<Offering>,
) -> Result<Offering, AllocationError> {
    let offering = offering.ok_or_else(|| AllocationError::UnknownOffering(offering_id.to_string()))?;
    match offering.status {
        OfferingStatus::Upcoming => Ok(offering),
        status => Err(AllocationError::OfferingUnavailable(status.as_str())),
    }
}

/// Builds the `pending` registration for a freshly reserved seat.
#[must_use]
pub fn new_registration(
    student_id: StudentId,
    offering: &Offering,
    location_id: LocationId,
    index_number: IndexNumber,
    now: DateTime<Utc>,
) -> Registration {
    Registration {
        id: RegistrationId::new(),
        student_id,
        exam_id: offering.exam_id,
        offering_id: offering.id,
        assigned_location: Some(location_id),
        index_number,
        status: RegistrationStatus::Pending,
        attended: false,
        result: None,
        rescheduled_from: None,
        created_at: now,
        updated_at: now,
    }
}

/// Checks that `registration` may move to `target`.
///
/// The target must already have passed [`check_offering`].
///
/// # Errors
///
/// [`AllocationError::NotReschedulable`] when the registration is rejected,
/// the target belongs to another exam, or the target is its current offering.
pub fn check_reschedule(registration: &Registration, target: &Offering) -> Result<(), AllocationError> {
    if !registration.status.holds_seat() {
        return Err(AllocationError::NotReschedulable(format!(
            "registration is {}",
            registration.status
        )));
    }
    if target.exam_id != registration.exam_id {
        return Err(AllocationError::NotReschedulable(
            "target offering belongs to a different exam".to_string(),
        ));
    }
    if target.id == registration.offering_id {
        return Err(AllocationError::NotReschedulable(
            "registration is already on this offering".to_string(),
        ));
    }
    Ok(())
}

/// Moves a registration to a new offering and seat, keeping its status,
/// index number and payments.
pub fn apply_reschedule(
    registration: &mut Registration,
    target: &Offering,
    location_id: LocationId,
    now: DateTime<Utc>,
) {
    registration.rescheduled_from = Some(registration.offering_id);
    registration.offering_id = target.id;
    registration.assigned_location = Some(location_id);
    registration.updated_at = now;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ExamId;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn offering(exam_id: ExamId, status: OfferingStatus) -> Offering {
        Offering {
            id: crate::types::OfferingId::new(),
            exam_id,
            starts_at: now() + chrono::Duration::days(30),
            status,
        }
    }

    fn registration(offering: &Offering, status: RegistrationStatus) -> Registration {
        let mut registration = new_registration(
            StudentId::new(),
            offering,
            LocationId::new(),
            IndexNumber::generate(DEFAULT_INDEX_PREFIX, 1, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
            now(),
        );
        registration.status = status;
        registration
    }

    #[test]
    fn open_offering_passes() {
        let open = offering(ExamId::new(), OfferingStatus::Upcoming);
        assert_eq!(check_offering(open.id, Some(open.clone())).unwrap(), open);
    }

    #[test]
    fn closed_or_missing_offering_is_refused() {
        let id = crate::types::OfferingId::new();
        assert!(matches!(check_offering(id, None), Err(AllocationError::UnknownOffering(_))));

        let cancelled = offering(ExamId::new(), OfferingStatus::Cancelled);
        assert_eq!(
            check_offering(cancelled.id, Some(cancelled)),
            Err(AllocationError::OfferingUnavailable("cancelled"))
        );

        let completed = offering(ExamId::new(), OfferingStatus::Completed);
        assert_eq!(
            check_offering(completed.id, Some(completed)),
            Err(AllocationError::OfferingUnavailable("completed"))
        );
    }

    #[test]
    fn new_registration_is_pending_with_seat() {
        let open = offering(ExamId::new(), OfferingStatus::Upcoming);
        let location = LocationId::new();
        let reg = new_registration(
            StudentId::new(),
            &open,
            location,
            IndexNumber::from_string("EX-000001-20250101".to_string()),
            now(),
        );
        assert_eq!(reg.status, RegistrationStatus::Pending);
        assert_eq!(reg.held_seat(), Some((open.id, location)));
        assert_eq!(reg.exam_id, open.exam_id);
    }

    #[test]
    fn reschedule_requires_live_registration_and_same_exam() {
        let exam = ExamId::new();
        let current = offering(exam, OfferingStatus::Upcoming);
        let target = offering(exam, OfferingStatus::Upcoming);
        let other_exam = offering(ExamId::new(), OfferingStatus::Upcoming);

        let pending = registration(&current, RegistrationStatus::Pending);
        assert!(check_reschedule(&pending, &target).is_ok());
        assert!(matches!(
            check_reschedule(&pending, &other_exam),
            Err(AllocationError::NotReschedulable(_))
        ));
        assert!(matches!(
            check_reschedule(&pending, &current),
            Err(AllocationError::NotReschedulable(_))
        ));

        let rejected = registration(&current, RegistrationStatus::Rejected);
        assert!(matches!(
            check_reschedule(&rejected, &target),
            Err(AllocationError::NotReschedulable(_))
        ));
    }

    #[test]
    fn apply_reschedule_records_previous_offering() {
        let exam = ExamId::new();
        let current = offering(exam, OfferingStatus::Upcoming);
        let target = offering(exam, OfferingStatus::Upcoming);
        let mut reg = registration(&current, RegistrationStatus::Registered);
        let index = reg.index_number.clone();
        let location = LocationId::new();

        apply_reschedule(&mut reg, &target, location, now());

        assert_eq!(reg.rescheduled_from, Some(current.id));
        assert_eq!(reg.offering_id, target.id);
        assert_eq!(reg.assigned_location, Some(location));
        assert_eq!(reg.status, RegistrationStatus::Registered);
        assert_eq!(reg.index_number, index);
    }

    #[test]
    fn store_errors_map_to_allocation_errors() {
        assert_eq!(AllocationError::from(StoreError::LockTimeout), AllocationError::LockTimeout);
        assert_eq!(
            AllocationError::from(StoreError::UniqueViolation("registrations".into())),
            AllocationError::DuplicateRegistration
        );
        assert!(AllocationError::LockTimeout.is_retryable());
        assert!(!AllocationError::CapacityExhausted.is_retryable());
    }
}
