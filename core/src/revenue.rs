//! Revenue split between the platform and the organization.
//!
//! Amounts are integer cents and rates are basis points; the commission is
//! rounded down so the organization never receives less than its share.

use crate::types::{
    CommissionRate, Exam, Money, Registration, RevenueEntry, RevenueEntryId, RevenueStatus,
};
use chrono::{DateTime, Utc};

/// Default platform commission when an exam has none configured.
pub const DEFAULT_COMMISSION_PERCENT: u32 = 10;

/// Commission on `gross` at `rate`, rounded down to the cent.
#[must_use]
pub fn commission(gross: Money, rate: CommissionRate) -> Money {
    let cents = u128::from(gross.cents()) * u128::from(rate.basis_points())
        / u128::from(CommissionRate::MAX_BASIS_POINTS);
    // rate <= 100%, so the commission never exceeds the gross amount
    Money::from_cents(u64::try_from(cents).unwrap_or(gross.cents()))
}

/// The rate that applies to an exam.
#[must_use]
pub fn effective_rate(exam: &Exam, default_rate: CommissionRate) -> CommissionRate {
    exam.commission_rate.unwrap_or(default_rate)
}

/// Ledger entry booked when a registration first becomes `registered`.
#[must_use]
pub fn completed_entry(
    registration: &Registration,
    exam: &Exam,
    gross: Money,
    default_rate: CommissionRate,
    at: DateTime<Utc>,
) -> RevenueEntry {
    let commission = commission(gross, effective_rate(exam, default_rate));
    RevenueEntry {
        id: RevenueEntryId::new(),
        registration_id: registration.id,
        organization_id: exam.organization_id,
        exam_id: exam.id,
        gross,
        commission,
        net: gross.checked_sub(commission).unwrap_or(Money::ZERO),
        status: RevenueStatus::Completed,
        transaction_date: at,
    }
}

/// Entry appended when a confirmed payment is charged back. Mirrors the
/// amounts of the completed entry.
#[must_use]
pub fn refunded_entry(completed: &RevenueEntry, at: DateTime<Utc>) -> RevenueEntry {
    RevenueEntry {
        id: RevenueEntryId::new(),
        status: RevenueStatus::Refunded,
        transaction_date: at,
        ..completed.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{ExamId, IndexNumber, LocationId, OfferingId, OrganizationId, RegistrationId, RegistrationStatus, StudentId};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn exam(rate: Option<CommissionRate>) -> Exam {
        Exam {
            id: ExamId::new(),
            organization_id: OrganizationId::new(),
            title: "Physics".to_string(),
            fee: Money::from_cents(150_000),
            commission_rate: rate,
        }
    }

    fn registration(exam: &Exam) -> Registration {
        Registration {
            id: RegistrationId::new(),
            student_id: StudentId::new(),
            exam_id: exam.id,
            offering_id: OfferingId::new(),
            assigned_location: Some(LocationId::new()),
            index_number: IndexNumber::from_string("EX-000001-20250101".into()),
            status: RegistrationStatus::Registered,
            attended: false,
            result: None,
            rescheduled_from: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn default_rate() -> CommissionRate {
        CommissionRate::from_percent(DEFAULT_COMMISSION_PERCENT).unwrap()
    }

    #[test]
    fn commission_rounds_down() {
        let rate = CommissionRate::from_basis_points(1000).unwrap();
        assert_eq!(commission(Money::from_cents(150_000), rate), Money::from_cents(15_000));
        assert_eq!(commission(Money::from_cents(999), rate), Money::from_cents(99));
        assert_eq!(commission(Money::from_cents(u64::MAX), CommissionRate::from_percent(100).unwrap()), Money::from_cents(u64::MAX));
    }

    #[test]
    fn default_rate_applies_without_exam_rate() {
        let exam = exam(None);
        let entry = completed_entry(&registration(&exam), &exam, Money::from_cents(150_000), default_rate(), now());
        assert_eq!(entry.commission, Money::from_cents(15_000));
        assert_eq!(entry.net, Money::from_cents(135_000));
        assert_eq!(entry.status, RevenueStatus::Completed);
        assert_eq!(entry.organization_id, exam.organization_id);
    }

    #[test]
    fn exam_rate_overrides_default() {
        let exam = exam(CommissionRate::from_basis_points(250));
        let entry = completed_entry(&registration(&exam), &exam, Money::from_cents(10_000), default_rate(), now());
        assert_eq!(entry.commission, Money::from_cents(250));
        assert_eq!(entry.net, Money::from_cents(9_750));
        assert_eq!(entry.gross.cents(), entry.commission.cents() + entry.net.cents());
    }

    #[test]
    fn refund_mirrors_completed_amounts() {
        let exam = exam(None);
        let completed = completed_entry(&registration(&exam), &exam, Money::from_cents(150_000), default_rate(), now());
        let refunded = refunded_entry(&completed, now() + chrono::Duration::days(2));
        assert_eq!(refunded.status, RevenueStatus::Refunded);
        assert_eq!(refunded.gross, completed.gross);
        assert_eq!(refunded.net, completed.net);
        assert_ne!(refunded.id, completed.id);
    }
}
