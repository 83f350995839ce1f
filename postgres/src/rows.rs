//! Row tuples and their conversion to domain types.

use chrono::{DateTime, Utc};
use exam_seating_core::lifecycle::NoticeOutcome;
use exam_seating_core::store::StoreError;
use exam_seating_core::types::{
    CommissionRate, Exam, ExamId, IndexNumber, LocationId, Money, Offering, OfferingId,
    OfferingStatus, OrganizationId, Registration, RegistrationId, RegistrationStatus,
    RevenueEntry, RevenueEntryId, RevenueStatus, StudentId, Location,
};
use sqlx::types::Uuid;

/// Converts between Rust and SQL integer widths.
pub(crate) fn db_int<T, U>(value: T, column: &str) -> Result<U, StoreError>
where
    U: TryFrom<T>,
{
    U::try_from(value).map_err(|_| StoreError::Database(format!("{column} out of range")))
}

pub(crate) fn invalid(column: &str, value: &str) -> StoreError {
    StoreError::Database(format!("Invalid {column} in database: {value}"))
}

pub(crate) type LocationRow = (Uuid, Uuid, String, i32);

pub(crate) fn location(row: LocationRow) -> Result<Location, StoreError> {
    let (id, organization_id, name, capacity) = row;
    Ok(Location {
        id: LocationId::from_uuid(id),
        organization_id: OrganizationId::from_uuid(organization_id),
        name,
        capacity: db_int(capacity, "locations.capacity")?,
    })
}

pub(crate) type ExamRow = (Uuid, Uuid, String, i64, Option<i32>);

pub(crate) fn exam(row: ExamRow) -> Result<Exam, StoreError> {
    let (id, organization_id, title, fee_cents, commission_bps) = row;
    let commission_rate = match commission_bps {
        Some(bps) => Some(
            CommissionRate::from_basis_points(db_int(bps, "exams.commission_bps")?)
                .ok_or_else(|| invalid("exams.commission_bps", &bps.to_string()))?,
        ),
        None => None,
    };
    Ok(Exam {
        id: ExamId::from_uuid(id),
        organization_id: OrganizationId::from_uuid(organization_id),
        title,
        fee: Money::from_cents(db_int(fee_cents, "exams.fee_cents")?),
        commission_rate,
    })
}

pub(crate) type OfferingRow = (Uuid, Uuid, DateTime<Utc>, String);

pub(crate) fn offering(row: OfferingRow) -> Result<Offering, StoreError> {
    let (id, exam_id, starts_at, status) = row;
    Ok(Offering {
        id: OfferingId::from_uuid(id),
        exam_id: ExamId::from_uuid(exam_id),
        starts_at,
        status: OfferingStatus::parse(&status)
            .ok_or_else(|| invalid("exam_offerings.status", &status))?,
    })
}

pub(crate) const REGISTRATION_COLUMNS: &str = "id, student_id, exam_id, offering_id, \
     assigned_location, index_number, status, attended, result, rescheduled_from, \
     created_at, updated_at";

pub(crate) type RegistrationRow = (
    Uuid,
    Uuid,
    Uuid,
    Uuid,
    Option<Uuid>,
    String,
    String,
    bool,
    Option<String>,
    Option<Uuid>,
    DateTime<Utc>,
    DateTime<Utc>,
);

pub(crate) fn registration(row: RegistrationRow) -> Result<Registration, StoreError> {
    let (
        id,
        student_id,
        exam_id,
        offering_id,
        assigned_location,
        index_number,
        status,
        attended,
        result,
        rescheduled_from,
        created_at,
        updated_at,
    ) = row;
    Ok(Registration {
        id: RegistrationId::from_uuid(id),
        student_id: StudentId::from_uuid(student_id),
        exam_id: ExamId::from_uuid(exam_id),
        offering_id: OfferingId::from_uuid(offering_id),
        assigned_location: assigned_location.map(LocationId::from_uuid),
        index_number: IndexNumber::from_string(index_number),
        status: RegistrationStatus::parse(&status)
            .ok_or_else(|| invalid("registrations.status", &status))?,
        attended,
        result,
        rescheduled_from: rescheduled_from.map(OfferingId::from_uuid),
        created_at,
        updated_at,
    })
}

pub(crate) type RevenueRow = (Uuid, Uuid, Uuid, Uuid, i64, i64, i64, String, DateTime<Utc>);

pub(crate) fn revenue_entry(row: RevenueRow) -> Result<RevenueEntry, StoreError> {
    let (id, registration_id, organization_id, exam_id, gross, commission, net, status, date) = row;
    Ok(RevenueEntry {
        id: RevenueEntryId::from_uuid(id),
        registration_id: RegistrationId::from_uuid(registration_id),
        organization_id: OrganizationId::from_uuid(organization_id),
        exam_id: ExamId::from_uuid(exam_id),
        gross: Money::from_cents(db_int(gross, "revenue_entries.gross_cents")?),
        commission: Money::from_cents(db_int(commission, "revenue_entries.commission_cents")?),
        net: Money::from_cents(db_int(net, "revenue_entries.net_cents")?),
        status: RevenueStatus::parse(&status)
            .ok_or_else(|| invalid("revenue_entries.status", &status))?,
        transaction_date: date,
    })
}

/// Parses an audit outcome read back from `notice_audit_log`.
pub(crate) fn outcome(value: &str) -> Result<NoticeOutcome, StoreError> {
    NoticeOutcome::parse(value).ok_or_else(|| invalid("notice_audit_log.outcome", value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn negative_counts_are_rejected() {
        let row: LocationRow = (Uuid::new_v4(), Uuid::new_v4(), "Hall".to_string(), -1);
        assert!(matches!(location(row), Err(StoreError::Database(_))));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let row: OfferingRow = (Uuid::new_v4(), Uuid::new_v4(), Utc::now(), "postponed".to_string());
        assert!(matches!(offering(row), Err(StoreError::Database(_))));
    }

    #[test]
    fn exam_commission_is_optional() {
        let row: ExamRow = (Uuid::new_v4(), Uuid::new_v4(), "Physics".to_string(), 150_000, None);
        let exam = exam(row).unwrap();
        assert_eq!(exam.fee, Money::from_cents(150_000));
        assert!(exam.commission_rate.is_none());

        let row: ExamRow = (Uuid::new_v4(), Uuid::new_v4(), "Physics".to_string(), 0, Some(20_000));
        assert!(super::exam(row).is_err());
    }

    #[test]
    fn audit_outcomes_parse() {
        assert_eq!(outcome("signature_invalid").unwrap(), NoticeOutcome::SignatureInvalid);
        assert!(outcome("exploded").is_err());
    }
}
