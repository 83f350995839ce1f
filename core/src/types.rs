//! Domain types for exam seat allocation.
//!
//! Value objects (identifiers, money, commission rates), catalog entities
//! (exams, offerings, locations) and the durable records the engine creates
//! (registrations, payment notices, revenue entries, notification requests).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an organization (exam publisher)
    OrganizationId
);
uuid_id!(
    /// Unique identifier for an exam
    ExamId
);
uuid_id!(
    /// Unique identifier for a dated exam offering
    OfferingId
);
uuid_id!(
    /// Unique identifier for a physical test location
    LocationId
);
uuid_id!(
    /// Unique identifier for a student
    StudentId
);
uuid_id!(
    /// Unique identifier for a registration (also the gateway order id)
    RegistrationId
);
uuid_id!(
    /// Unique identifier for a stored payment notice
    NoticeId
);
uuid_id!(
    /// Unique identifier for a revenue ledger entry
    RevenueEntryId
);
uuid_id!(
    /// Unique identifier for an outbox notification request
    NotificationId
);

// ============================================================================
// Money (cents-based to avoid floating point errors)
// ============================================================================

/// Errors produced when parsing a decimal money string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseMoneyError {
    /// Input was empty
    #[error("amount is empty")]
    Empty,
    /// Input had a sign, letters or more than one decimal point
    #[error("amount '{0}' is not a plain decimal number")]
    InvalidFormat(String),
    /// More than two fractional digits
    #[error("amount '{0}' has more than two decimal places")]
    TooPrecise(String),
    /// Value does not fit in `u64` cents
    #[error("amount '{0}' is too large")]
    Overflow(String),
}

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units with overflow checking
    #[must_use]
    pub const fn checked_from_units(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Subtracts two money amounts (returns None if result would be negative)
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }

    /// Formats the amount with exactly two decimal places and no currency
    /// symbol, e.g. `1500.00`. This is the form the gateway signs.
    #[must_use]
    pub fn to_decimal_string(&self) -> String {
        format!("{}.{:02}", self.0 / 100, self.0 % 100)
    }

    /// Parses a plain decimal string such as `1500`, `1500.5` or `1500.50`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseMoneyError`] for empty, signed, non-numeric, overly
    /// precise or overflowing input.
    pub fn parse_decimal(input: &str) -> Result<Self, ParseMoneyError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ParseMoneyError::Empty);
        }

        let (units, fraction) = match trimmed.split_once('.') {
            Some((units, fraction)) => (units, fraction),
            None => (trimmed, ""),
        };

        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if units.is_empty() || !all_digits(units) || !all_digits(fraction) {
            return Err(ParseMoneyError::InvalidFormat(trimmed.to_string()));
        }
        if fraction.len() > 2 {
            return Err(ParseMoneyError::TooPrecise(trimmed.to_string()));
        }

        let overflow = || ParseMoneyError::Overflow(trimmed.to_string());
        let units: u64 = units.parse().map_err(|_| overflow())?;
        let fraction_cents: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| overflow())? * 10,
            _ => fraction.parse().map_err(|_| overflow())?,
        };

        units
            .checked_mul(100)
            .and_then(|cents| cents.checked_add(fraction_cents))
            .map(Self)
            .ok_or_else(overflow)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

// ============================================================================
// Commission rate
// ============================================================================

/// A commission rate expressed in basis points (1% = 100 bps).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionRate(u32);

impl CommissionRate {
    /// Upper bound: 100%
    pub const MAX_BASIS_POINTS: u32 = 10_000;

    /// Platform default of 10%, used when nothing else is configured
    pub const DEFAULT: Self = Self(1_000);

    /// Creates a rate from basis points, rejecting values above 100%
    #[must_use]
    pub const fn from_basis_points(bps: u32) -> Option<Self> {
        if bps > Self::MAX_BASIS_POINTS {
            None
        } else {
            Some(Self(bps))
        }
    }

    /// Creates a rate from a whole percentage, e.g. `10` for 10%
    #[must_use]
    pub const fn from_percent(percent: u32) -> Option<Self> {
        match percent.checked_mul(100) {
            Some(bps) => Self::from_basis_points(bps),
            None => None,
        }
    }

    /// Parses a percentage such as `10`, `12.5` or `7.25`.
    #[must_use]
    pub fn parse_percent(input: &str) -> Option<Self> {
        // Same grammar as money: percent with up to two decimals == basis points
        let bps = Money::parse_decimal(input).ok()?.cents();
        u32::try_from(bps).ok().and_then(Self::from_basis_points)
    }

    /// Returns the rate in basis points
    #[must_use]
    pub const fn basis_points(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Catalog entities (read-only lookups for the engine)
// ============================================================================

/// A physical test location with a fixed number of seats.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Location ID
    pub id: LocationId,
    /// Organization that owns the location
    pub organization_id: OrganizationId,
    /// Display name
    pub name: String,
    /// Total seats (always positive)
    pub capacity: u32,
}

/// An exam published by an organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    /// Exam ID
    pub id: ExamId,
    /// Publishing organization
    pub organization_id: OrganizationId,
    /// Title
    pub title: String,
    /// Registration fee
    pub fee: Money,
    /// Exam-specific commission; `None` falls back to the configured default
    pub commission_rate: Option<CommissionRate>,
}

/// Lifecycle of a dated offering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferingStatus {
    /// Open for registration
    Upcoming,
    /// Date has passed
    Completed,
    /// Withdrawn by the organization
    Cancelled,
}

impl OfferingStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(Self::Upcoming),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A specific date/time instance of an exam.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    /// Offering ID
    pub id: OfferingId,
    /// Parent exam
    pub exam_id: ExamId,
    /// When the exam sits
    pub starts_at: DateTime<Utc>,
    /// Current status
    pub status: OfferingStatus,
}

impl Offering {
    /// Whether new registrations may be placed on this offering.
    #[must_use]
    pub fn accepts_registrations(&self) -> bool {
        self.status == OfferingStatus::Upcoming
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Lifecycle status of a registration.
///
/// `Registered` and `Rejected` are terminal for payment purposes. Only
/// `Pending` and `Registered` hold a seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Seat reserved, payment not yet confirmed
    Pending,
    /// Payment confirmed
    Registered,
    /// Payment failed, was cancelled or charged back, or the hold expired
    Rejected,
}

impl RegistrationStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Registered => "registered",
            Self::Rejected => "rejected",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "registered" => Some(Self::Registered),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Whether the status is terminal for payment purposes.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Registered | Self::Rejected)
    }

    /// Whether a registration in this status occupies its assigned seat.
    #[must_use]
    pub const fn holds_seat(&self) -> bool {
        matches!(self, Self::Pending | Self::Registered)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-facing registration number, unique across the system.
///
/// Format: `<PREFIX>-<zero-padded sequence>-<YYYYMMDD>`, e.g. `EX-000042-20250301`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexNumber(String);

impl IndexNumber {
    /// Builds an index number from a prefix, a store-issued sequence and the
    /// registration date.
    #[must_use]
    pub fn generate(prefix: &str, sequence: u64, date: NaiveDate) -> Self {
        Self(format!("{prefix}-{sequence:06}-{}", date.format("%Y%m%d")))
    }

    /// Wraps an existing index number read from storage.
    #[must_use]
    pub const fn from_string(value: String) -> Self {
        Self(value)
    }

    /// String view
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The durable registration record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration ID (used as the gateway order id)
    pub id: RegistrationId,
    /// Registering student
    pub student_id: StudentId,
    /// Exam being sat
    pub exam_id: ExamId,
    /// Chosen offering
    pub offering_id: OfferingId,
    /// Location assigned by the allocator; kept after rejection for history
    pub assigned_location: Option<LocationId>,
    /// Unique human-facing number
    pub index_number: IndexNumber,
    /// Lifecycle status
    pub status: RegistrationStatus,
    /// Whether the student sat the exam
    pub attended: bool,
    /// Result, once published
    pub result: Option<String>,
    /// Previous offering, if the registration was rescheduled
    pub rescheduled_from: Option<OfferingId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status or placement change
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    /// The (offering, location) seat this registration currently occupies.
    #[must_use]
    pub fn held_seat(&self) -> Option<(OfferingId, LocationId)> {
        if self.status.holds_seat() {
            self.assigned_location.map(|location| (self.offering_id, location))
        } else {
            None
        }
    }
}

// ============================================================================
// Payments and revenue
// ============================================================================

/// A payment notice that passed signature verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotice {
    /// Stored notice ID
    pub id: NoticeId,
    /// Registration the payment is for
    pub registration_id: RegistrationId,
    /// Gateway transaction ID
    pub transaction_id: String,
    /// Gross amount
    pub amount: Money,
    /// ISO currency code
    pub currency: String,
    /// Raw gateway status code
    pub status_code: i32,
    /// Signature as received
    pub signature: String,
    /// Payment method reported by the gateway
    pub method: Option<String>,
    /// Free-text gateway message
    pub message: Option<String>,
    /// When the notice was received
    pub received_at: DateTime<Utc>,
}

/// Status of a revenue ledger entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueStatus {
    /// Booked on first confirmed payment
    Completed,
    /// Appended when a confirmed payment is charged back
    Refunded,
}

impl RevenueStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Refunded => "refunded",
        }
    }

    /// Parse from the database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

/// An immutable commission-split ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueEntry {
    /// Entry ID
    pub id: RevenueEntryId,
    /// Registration paid for
    pub registration_id: RegistrationId,
    /// Organization receiving the net amount
    pub organization_id: OrganizationId,
    /// Exam paid for
    pub exam_id: ExamId,
    /// Gross amount paid
    pub gross: Money,
    /// Platform commission
    pub commission: Money,
    /// `gross - commission`
    pub net: Money,
    /// Entry status
    pub status: RevenueStatus,
    /// When the entry was booked
    pub transaction_date: DateTime<Utc>,
}

/// The revenue entries already booked for one registration.
///
/// At most one entry per status exists.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueLedger {
    /// The `completed` entry, if revenue was booked
    pub completed: Option<RevenueEntry>,
    /// The `refunded` entry, if the payment was charged back
    pub refunded: Option<RevenueEntry>,
}

impl RevenueLedger {
    /// Builds a ledger from entries loaded from storage.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = RevenueEntry>) -> Self {
        let mut ledger = Self::default();
        for entry in entries {
            match entry.status {
                RevenueStatus::Completed => ledger.completed = Some(entry),
                RevenueStatus::Refunded => ledger.refunded = Some(entry),
            }
        }
        ledger
    }
}

/// A notification-creation request handed to the notification subsystem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Request ID
    pub id: NotificationId,
    /// Target student
    pub student_id: StudentId,
    /// Related registration
    pub registration_id: RegistrationId,
    /// Title
    pub title: String,
    /// Body
    pub message: String,
    /// When the request was created
    pub created_at: DateTime<Utc>,
}

impl NotificationRequest {
    /// Creates a request addressed to the registration's student.
    #[must_use]
    pub fn for_registration(
        registration: &Registration,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            student_id: registration.student_id,
            registration_id: registration.id,
            title: title.into(),
            message: message.into(),
            created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn money_formats_two_decimals() {
        assert_eq!(Money::from_cents(150_000).to_decimal_string(), "1500.00");
        assert_eq!(Money::from_cents(5).to_decimal_string(), "0.05");
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
    }

    #[test]
    fn money_parses_decimal_strings() {
        assert_eq!(Money::parse_decimal("1500").unwrap(), Money::from_cents(150_000));
        assert_eq!(Money::parse_decimal("1500.5").unwrap(), Money::from_cents(150_050));
        assert_eq!(Money::parse_decimal(" 1500.05 ").unwrap(), Money::from_cents(150_005));
    }

    #[test]
    fn money_rejects_malformed_input() {
        assert_eq!(Money::parse_decimal(""), Err(ParseMoneyError::Empty));
        assert!(matches!(Money::parse_decimal("-1.00"), Err(ParseMoneyError::InvalidFormat(_))));
        assert!(matches!(Money::parse_decimal(".50"), Err(ParseMoneyError::InvalidFormat(_))));
        assert!(matches!(Money::parse_decimal("1.2.3"), Err(ParseMoneyError::InvalidFormat(_))));
        assert!(matches!(Money::parse_decimal("1.005"), Err(ParseMoneyError::TooPrecise(_))));
        assert!(matches!(
            Money::parse_decimal("999999999999999999999"),
            Err(ParseMoneyError::Overflow(_))
        ));
    }

    #[test]
    fn commission_rate_parses_percentages() {
        assert_eq!(CommissionRate::parse_percent("10").unwrap().basis_points(), 1000);
        assert_eq!(CommissionRate::parse_percent("12.5").unwrap().basis_points(), 1250);
        assert!(CommissionRate::parse_percent("100.01").is_none());
        assert!(CommissionRate::parse_percent("ten").is_none());
        assert_eq!(CommissionRate::from_percent(7).unwrap().to_string(), "7.00%");
        assert_eq!(Some(CommissionRate::DEFAULT), CommissionRate::from_percent(10));
    }

    #[test]
    fn index_number_is_zero_padded_and_date_stamped() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let index = IndexNumber::generate("EX", 42, date);
        assert_eq!(index.as_str(), "EX-000042-20250301");
    }

    #[test]
    fn only_live_statuses_hold_seats() {
        assert!(RegistrationStatus::Pending.holds_seat());
        assert!(RegistrationStatus::Registered.holds_seat());
        assert!(!RegistrationStatus::Rejected.holds_seat());
        assert!(!RegistrationStatus::Pending.is_terminal());
    }

    #[test]
    fn status_strings_round_trip_through_storage_form() {
        for status in [
            RegistrationStatus::Pending,
            RegistrationStatus::Registered,
            RegistrationStatus::Rejected,
        ] {
            assert_eq!(RegistrationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OfferingStatus::parse("archived"), None);
    }

    #[test]
    fn ids_parse_from_strings() {
        let id = RegistrationId::new();
        let parsed: RegistrationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<RegistrationId>().is_err());
    }
}
