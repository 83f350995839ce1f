//! Catalog and payment fixtures.
//!
//! Dates are relative to [`crate::test_clock`], so fixtures line up with
//! fixed-clock environments.

use crate::mocks::test_clock;
use chrono::Duration;
use exam_seating_core::environment::Clock;
use exam_seating_core::store::{SeatStore, StoreError};
use exam_seating_core::types::{
    CommissionRate, Exam, ExamId, Location, LocationId, Money, NoticeId, Offering, OfferingId,
    OfferingStatus, OrganizationId, PaymentNotice, RegistrationId,
};
use exam_seating_core::verification::{sign_notice, GatewayNotice, NoticeVerifier};

/// Merchant id used by test verifiers.
pub const TEST_MERCHANT_ID: &str = "1211149";

/// Merchant secret used by test verifiers.
pub const TEST_MERCHANT_SECRET: &str = "test-merchant-secret";

/// Currency used in fixtures.
pub const TEST_CURRENCY: &str = "LKR";

/// Exam fee used in fixtures (1500.00).
pub const TEST_FEE: Money = Money::from_cents(150_000);

/// An exam with `fee` and no exam-specific commission.
#[must_use]
pub fn exam(organization_id: OrganizationId, fee: Money) -> Exam {
    Exam {
        id: ExamId::new(),
        organization_id,
        title: "Combined Mathematics Model Paper".to_string(),
        fee,
        commission_rate: None,
    }
}

/// An upcoming offering of `exam_id` starting `days` after the test clock.
#[must_use]
pub fn offering(exam_id: ExamId, days: i64) -> Offering {
    Offering {
        id: OfferingId::new(),
        exam_id,
        starts_at: test_clock().now() + Duration::days(days),
        status: OfferingStatus::Upcoming,
    }
}

/// A location with `capacity` seats.
#[must_use]
pub fn location(organization_id: OrganizationId, name: &str, capacity: u32) -> Location {
    Location {
        id: LocationId::new(),
        organization_id,
        name: name.to_string(),
        capacity,
    }
}

/// One exam, one upcoming offering and its ranked locations.
#[derive(Clone, Debug)]
pub struct CatalogFixture {
    /// Owning organization
    pub organization_id: OrganizationId,
    /// The exam
    pub exam: Exam,
    /// Upcoming offering, 30 days after the test clock
    pub offering: Offering,
    /// Locations in rank order (rank = index + 1)
    pub locations: Vec<Location>,
}

impl CatalogFixture {
    /// Builds a catalog whose offering uses one location per capacity,
    /// ranked in the given order.
    #[must_use]
    pub fn new(capacities: &[u32]) -> Self {
        let organization_id = OrganizationId::new();
        let exam = exam(organization_id, TEST_FEE);
        let offering = offering(exam.id, 30);
        let locations = capacities
            .iter()
            .enumerate()
            .map(|(i, capacity)| location(organization_id, &format!("Hall {}", i + 1), *capacity))
            .collect();
        Self {
            organization_id,
            exam,
            offering,
            locations,
        }
    }

    /// Sets an exam-specific commission rate.
    #[must_use]
    pub fn with_commission(mut self, rate: CommissionRate) -> Self {
        self.exam.commission_rate = Some(rate);
        self
    }

    /// Another upcoming offering of the same exam, `days` after the test clock.
    #[must_use]
    pub fn sibling_offering(&self, days: i64) -> Offering {
        offering(self.exam.id, days)
    }

    /// Writes the catalog to `store`.
    ///
    /// # Errors
    ///
    /// Returns any [`StoreError`] raised by the inserts.
    pub async fn seed(&self, store: &dyn SeatStore) -> Result<(), StoreError> {
        let mut tx = store.begin().await?;
        for location in &self.locations {
            tx.insert_location(location).await?;
        }
        tx.insert_exam(&self.exam).await?;
        tx.insert_offering(&self.offering).await?;
        for (rank, location) in (1u32..).zip(&self.locations) {
            tx.attach_location(self.offering.id, location.id, rank).await?;
        }
        tx.commit().await
    }

    /// Writes an extra offering using the given (location, rank) pairs.
    ///
    /// # Errors
    ///
    /// Returns any [`StoreError`] raised by the inserts.
    pub async fn seed_offering(
        &self,
        store: &dyn SeatStore,
        offering: &Offering,
        locations: &[(LocationId, u32)],
    ) -> Result<(), StoreError> {
        let mut tx = store.begin().await?;
        tx.insert_offering(offering).await?;
        for (location_id, rank) in locations {
            tx.attach_location(offering.id, *location_id, *rank).await?;
        }
        tx.commit().await
    }
}

/// Verifier configured with the test merchant credentials.
#[must_use]
pub fn test_verifier() -> NoticeVerifier {
    NoticeVerifier::new(TEST_MERCHANT_ID, TEST_MERCHANT_SECRET)
}

/// A correctly signed gateway notice.
#[must_use]
pub fn signed_notice(
    registration_id: RegistrationId,
    amount: Money,
    status_code: i32,
    payment_id: &str,
) -> GatewayNotice {
    let order_id = registration_id.to_string();
    GatewayNotice {
        merchant_id: TEST_MERCHANT_ID.to_string(),
        signature: sign_notice(
            TEST_MERCHANT_ID,
            &order_id,
            amount,
            TEST_CURRENCY,
            TEST_MERCHANT_SECRET,
            status_code,
        ),
        order_id,
        amount: amount.to_decimal_string(),
        currency: TEST_CURRENCY.to_string(),
        status_code: status_code.to_string(),
        payment_id: payment_id.to_string(),
        method: Some("VISA".to_string()),
        status_message: None,
    }
}

/// A notice as it looks after verification, for reducer tests.
#[must_use]
pub fn verified_notice(registration_id: RegistrationId, status_code: i32) -> PaymentNotice {
    PaymentNotice {
        id: NoticeId::new(),
        registration_id,
        transaction_id: format!("TXN-{registration_id}"),
        amount: TEST_FEE,
        currency: TEST_CURRENCY.to_string(),
        status_code,
        signature: String::new(),
        method: Some("VISA".to_string()),
        message: None,
        received_at: test_clock().now(),
    }
}
