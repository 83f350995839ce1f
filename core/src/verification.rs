//! Payment gateway notice verification.
//!
//! The gateway signs each notice with the uppercase hex SHA-256 of
//!
//! ```text
//! merchant_id ‖ order_id ‖ amount (2 decimals) ‖ currency ‖ UPPER(hex SHA-256(secret)) ‖ status_code
//! ```
//!
//! [`NoticeVerifier`] recomputes that digest and compares it in constant
//! time. Verification is pure: it never loads or writes anything. The caller
//! records a [`NoticeAuditEntry`] for every notice, whatever the outcome.

use crate::lifecycle::NoticeOutcome;
use crate::types::{Money, NoticeId, PaymentNotice, RegistrationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Raw gateway callback, exactly as received.
///
/// Every field defaults to empty so that a partial form still reaches
/// verification and gets audited as malformed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayNotice {
    /// Merchant the payment was made to
    pub merchant_id: String,
    /// Order id, which is the registration id
    pub order_id: String,
    /// Gross amount as a decimal string
    pub amount: String,
    /// ISO currency code
    pub currency: String,
    /// Gateway status code as a decimal integer string
    pub status_code: String,
    /// Gateway transaction id
    pub payment_id: String,
    /// Payment method
    pub method: Option<String>,
    /// Free-text gateway message
    pub status_message: Option<String>,
    /// Signature to check
    pub signature: String,
}

/// Reasons a notice is not trusted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// Signature does not match the recomputed digest
    #[error("signature mismatch")]
    SignatureInvalid,

    /// The order id does not name a known registration
    #[error("unknown registration {0}")]
    UnknownRegistration(String),

    /// The notice was addressed to another merchant
    #[error("merchant id does not match")]
    MerchantMismatch,

    /// A field could not be parsed
    #[error("malformed notice: {0}")]
    Malformed(String),
}

impl VerificationError {
    /// Audit outcome recorded for this failure.
    #[must_use]
    pub const fn outcome(&self) -> NoticeOutcome {
        match self {
            Self::SignatureInvalid | Self::MerchantMismatch => NoticeOutcome::SignatureInvalid,
            Self::UnknownRegistration(_) => NoticeOutcome::UnknownRegistration,
            Self::Malformed(_) => NoticeOutcome::Malformed,
        }
    }
}

/// Uppercase hex SHA-256 of `input`.
fn sha256_upper_hex(input: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(input))
}

/// Computes the signature the gateway attaches to a notice.
#[must_use]
pub fn sign_notice(
    merchant_id: &str,
    order_id: &str,
    amount: Money,
    currency: &str,
    secret: &str,
    status_code: i32,
) -> String {
    sign_with_digest(
        merchant_id,
        order_id,
        amount,
        currency,
        &sha256_upper_hex(secret.as_bytes()),
        status_code,
    )
}

fn sign_with_digest(
    merchant_id: &str,
    order_id: &str,
    amount: Money,
    currency: &str,
    secret_digest: &str,
    status_code: i32,
) -> String {
    let payload = format!(
        "{merchant_id}{order_id}{}{currency}{secret_digest}{status_code}",
        amount.to_decimal_string()
    );
    sha256_upper_hex(payload.as_bytes())
}

/// Case-insensitive, constant-time signature comparison.
#[must_use]
pub fn signatures_match(expected: &str, received: &str) -> bool {
    let expected = expected.trim().to_ascii_uppercase();
    let received = received.trim().to_ascii_uppercase();
    constant_time_eq::constant_time_eq(expected.as_bytes(), received.as_bytes())
}

/// Verifies gateway notices for one merchant account.
///
/// Only the digest of the merchant secret is kept.
#[derive(Clone)]
pub struct NoticeVerifier {
    merchant_id: String,
    secret_digest: String,
}

impl NoticeVerifier {
    /// Creates a verifier for `merchant_id` signed with `secret`.
    #[must_use]
    pub fn new(merchant_id: impl Into<String>, secret: &str) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            secret_digest: sha256_upper_hex(secret.as_bytes()),
        }
    }

    /// Configured merchant id
    #[must_use]
    pub fn merchant_id(&self) -> &str {
        &self.merchant_id
    }

    /// Checks authenticity and parses the notice.
    ///
    /// # Errors
    ///
    /// - [`VerificationError::MerchantMismatch`] for another merchant's notice
    /// - [`VerificationError::Malformed`] when amount, status code, order id
    ///   or transaction id cannot be parsed
    /// - [`VerificationError::SignatureInvalid`] when the digest differs
    pub fn verify(
        &self,
        notice: &GatewayNotice,
        received_at: DateTime<Utc>,
    ) -> Result<PaymentNotice, VerificationError> {
        if notice.merchant_id.trim() != self.merchant_id {
            return Err(VerificationError::MerchantMismatch);
        }

        let amount = Money::parse_decimal(&notice.amount)
            .map_err(|e| VerificationError::Malformed(format!("amount: {e}")))?;
        let status_code: i32 = notice
            .status_code
            .trim()
            .parse()
            .map_err(|_| VerificationError::Malformed(format!("status_code '{}'", notice.status_code)))?;
        let registration_id: RegistrationId = notice
            .order_id
            .parse()
            .map_err(|_| VerificationError::Malformed(format!("order_id '{}'", notice.order_id)))?;
        let transaction_id = notice.payment_id.trim();
        if transaction_id.is_empty() {
            return Err(VerificationError::Malformed("payment_id is empty".to_string()));
        }

        let expected = sign_with_digest(
            &self.merchant_id,
            notice.order_id.trim(),
            amount,
            notice.currency.trim(),
            &self.secret_digest,
            status_code,
        );
        if !signatures_match(&expected, &notice.signature) {
            return Err(VerificationError::SignatureInvalid);
        }

        Ok(PaymentNotice {
            id: NoticeId::new(),
            registration_id,
            transaction_id: transaction_id.to_string(),
            amount,
            currency: notice.currency.trim().to_string(),
            status_code,
            signature: notice.signature.trim().to_string(),
            method: notice.method.clone(),
            message: notice.status_message.clone(),
            received_at,
        })
    }
}

impl fmt::Debug for NoticeVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoticeVerifier")
            .field("merchant_id", &self.merchant_id)
            .field("secret_digest", &"<redacted>")
            .finish()
    }
}

/// Durable record of one inbound notice and what became of it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeAuditEntry {
    /// Entry ID
    pub id: Uuid,
    /// Registration named by the notice, when the order id parsed
    pub registration_id: Option<RegistrationId>,
    /// Gateway transaction id as received
    pub transaction_id: String,
    /// Status code as received
    pub status_code: String,
    /// What happened to the notice
    pub outcome: NoticeOutcome,
    /// Error or transition detail
    pub detail: Option<String>,
    /// The raw notice
    pub payload: GatewayNotice,
    /// When the notice arrived
    pub received_at: DateTime<Utc>,
}

impl NoticeAuditEntry {
    /// Builds an entry for `notice`.
    #[must_use]
    pub fn new(
        notice: &GatewayNotice,
        outcome: NoticeOutcome,
        detail: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            registration_id: notice.order_id.parse().ok(),
            transaction_id: notice.payment_id.clone(),
            status_code: notice.status_code.clone(),
            outcome,
            detail,
            payload: notice.clone(),
            received_at,
        }
    }
}
