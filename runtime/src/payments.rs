//! Gateway payment-notice processing.
//!
//! A notice goes through two phases:
//!
//! 1. **Verify** - merchant, parse, signature. Failures change nothing and
//!    are written to the audit log.
//! 2. **Apply** - one transaction that locks the registration, dedupes the
//!    notice on `(transaction id, status code)`, runs the lifecycle reducer
//!    and writes the audit entry. Retried on lock timeout.
//!
//! The HTTP adapter always acknowledges the gateway; the returned outcome
//! is for logging and tests. A verified notice that could not be applied
//! because the store failed or stayed locked is audited as
//! `processing_failed` with its raw payload, so it can be replayed.

use crate::lifecycle::{load_state, EffectSummary, LifecycleController};
use crate::metrics::NoticeMetrics;
use crate::retry::{retry_with_predicate, RetryPolicy};
use exam_seating_core::environment::Clock;
use exam_seating_core::lifecycle::{LifecycleAction, LifecycleError, NoticeOutcome};
use exam_seating_core::store::{SeatStore, StoreError};
use exam_seating_core::verification::{
    GatewayNotice, NoticeAuditEntry, NoticeVerifier, VerificationError,
};
use exam_seating_core::types::PaymentNotice;
use exam_seating_core::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Why a notice was not applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NoticeError {
    /// The notice failed verification or names no registration
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// The notice is stale for the registration's state
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The registration stayed locked through every retry
    #[error("registration is locked by another transaction")]
    LockTimeout,

    /// Storage failure
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for NoticeError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::LockTimeout => Self::LockTimeout,
            other => Self::Store(other),
        }
    }
}

impl NoticeError {
    /// Whether the apply phase should be re-run.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout)
    }

    /// Audit outcome for an error that ends processing.
    #[must_use]
    pub const fn outcome(&self) -> NoticeOutcome {
        match self {
            Self::Verification(error) => error.outcome(),
            Self::Lifecycle(_) => NoticeOutcome::Stale,
            Self::LockTimeout | Self::Store(_) => NoticeOutcome::ProcessingFailed,
        }
    }
}

/// What the apply phase committed.
struct Applied {
    outcome: NoticeOutcome,
    stale: Option<LifecycleError>,
    summary: EffectSummary,
}

/// Verifies and applies gateway notices.
#[derive(Clone)]
pub struct PaymentProcessor {
    store: Arc<dyn SeatStore>,
    verifier: NoticeVerifier,
    controller: LifecycleController,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl PaymentProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(
        store: Arc<dyn SeatStore>,
        verifier: NoticeVerifier,
        controller: LifecycleController,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            verifier,
            controller,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the lock-timeout retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Verifies `notice` and applies it to its registration.
    ///
    /// Every notice leaves one audit entry. Only an audit write that still
    /// fails after its own retries is lost, and that is logged as an error.
    ///
    /// # Errors
    ///
    /// - [`NoticeError::Verification`] - bad signature, wrong merchant,
    ///   unparseable fields or unknown registration; nothing changed
    /// - [`NoticeError::Lifecycle`] - stale notice; stored and audited,
    ///   registration unchanged
    /// - [`NoticeError::LockTimeout`] / [`NoticeError::Store`]
    #[tracing::instrument(
        skip(self, notice),
        fields(order_id = %notice.order_id, payment_id = %notice.payment_id, status_code = %notice.status_code)
    )]
    pub async fn process(&self, notice: GatewayNotice) -> Result<NoticeOutcome, NoticeError> {
        let received_at = self.clock.now();

        let verified = match self.verifier.verify(&notice, received_at) {
            Ok(verified) => verified,
            Err(error) => return Err(self.refuse(&notice, error.into(), received_at).await),
        };

        let result = retry_with_predicate(
            self.retry.clone(),
            || self.apply(&notice, verified.clone(), received_at),
            NoticeError::is_retryable,
        )
        .await;

        match result {
            Ok(applied) => {
                applied.summary.record_metrics();
                NoticeMetrics::record(applied.outcome.as_str());
                match applied.stale {
                    Some(error) => {
                        tracing::warn!(%error, "Stale payment notice ignored");
                        Err(error.into())
                    }
                    None => {
                        tracing::info!(outcome = %applied.outcome, "Payment notice processed");
                        Ok(applied.outcome)
                    }
                }
            }
            Err(error) => Err(self.refuse(&notice, error, received_at).await),
        }
    }

    /// Audits a webhook body that could not be read as a notice at all.
    ///
    /// Returns the [`NoticeError`] that was recorded.
    pub async fn reject_unreadable(&self, detail: impl Into<String>) -> NoticeError {
        let error = NoticeError::Verification(VerificationError::Malformed(detail.into()));
        self.refuse(&GatewayNotice::default(), error, self.clock.now())
            .await
    }

    async fn apply(
        &self,
        raw: &GatewayNotice,
        notice: PaymentNotice,
        received_at: DateTime<Utc>,
    ) -> Result<Applied, NoticeError> {
        let mut tx = self.store.begin().await?;

        let registration = tx.lock_registration(notice.registration_id).await?.ok_or_else(|| {
            VerificationError::UnknownRegistration(notice.registration_id.to_string())
        })?;

        if !tx.insert_payment_notice(&notice).await? {
            let entry = NoticeAuditEntry::new(
                raw,
                NoticeOutcome::Duplicate,
                Some("transaction already processed with this status".to_string()),
                received_at,
            );
            tx.record_audit(&entry).await?;
            tx.commit().await?;
            return Ok(Applied {
                outcome: NoticeOutcome::Duplicate,
                stale: None,
                summary: EffectSummary::default(),
            });
        }

        let mut state = load_state(tx.as_mut(), registration).await?;
        let from = state.registration.status;
        let summary = self
            .controller
            .run(
                tx.as_mut(),
                &mut state,
                LifecycleAction::ApplyPayment {
                    notice: Box::new(notice),
                },
            )
            .await?;

        let outcome = state.outcome.unwrap_or(NoticeOutcome::Unchanged);
        let detail = match &state.last_error {
            Some(error) => error.to_string(),
            None => format!("{from} -> {}", state.registration.status),
        };
        let entry = NoticeAuditEntry::new(raw, outcome, Some(detail), received_at);
        tx.record_audit(&entry).await?;
        tx.commit().await?;

        Ok(Applied {
            outcome,
            stale: state.last_error,
            summary,
        })
    }

    /// Audits a notice that was not applied and hands the error back.
    ///
    /// The audit write runs outside the failed transaction and is retried on
    /// lock timeout under the processor's policy.
    async fn refuse(
        &self,
        notice: &GatewayNotice,
        error: NoticeError,
        received_at: DateTime<Utc>,
    ) -> NoticeError {
        let outcome = error.outcome();
        NoticeMetrics::record(outcome.as_str());
        if outcome == NoticeOutcome::ProcessingFailed {
            tracing::error!(%error, "Payment notice could not be applied; audited for replay");
        } else {
            tracing::warn!(%outcome, %error, "Payment notice refused");
        }

        let entry = NoticeAuditEntry::new(notice, outcome, Some(error.to_string()), received_at);
        let audited = retry_with_predicate(
            self.retry.clone(),
            || self.store.record_audit(entry.clone()),
            StoreError::is_retryable,
        )
        .await;
        if let Err(audit_error) = audited {
            tracing::error!(
                error = %audit_error,
                order_id = %notice.order_id,
                payment_id = %notice.payment_id,
                "Failed to audit payment notice"
            );
        }
        error
    }
}
