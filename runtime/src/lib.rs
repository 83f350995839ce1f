//! # Exam Seating Runtime
//!
//! Drives the pure logic of `exam-seating-core` against a
//! [`SeatStore`](exam_seating_core::store::SeatStore).
//!
//! ## Core Components
//!
//! - **Allocator**: first-fit seat reservation and reschedule
//! - **`PaymentProcessor`**: verify, then apply gateway notices in one transaction
//! - **`LifecycleController`**: executes reducer effects and feeds actions back
//! - **Sweeper**: offering completion and pending-hold expiry
//! - **`LocationAdmin`**: capacity changes and location deletion
//!
//! Every store transaction that can hit a lock timeout is re-run through
//! [`retry::retry_with_predicate`].
//!
//! ## Example
//!
//! ```ignore
//! use exam_seating_runtime::{Engine, EngineConfig};
//!
//! let engine = Engine::new(store, clock, verifier, EngineConfig::default());
//! let registration = engine.allocator().allocate(student_id, offering_id).await?;
//! let outcome = engine.payments().process(notice).await;
//! ```

use exam_seating_core::allocation::DEFAULT_INDEX_PREFIX;
use exam_seating_core::environment::Clock;
use exam_seating_core::lifecycle::LifecycleEnvironment;
use exam_seating_core::store::SeatStore;
use exam_seating_core::types::CommissionRate;
use exam_seating_core::verification::NoticeVerifier;
use std::sync::Arc;

/// Seat allocation and reschedule
pub mod allocator;

/// Location administration
pub mod capacity;

/// Effect execution for the registration lifecycle
pub mod lifecycle;

/// Prometheus metrics for observability
pub mod metrics;

/// Gateway payment-notice processing
pub mod payments;

/// Retry logic with exponential backoff
pub mod retry;

/// Periodic housekeeping
pub mod sweeper;

pub use allocator::Allocator;
pub use capacity::LocationAdmin;
pub use lifecycle::{EffectSummary, LifecycleController};
pub use payments::{NoticeError, PaymentProcessor};
pub use retry::RetryPolicy;
pub use sweeper::{SweepReport, Sweeper};

/// Tunables shared by the runtime services.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prefix of generated index numbers
    pub index_prefix: String,
    /// Commission for exams without their own rate
    pub default_commission: CommissionRate,
    /// How long a `pending` registration may hold its seat
    pub pending_hold: chrono::Duration,
    /// Lock-timeout retry policy
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            default_commission: CommissionRate::DEFAULT,
            pending_hold: chrono::Duration::hours(sweeper::DEFAULT_PENDING_HOLD_HOURS),
            retry: RetryPolicy::default(),
        }
    }
}

/// All runtime services over one store.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn SeatStore>,
    allocator: Allocator,
    payments: PaymentProcessor,
    sweeper: Arc<Sweeper>,
    locations: LocationAdmin,
}

impl Engine {
    /// Wires the services together.
    #[must_use]
    pub fn new(
        store: Arc<dyn SeatStore>,
        clock: Arc<dyn Clock>,
        verifier: NoticeVerifier,
        config: EngineConfig,
    ) -> Self {
        let controller = LifecycleController::new(LifecycleEnvironment::new(
            Arc::clone(&clock),
            config.default_commission,
        ));

        let allocator = Allocator::new(Arc::clone(&store), Arc::clone(&clock))
            .with_index_prefix(config.index_prefix)
            .with_retry_policy(config.retry.clone());
        let payments = PaymentProcessor::new(
            Arc::clone(&store),
            verifier,
            controller.clone(),
            Arc::clone(&clock),
        )
        .with_retry_policy(config.retry.clone());
        let sweeper = Sweeper::new(Arc::clone(&store), controller, clock)
            .with_pending_hold(config.pending_hold)
            .with_retry_policy(config.retry.clone());
        let locations = LocationAdmin::new(Arc::clone(&store)).with_retry_policy(config.retry);

        Self {
            store,
            allocator,
            payments,
            sweeper: Arc::new(sweeper),
            locations,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SeatStore> {
        &self.store
    }

    /// Seat allocation and reschedule.
    #[must_use]
    pub const fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    /// Gateway notice processing.
    #[must_use]
    pub const fn payments(&self) -> &PaymentProcessor {
        &self.payments
    }

    /// Housekeeping jobs.
    #[must_use]
    pub fn sweeper(&self) -> Arc<Sweeper> {
        Arc::clone(&self.sweeper)
    }

    /// Location administration.
    #[must_use]
    pub const fn locations(&self) -> &LocationAdmin {
        &self.locations
    }
}
