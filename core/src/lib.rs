//! # Exam Seating Core
//!
//! Domain types and pure logic for exam seat allocation and the
//! payment-driven registration lifecycle.
//!
//! Nothing in this crate performs I/O. Storage is described by the
//! [`store::SeatStore`] / [`store::SeatTransaction`] traits and implemented
//! by the `postgres` and `testing` crates; the `runtime` crate drives the
//! logic here against a store.
//!
//! ## Core Concepts
//!
//! - **Capacity**: per (offering, location) occupancy, only changed through
//!   `reserve` / `release`
//! - **Allocation**: first-fit over a priority-ordered snapshot
//! - **Lifecycle**: a [`reducer::Reducer`] over a registration, driven by
//!   verified gateway notices
//! - **Effect**: descriptions of the writes a transition needs, executed by
//!   the runtime inside the same transaction
//! - **Environment**: injected dependencies ([`environment::Clock`])
//!
//! ## Example
//!
//! ```ignore
//! use exam_seating_core::lifecycle::{LifecycleAction, LifecycleReducer};
//! use exam_seating_core::reducer::Reducer;
//!
//! let effects = LifecycleReducer::new().reduce(
//!     &mut state,
//!     LifecycleAction::ApplyPayment { notice: Box::new(notice) },
//!     &env,
//! );
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

pub mod allocation;
pub mod capacity;
pub mod lifecycle;
pub mod revenue;
pub mod store;
pub mod types;
pub mod verification;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values, not execution. The runtime executes them in order,
/// inside the transaction that produced them.
pub mod effect {
    use crate::types::{
        LocationId, NotificationRequest, OfferingId, PaymentNotice, Registration, RevenueEntry,
    };

    /// A write requested by a reducer.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Effect {
        /// No-op effect
        None,

        /// Give back one seat at (offering, location)
        ReleaseSeat {
            /// Offering the seat belongs to
            offering_id: OfferingId,
            /// Location the seat belongs to
            location_id: LocationId,
        },

        /// Take a seat with first-fit over the offering's priority list.
        ///
        /// The runtime feeds back `SeatReacquired`, or `SeatUnavailable` when
        /// the offering is closed or full.
        ReacquireSeat {
            /// Offering to search
            offering_id: OfferingId,
            /// Notice that triggered the attempt
            notice: Box<PaymentNotice>,
        },

        /// Persist the registration's new status and placement
        PersistRegistration(Box<Registration>),

        /// Append a revenue ledger entry (no-op if one with that status exists)
        RecordRevenue(Box<RevenueEntry>),

        /// Write a notification request to the outbox
        Notify(Box<NotificationRequest>),
    }

    impl Effect {
        /// Whether the effect does nothing.
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Self::None)
        }
    }
}

/// Environment module - Dependency injection traits
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
