//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use exam_seating_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion = Box<dyn FnOnce(&[Effect])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use exam_seating_testing::ReducerTest;
///
/// ReducerTest::new(LifecycleReducer::new())
///     .with_env(test_environment())
///     .given_state(pending_state())
///     .when_action(LifecycleAction::ApplyPayment { notice })
///     .then_state(|state| {
///         assert_eq!(state.registration.status, RegistrationStatus::Registered);
///     })
///     .then_effects(|effects| {
///         assertions::assert_records_revenue(effects);
///     })
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to test (When)
    ///
    /// Actions run in order; effect assertions see the effects of the last one.
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(!self.actions.is_empty(), "Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let mut effects = smallvec::SmallVec::<[Effect; 4]>::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env);
        }

        // Run state assertions
        for assertion in self.state_assertions {
            assertion(&state);
        }

        // Run effect assertions
        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use exam_seating_core::effect::Effect;
    use exam_seating_core::types::RevenueStatus;

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects(effects: &[Effect]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count(effects: &[Effect], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}: {:?}",
            expected,
            effects.len(),
            effects
        );
    }

    /// Assert that exactly one seat is released
    ///
    /// # Panics
    ///
    /// Panics unless there is exactly one `ReleaseSeat` effect.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_releases_one_seat(effects: &[Effect]) {
        let releases = effects
            .iter()
            .filter(|e| matches!(e, Effect::ReleaseSeat { .. }))
            .count();
        assert_eq!(releases, 1, "Expected one ReleaseSeat effect in {effects:?}");
    }

    /// Assert that no seat is released
    ///
    /// # Panics
    ///
    /// Panics if a `ReleaseSeat` effect is present.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_keeps_seat(effects: &[Effect]) {
        assert!(
            !effects.iter().any(|e| matches!(e, Effect::ReleaseSeat { .. })),
            "Expected no ReleaseSeat effect in {effects:?}"
        );
    }

    /// Assert that exactly one revenue entry with `status` is recorded
    ///
    /// # Panics
    ///
    /// Panics unless there is exactly one matching `RecordRevenue` effect.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_records_revenue(effects: &[Effect], status: RevenueStatus) {
        let entries = effects
            .iter()
            .filter(|e| matches!(e, Effect::RecordRevenue(entry) if entry.status == status))
            .count();
        assert_eq!(entries, 1, "Expected one {status:?} revenue entry in {effects:?}");
    }

    /// Assert that no revenue is recorded
    ///
    /// # Panics
    ///
    /// Panics if a `RecordRevenue` effect is present.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_revenue(effects: &[Effect]) {
        assert!(
            !effects.iter().any(|e| matches!(e, Effect::RecordRevenue(_))),
            "Expected no RecordRevenue effect in {effects:?}"
        );
    }

    /// Assert that a notification request is written
    ///
    /// # Panics
    ///
    /// Panics if no `Notify` effect is present.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_notifies(effects: &[Effect]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Notify(_))),
            "Expected a Notify effect in {effects:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_seating_core::types::{LocationId, OfferingId};
    use smallvec::{smallvec, SmallVec};

    #[derive(Clone, Debug)]
    struct TestState {
        held: u32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Take,
        Give,
    }

    struct TestReducer;

    struct TestEnv {
        offering_id: OfferingId,
        location_id: LocationId,
    }

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect; 4]> {
            match action {
                TestAction::Take => {
                    state.held += 1;
                    smallvec![Effect::None]
                }
                TestAction::Give => {
                    state.held = state.held.saturating_sub(1);
                    smallvec![Effect::ReleaseSeat {
                        offering_id: env.offering_id,
                        location_id: env.location_id,
                    }]
                }
            }
        }
    }

    fn env() -> TestEnv {
        TestEnv {
            offering_id: OfferingId::new(),
            location_id: LocationId::new(),
        }
    }

    #[test]
    fn test_reducer_test_single_action() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { held: 0 })
            .when_action(TestAction::Take)
            .then_state(|state| {
                assert_eq!(state.held, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_action_sequence() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { held: 0 })
            .when_action(TestAction::Take)
            .when_action(TestAction::Give)
            .then_state(|state| {
                assert_eq!(state.held, 0);
            })
            .then_effects(|effects| {
                assertions::assert_releases_one_seat(effects);
            })
            .run();
    }

    #[test]
    fn test_assertions_effects_count() {
        assertions::assert_effects_count(&[Effect::None], 1);
        assertions::assert_effects_count(&[], 0);
        assertions::assert_no_effects(&[]);
    }
}
