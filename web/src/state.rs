//! Shared state for HTTP handlers.

use exam_seating_runtime::Engine;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Engine,
}

impl AppState {
    /// Wraps the runtime services.
    #[must_use]
    pub const fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// The runtime services.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
