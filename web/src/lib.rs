//! Axum HTTP interface for exam seat allocation.
//!
//! Handlers are a thin shell over [`exam_seating_runtime::Engine`]: they parse
//! the request, call one runtime service and map the result (or the domain
//! error, through [`AppError`]) to a response.
//!
//! # Routes
//!
//! ```text
//! GET    /health                               liveness
//! GET    /ready                                readiness (store ping)
//! POST   /api/offerings/:id/registrations      allocate a seat
//! GET    /api/offerings/:id/locations          priority list snapshot
//! GET    /api/registrations/:id                registration
//! POST   /api/registrations/:id/reschedule     move to another offering
//! PUT    /api/locations/:id/capacity           change capacity
//! DELETE /api/locations/:id                    delete an empty location
//! POST   /api/payments/notify                  gateway webhook (form)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use exam_seating_web::{router, AppState};
//!
//! let app = router(AppState::new(engine));
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use middleware::{correlation_id_layer, CorrelationId, CORRELATION_ID_HEADER};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/offerings/:offering_id/registrations",
            post(handlers::registrations::register),
        )
        .route(
            "/offerings/:offering_id/locations",
            get(handlers::locations::priority_list),
        )
        .route(
            "/registrations/:registration_id",
            get(handlers::registrations::get_registration),
        )
        .route(
            "/registrations/:registration_id/reschedule",
            post(handlers::registrations::reschedule),
        )
        .route(
            "/locations/:location_id/capacity",
            put(handlers::locations::set_capacity),
        )
        .route(
            "/locations/:location_id",
            axum::routing::delete(handlers::locations::delete_location),
        )
        .route("/payments/notify", post(handlers::payments::notify));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
