//! Error types for web handlers.
//!
//! Domain errors are mapped to HTTP responses here so that handlers can use
//! `?` on runtime calls.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use exam_seating_core::allocation::AllocationError;
use exam_seating_core::capacity::CapacityError;
use exam_seating_core::store::StoreError;
use serde::Serialize;
use std::fmt;

/// Application error returned by handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(Path(id): Path<RegistrationId>) -> Result<Json<Registration>, AppError> {
///     let registration = store.registration(id).await?
///         .ok_or_else(|| AppError::not_found("Registration", id))?;
///     Ok(Json(registration))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: String,
    /// Internal error (logged, never sent to the client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND",
        )
    }

    /// Create a 409 Conflict error with a specific code.
    #[must_use]
    pub fn conflict(message: impl Into<String>, code: &str) -> Self {
        Self::new(StatusCode::CONFLICT, message, code)
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>, code: &str) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message, code)
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, "SERVICE_UNAVAILABLE")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        let message = err.to_string();
        match err {
            AllocationError::DuplicateRegistration => {
                Self::conflict(message, "DUPLICATE_REGISTRATION")
            }
            AllocationError::CapacityExhausted => Self::conflict(message, "CAPACITY_EXHAUSTED"),
            AllocationError::UnknownOffering(_) | AllocationError::UnknownRegistration(_) => {
                Self::new(StatusCode::NOT_FOUND, message, "NOT_FOUND")
            }
            AllocationError::OfferingUnavailable(_) => {
                Self::validation(message, "OFFERING_UNAVAILABLE")
            }
            AllocationError::NotReschedulable(_) => Self::validation(message, "NOT_RESCHEDULABLE"),
            AllocationError::LockTimeout => Self::unavailable("Seat store is busy, try again"),
            AllocationError::Store(store) => store.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout => Self::unavailable("Seat store is busy, try again"),
            StoreError::NotFound(what) => {
                Self::new(StatusCode::NOT_FOUND, format!("{what} not found"), "NOT_FOUND")
            }
            StoreError::Conflict(CapacityError::InvalidCapacity) => {
                Self::validation(CapacityError::InvalidCapacity.to_string(), "INVALID_CAPACITY")
            }
            StoreError::Conflict(conflict @ CapacityError::CapacityBelowOccupancy { .. }) => {
                Self::conflict(conflict.to_string(), "CAPACITY_BELOW_OCCUPANCY")
            }
            StoreError::Conflict(conflict @ CapacityError::LocationOccupied { .. }) => {
                Self::conflict(conflict.to_string(), "LOCATION_OCCUPIED")
            }
            other @ (StoreError::UniqueViolation(_) | StoreError::Database(_)) => {
                Self::internal("An internal error occurred").with_source(other.into())
            }
        }
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}
