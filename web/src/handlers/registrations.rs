//! Registration endpoints: allocate, fetch and reschedule.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use exam_seating_core::types::{
    IndexNumber, LocationId, OfferingId, Registration, RegistrationId, RegistrationStatus,
    StudentId,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/offerings/:id/registrations`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// Student asking for a seat
    pub student_id: StudentId,
}

/// Body of `POST /api/registrations/:id/reschedule`.
#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    /// Offering to move to
    pub offering_id: OfferingId,
}

/// Registration as returned to clients.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistrationResponse {
    /// Registration id (the gateway order id)
    pub id: RegistrationId,
    /// Human-facing index number
    pub index_number: IndexNumber,
    /// Offering the seat is held on
    pub offering_id: OfferingId,
    /// Assigned location
    pub location_id: Option<LocationId>,
    /// Lifecycle status
    pub status: RegistrationStatus,
}

impl From<Registration> for RegistrationResponse {
    fn from(registration: Registration) -> Self {
        Self {
            id: registration.id,
            index_number: registration.index_number,
            offering_id: registration.offering_id,
            location_id: registration.assigned_location,
            status: registration.status,
        }
    }
}

/// Allocates a seat for a student.
///
/// ```text
/// POST /api/offerings/:offering_id/registrations
/// ```
///
/// # Errors
///
/// 409 on duplicate registration or exhausted capacity, 404 on unknown
/// offering, 422 when the offering no longer accepts registrations and 503
/// when the seat store stayed locked through every retry.
pub async fn register(
    State(state): State<AppState>,
    Path(offering_id): Path<OfferingId>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegistrationResponse>), AppError> {
    let registration = state
        .engine()
        .allocator()
        .allocate(request.student_id, offering_id)
        .await?;
    Ok((StatusCode::CREATED, Json(registration.into())))
}

/// Returns the current registration.
///
/// ```text
/// GET /api/registrations/:registration_id
/// ```
///
/// # Errors
///
/// 404 if the registration does not exist.
pub async fn get_registration(
    State(state): State<AppState>,
    Path(registration_id): Path<RegistrationId>,
) -> Result<Json<Registration>, AppError> {
    state
        .engine()
        .store()
        .registration(registration_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Registration", registration_id))
}

/// Moves a registration to another offering of the same exam.
///
/// ```text
/// POST /api/registrations/:registration_id/reschedule
/// ```
///
/// # Errors
///
/// Same mapping as [`register`], plus 422 when the registration cannot move.
pub async fn reschedule(
    State(state): State<AppState>,
    Path(registration_id): Path<RegistrationId>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<RegistrationResponse>, AppError> {
    let registration = state
        .engine()
        .allocator()
        .reschedule(registration_id, request.offering_id)
        .await?;
    Ok(Json(registration.into()))
}
