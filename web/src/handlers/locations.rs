//! Location administration endpoints.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use exam_seating_core::capacity::PriorityList;
use exam_seating_core::types::{Location, LocationId, OfferingId};
use serde::Deserialize;

/// Body of `PUT /api/locations/:id/capacity`.
#[derive(Debug, Deserialize)]
pub struct CapacityRequest {
    /// New number of seats
    pub capacity: u32,
}

/// Snapshot of an offering's locations in priority order.
///
/// ```text
/// GET /api/offerings/:offering_id/locations
/// ```
///
/// # Errors
///
/// 500 on store failure.
pub async fn priority_list(
    State(state): State<AppState>,
    Path(offering_id): Path<OfferingId>,
) -> Result<Json<PriorityList>, AppError> {
    Ok(Json(state.engine().locations().priority_list(offering_id).await?))
}

/// Raises or lowers a location's capacity.
///
/// ```text
/// PUT /api/locations/:location_id/capacity
/// ```
///
/// # Errors
///
/// 422 for zero capacity, 409 when below current occupancy, 404 for an
/// unknown location.
pub async fn set_capacity(
    State(state): State<AppState>,
    Path(location_id): Path<LocationId>,
    Json(request): Json<CapacityRequest>,
) -> Result<Json<Location>, AppError> {
    let location = state
        .engine()
        .locations()
        .set_capacity(location_id, request.capacity)
        .await?;
    Ok(Json(location))
}

/// Deletes a location that holds no seats.
///
/// ```text
/// DELETE /api/locations/:location_id
/// ```
///
/// # Errors
///
/// 409 while any offering still has seats there, 404 for an unknown location.
pub async fn delete_location(
    State(state): State<AppState>,
    Path(location_id): Path<LocationId>,
) -> Result<StatusCode, AppError> {
    state.engine().locations().delete_location(location_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
