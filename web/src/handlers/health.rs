//! Health check endpoints.
//!
//! Used by load balancers and orchestrators to probe the service.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

/// Readiness report.
#[derive(Debug, Serialize)]
pub struct Readiness {
    /// `ready` or `unavailable`
    pub status: &'static str,
    /// Why the service is not ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Liveness check. Does not touch the database.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness check: 200 when the seat store answers a ping, 503 otherwise.
///
/// ```text
/// GET /ready
/// ```
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    match state.engine().store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(Readiness {
                status: "ready",
                message: None,
            }),
        ),
        Err(error) => {
            tracing::warn!(%error, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Readiness {
                    status: "unavailable",
                    message: Some(error.to_string()),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
