//! Payment gateway webhook.

use crate::state::AppState;
use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    Form,
};
use exam_seating_core::verification::GatewayNotice;

/// Receives a gateway payment notice.
///
/// The gateway only needs an acknowledgement, so the response is always
/// `200 OK`; the outcome goes to the audit log. A body that is not a
/// readable form is audited as `malformed`.
///
/// ```text
/// POST /api/payments/notify   (application/x-www-form-urlencoded)
/// ```
pub async fn notify(
    State(state): State<AppState>,
    notice: Result<Form<GatewayNotice>, FormRejection>,
) -> (StatusCode, &'static str) {
    let payments = state.engine().payments();
    match notice {
        Ok(Form(notice)) => {
            let order_id = notice.order_id.clone();
            match payments.process(notice).await {
                Ok(outcome) => tracing::debug!(%order_id, %outcome, "Notice acknowledged"),
                Err(error) => tracing::warn!(%order_id, %error, "Notice not applied"),
            }
        }
        Err(rejection) => {
            let error = payments.reject_unreadable(rejection.body_text()).await;
            tracing::warn!(%error, "Unreadable notice acknowledged");
        }
    }
    (StatusCode::OK, "OK")
}
