//! Donation history endpoints.

use axum::{extract::State, Json};

use super::{error, success, ApiResult};
use crate::auth::Caller;
use crate::models::{Donation, LogDonationRequest, LoggedDonation};
use crate::AppState;

/// GET /api/donations - The caller's donation history.
pub async fn list_donations(State(state): State<AppState>, caller: Caller) -> ApiResult<Vec<Donation>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_donations(caller.subject()).await {
        Ok(donations) => success(donations, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/donations - Log a donation made elsewhere.
pub async fn log_donation(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<LogDonationRequest>,
) -> ApiResult<LoggedDonation> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.log_donation(&caller, &request).await {
        Ok(logged) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(logged, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
