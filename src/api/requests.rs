//! Blood request board endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::auth::{Caller, MaybeCaller};
use crate::domain::BloodType;
use crate::errors::AppError;
use crate::models::{
    build_board, BloodRequest, CreateBloodRequest, FulfillmentReceipt, RequestListQuery,
    RequestWithDistance, UpdateBloodRequest, UpdateRequestStatus,
};
use crate::AppState;

/// GET /api/requests - The board, filtered and searched.
///
/// Browsing works without a signed-in user; `mine` is then empty.
pub async fn list_requests(
    State(state): State<AppState>,
    MaybeCaller(caller): MaybeCaller,
    Query(query): Query<RequestListQuery>,
) -> ApiResult<Vec<RequestWithDistance>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let requests = match state.repo.list_requests().await {
        Ok(requests) => requests,
        Err(e) => return error(e, revision_id),
    };
    let caller_id = caller.as_ref().map(Caller::subject).unwrap_or_default();

    let board = build_board(
        requests,
        query.filter,
        query.q.as_deref(),
        query.viewer(),
        caller_id,
    );
    success(board, revision_id)
}

/// GET /api/requests/by-type/:bloodType - Open requests needing exactly that type.
pub async fn list_requests_by_type(
    State(state): State<AppState>,
    Path(blood_type): Path<String>,
) -> ApiResult<Vec<BloodRequest>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let blood_type: BloodType = match blood_type.parse() {
        Ok(t) => t,
        Err(e) => return error(AppError::from(e), revision_id),
    };

    match state.repo.list_open_requests_by_type(blood_type).await {
        Ok(requests) => success(requests, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/requests/matching - Open requests the caller can donate to, nearest first.
pub async fn list_matching_requests(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<RequestWithDistance>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_matching_requests(&caller).await {
        Ok(requests) => success(requests, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/requests/:id - Get a single request.
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BloodRequest> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_request(&id).await {
        Ok(request) => success(request, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/requests - Post a new request.
pub async fn create_request(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateBloodRequest>,
) -> ApiResult<BloodRequest> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.create_request(&caller, &request).await {
        Ok(created) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(created, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/requests/:id - Edit an open request (creator only).
pub async fn update_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<UpdateBloodRequest>,
) -> ApiResult<BloodRequest> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.update_request(&caller, &id, &request).await {
        Ok(updated) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(updated, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/requests/:id/status - Creator closes a request by hand.
pub async fn update_request_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<UpdateRequestStatus>,
) -> ApiResult<BloodRequest> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .repo
        .set_request_status(&caller, &id, request.is_fulfilled)
        .await
    {
        Ok(updated) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(updated, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/requests/:id - Remove a request (creator only).
pub async fn delete_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.delete_request(&caller, &id).await {
        Ok(()) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/requests/:id/donate - Volunteer to donate and fulfil the request.
pub async fn donate_to_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<FulfillmentReceipt> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.fulfill_request(&caller, &id).await {
        Ok(receipt) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(receipt, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
