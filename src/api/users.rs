//! User profile endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use super::{error, success, ApiResult};
use crate::auth::Caller;
use crate::models::{
    ProfileStats, ProfileView, PublicProfile, UpdateLocationRequest, UpdateProfileRequest,
    UpsertProfileRequest, User,
};
use crate::AppState;

fn profile_view(state: &AppState, user: User) -> ProfileView {
    let stats = ProfileStats::compute(&user, state.repo.deferral_policy(), Utc::now());
    ProfileView { user, stats }
}

/// GET /api/users/me - The caller's profile with derived stats.
pub async fn get_me(State(state): State<AppState>, caller: Caller) -> ApiResult<ProfileView> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.require_user(caller.subject()).await {
        Ok(user) => success(profile_view(&state, user), revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/users/me - Onboarding create-or-update.
pub async fn upsert_me(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<UpsertProfileRequest>,
) -> ApiResult<ProfileView> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.upsert_profile(&caller, &request).await {
        Ok(user) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(profile_view(&state, user), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PATCH /api/users/me - Partial profile update.
pub async fn update_me(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<ProfileView> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.update_profile(&caller, &request).await {
        Ok(user) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(profile_view(&state, user), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/users/me/location - Store a fresh location fix.
pub async fn update_my_location(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<UpdateLocationRequest>,
) -> ApiResult<ProfileView> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.update_location(&caller, &request).await {
        Ok(user) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(profile_view(&state, user), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/users/:subject - Public view of another user.
pub async fn get_user(
    State(state): State<AppState>,
    Path(subject): Path<String>,
) -> ApiResult<PublicProfile> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.require_user(&subject).await {
        Ok(user) => success(PublicProfile::from(user), revision_id),
        Err(e) => error(e, revision_id),
    }
}
