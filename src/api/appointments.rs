//! Appointment endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use super::{error, success, ApiResult};
use crate::auth::Caller;
use crate::models::{upcoming_slots, Appointment, BookAppointmentRequest, DaySlots};
use crate::AppState;

/// GET /api/appointments/slots - Bookable slots for the coming week.
pub async fn list_slots(State(state): State<AppState>) -> ApiResult<Vec<DaySlots>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    success(upcoming_slots(Utc::now()), revision_id)
}

/// GET /api/appointments - The caller's appointments.
pub async fn list_appointments(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<Appointment>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_appointments(caller.subject()).await {
        Ok(appointments) => success(appointments, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/appointments - Book an appointment.
pub async fn book_appointment(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<BookAppointmentRequest>,
) -> ApiResult<Appointment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.book_appointment(&caller, &request).await {
        Ok(appointment) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(appointment, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/appointments/:id/cancel - Cancel a scheduled appointment.
pub async fn cancel_appointment(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Appointment> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.cancel_appointment(&caller, &id).await {
        Ok(appointment) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(appointment, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
