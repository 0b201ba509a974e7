//! Reservation handlers. Customers manage their own; admins see all and
//! drive status transitions.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use super::{failure, require_admin, require_user, success, ApiResponse, AppState};
use crate::auth::Role;
use crate::reservations::{CancelOutcome, NewReservation, ReservationStatus, StatusUpdate};

fn validate_reservation(new: &NewReservation) -> Option<&'static str> {
    if NaiveDate::parse_from_str(&new.date, "%Y-%m-%d").is_err() {
        return Some("Date must be YYYY-MM-DD");
    }
    if NaiveTime::parse_from_str(&new.time, "%H:%M").is_err() {
        return Some("Time must be HH:MM");
    }
    if new.guests == 0 || new.guests > 20 {
        return Some("Guests must be between 1 and 20");
    }
    if new.customer_name.trim().len() < 2 {
        return Some("Customer name must be at least 2 characters");
    }
    if new.customer_phone.trim().is_empty() {
        return Some("Customer phone is required");
    }
    None
}

/// POST /api/v1/reservations
pub(crate) async fn handle_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewReservation>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let user = match require_user(&state, &headers).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return failure(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}")),
    };
    if let Some(message) = validate_reservation(&body) {
        return failure(StatusCode::BAD_REQUEST, message);
    }

    match state.reservations.create(&user.id, body) {
        Ok(reservation) => success(
            StatusCode::CREATED,
            "Reservation created",
            Some(serde_json::json!({ "reservation": reservation })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "reservation creation failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /api/v1/reservations — own for customers, all for admins.
pub(crate) async fn handle_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResponse {
    let user = match require_user(&state, &headers).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let listing = if user.role == Role::Admin {
        state.reservations.list_all()
    } else {
        state.reservations.list_for_user(&user.id)
    };
    match listing {
        Ok(reservations) => success(
            StatusCode::OK,
            "Reservations retrieved",
            Some(serde_json::json!({ "reservations": reservations })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "reservation listing failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct StatusBody {
    status: ReservationStatus,
}

/// PUT /api/v1/reservations/{reservation_id}/status (admin)
pub(crate) async fn handle_set_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(reservation_id): Path<String>,
    body: Result<Json<StatusBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return failure(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}")),
    };

    match state.reservations.set_status(&reservation_id, body.status) {
        Ok(StatusUpdate::Updated(reservation)) => success(
            StatusCode::OK,
            "Reservation updated",
            Some(serde_json::json!({ "reservation": reservation })),
        ),
        Ok(StatusUpdate::NotFound) => failure(StatusCode::NOT_FOUND, "Reservation not found"),
        Ok(StatusUpdate::IllegalTransition(from)) => failure(
            StatusCode::BAD_REQUEST,
            &format!("Cannot move a {} reservation to {}", from.as_str(), body.status.as_str()),
        ),
        Err(e) => {
            tracing::error!(error = %e, "reservation status update failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// DELETE /api/v1/reservations/{reservation_id} — owner cancellation.
pub(crate) async fn handle_cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(reservation_id): Path<String>,
) -> ApiResponse {
    let user = match require_user(&state, &headers).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match state.reservations.cancel_own(&reservation_id, &user.id) {
        Ok(CancelOutcome::Cancelled(reservation)) => success(
            StatusCode::OK,
            "Reservation cancelled",
            Some(serde_json::json!({ "reservation": reservation })),
        ),
        Ok(CancelOutcome::NotFound) => failure(StatusCode::NOT_FOUND, "Reservation not found"),
        Ok(CancelOutcome::NotCancellable(status)) => failure(
            StatusCode::BAD_REQUEST,
            &format!("A {} reservation cannot be cancelled", status.as_str()),
        ),
        Err(e) => {
            tracing::error!(error = %e, "reservation cancellation failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
