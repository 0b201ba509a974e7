//! Coupon handlers. Reads are public; create/deactivate are admin-only.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};

use super::{failure, require_admin, success, ApiResponse, AppState};
use crate::coupons::NewCoupon;

/// POST /api/v1/coupons (admin)
pub(crate) async fn handle_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewCoupon>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return failure(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}")),
    };
    let code = body.code.trim();
    if code.len() < 3 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return failure(
            StatusCode::BAD_REQUEST,
            "Coupon code must be at least 3 alphanumeric characters",
        );
    }

    match state.coupons.create(body) {
        Ok(Some(coupon)) => success(
            StatusCode::CREATED,
            "Coupon created",
            Some(serde_json::json!({ "coupon": coupon })),
        ),
        Ok(None) => failure(StatusCode::BAD_REQUEST, "Coupon code already exists"),
        Err(e) => {
            tracing::error!(error = %e, "coupon creation failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /api/v1/coupons — active, unexpired coupons.
pub(crate) async fn handle_list_active(State(state): State<AppState>) -> ApiResponse {
    match state.coupons.list_active() {
        Ok(coupons) => success(
            StatusCode::OK,
            "Coupons retrieved",
            Some(serde_json::json!({ "coupons": coupons })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "coupon listing failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /api/v1/coupons/{code}
pub(crate) async fn handle_get(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResponse {
    match state.coupons.find(&code) {
        Ok(Some(coupon)) => success(
            StatusCode::OK,
            "Coupon retrieved",
            Some(serde_json::json!({ "coupon": coupon })),
        ),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Coupon not found"),
        Err(e) => {
            tracing::error!(error = %e, "coupon lookup failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// PUT /api/v1/coupons/{coupon_id}/deactivate (admin)
pub(crate) async fn handle_deactivate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(coupon_id): Path<String>,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state.coupons.deactivate(&coupon_id) {
        Ok(true) => success(StatusCode::OK, "Coupon deactivated", None),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Coupon not found"),
        Err(e) => {
            tracing::error!(error = %e, "coupon deactivation failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
