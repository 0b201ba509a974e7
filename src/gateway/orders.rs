//! Order handlers. Customers place and read their own orders; admins see all
//! and drive kitchen status.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;

use super::{failure, require_admin, require_user, success, ApiResponse, AppState};
use crate::auth::Role;
use crate::orders::{NewOrderItem, OrderStatus, StatusUpdate};

const MAX_ITEMS_PER_ORDER: usize = 50;
const MAX_QUANTITY_PER_ITEM: u32 = 50;

#[derive(Deserialize)]
pub(crate) struct CreateOrderBody {
    items: Vec<NewOrderItem>,
}

/// POST /api/v1/orders
pub(crate) async fn handle_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateOrderBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let user = match require_user(&state, &headers).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return failure(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}")),
    };
    if body.items.is_empty() || body.items.len() > MAX_ITEMS_PER_ORDER {
        return failure(StatusCode::BAD_REQUEST, "Order must contain between 1 and 50 items");
    }
    if body
        .items
        .iter()
        .any(|item| item.quantity == 0 || item.quantity > MAX_QUANTITY_PER_ITEM)
    {
        return failure(StatusCode::BAD_REQUEST, "Item quantity must be between 1 and 50");
    }

    match state.orders.create(&user.id, &body.items) {
        Ok(Some(order)) => success(
            StatusCode::CREATED,
            "Order placed",
            Some(serde_json::json!({ "order": order })),
        ),
        Ok(None) => failure(
            StatusCode::BAD_REQUEST,
            "One or more dishes are unknown or unavailable",
        ),
        Err(e) => {
            tracing::error!(error = %e, "order creation failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /api/v1/orders — own for customers, all for admins.
pub(crate) async fn handle_list(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    let user = match require_user(&state, &headers).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let listing = if user.role == Role::Admin {
        state.orders.list_all()
    } else {
        state.orders.list_for_user(&user.id)
    };
    match listing {
        Ok(orders) => success(
            StatusCode::OK,
            "Orders retrieved",
            Some(serde_json::json!({ "orders": orders })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "order listing failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /api/v1/orders/{order_id} — owner or admin.
pub(crate) async fn handle_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResponse {
    let user = match require_user(&state, &headers).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match state.orders.get(&order_id) {
        // Not-found and not-yours are deliberately the same response.
        Ok(Some(order)) if order.user_id == user.id || user.role == Role::Admin => success(
            StatusCode::OK,
            "Order retrieved",
            Some(serde_json::json!({ "order": order })),
        ),
        Ok(_) => failure(StatusCode::NOT_FOUND, "Order not found"),
        Err(e) => {
            tracing::error!(error = %e, "order lookup failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct StatusBody {
    status: OrderStatus,
}

/// PUT /api/v1/orders/{order_id}/status (admin)
pub(crate) async fn handle_set_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    body: Result<Json<StatusBody>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return failure(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}")),
    };

    match state.orders.set_status(&order_id, body.status) {
        Ok(StatusUpdate::Updated(order)) => success(
            StatusCode::OK,
            "Order updated",
            Some(serde_json::json!({ "order": order })),
        ),
        Ok(StatusUpdate::NotFound) => failure(StatusCode::NOT_FOUND, "Order not found"),
        Ok(StatusUpdate::IllegalTransition(from)) => failure(
            StatusCode::BAD_REQUEST,
            &format!("Cannot move a {} order to {}", from.as_str(), body.status.as_str()),
        ),
        Err(e) => {
            tracing::error!(error = %e, "order status update failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
