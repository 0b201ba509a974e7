//! Dish catalogue handlers. Reads are public; writes are admin-only.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;

use super::{failure, require_admin, success, ApiResponse, AppState};
use crate::menu::{Category, DishFilter, NewDish};

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    category: Option<String>,
    available: Option<bool>,
}

/// GET /api/v1/dishes
pub(crate) async fn handle_list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResponse {
    let category = match query.category.as_deref() {
        Some(raw) => match Category::parse(raw) {
            Some(c) => Some(c),
            None => return failure(StatusCode::BAD_REQUEST, "Unknown category"),
        },
        None => None,
    };
    let filter = DishFilter {
        category,
        available_only: query.available.unwrap_or(false),
    };

    match state.dishes.list(filter) {
        Ok(dishes) => success(
            StatusCode::OK,
            "Dishes retrieved",
            Some(serde_json::json!({ "dishes": dishes })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "dish listing failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /api/v1/dishes/{dish_id}
pub(crate) async fn handle_get(
    State(state): State<AppState>,
    Path(dish_id): Path<String>,
) -> ApiResponse {
    match state.dishes.get(&dish_id) {
        Ok(Some(dish)) => success(
            StatusCode::OK,
            "Dish retrieved",
            Some(serde_json::json!({ "dish": dish })),
        ),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Dish not found"),
        Err(e) => {
            tracing::error!(error = %e, "dish lookup failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn validate_dish(new: &NewDish) -> Option<&'static str> {
    if new.name.trim().len() < 2 {
        return Some("Dish name must be at least 2 characters");
    }
    if new.description.trim().is_empty() {
        return Some("Description is required");
    }
    if !new.price.is_finite() || new.price < 0.0 {
        return Some("Price cannot be negative");
    }
    None
}

/// POST /api/v1/dishes (admin)
pub(crate) async fn handle_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewDish>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return failure(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}")),
    };
    if let Some(message) = validate_dish(&body) {
        return failure(StatusCode::BAD_REQUEST, message);
    }

    match state.dishes.create(body) {
        Ok(dish) => success(
            StatusCode::CREATED,
            "Dish created",
            Some(serde_json::json!({ "dish": dish })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "dish creation failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// PUT /api/v1/dishes/{dish_id} (admin)
pub(crate) async fn handle_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(dish_id): Path<String>,
    body: Result<Json<NewDish>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return failure(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}")),
    };
    if let Some(message) = validate_dish(&body) {
        return failure(StatusCode::BAD_REQUEST, message);
    }

    match state.dishes.update(&dish_id, body) {
        Ok(Some(dish)) => success(
            StatusCode::OK,
            "Dish updated",
            Some(serde_json::json!({ "dish": dish })),
        ),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Dish not found"),
        Err(e) => {
            tracing::error!(error = %e, "dish update failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// DELETE /api/v1/dishes/{dish_id} (admin)
pub(crate) async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(dish_id): Path<String>,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers).await {
        return resp;
    }
    match state.dishes.delete(&dish_id) {
        Ok(true) => success(StatusCode::OK, "Dish deleted", None),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Dish not found"),
        Err(e) => {
            tracing::error!(error = %e, "dish deletion failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
