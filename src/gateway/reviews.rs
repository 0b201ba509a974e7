//! Review handlers.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};

use super::{failure, require_user, success, ApiResponse, AppState};
use crate::auth::Role;
use crate::reviews::{CreateReview, NewReview};

const MAX_COMMENT_LEN: usize = 1000;

/// POST /api/v1/reviews
pub(crate) async fn handle_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<NewReview>, axum::extract::rejection::JsonRejection>,
) -> ApiResponse {
    let user = match require_user(&state, &headers).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return failure(StatusCode::BAD_REQUEST, &format!("Invalid request: {e}")),
    };
    if !(1..=5).contains(&body.rating) {
        return failure(StatusCode::BAD_REQUEST, "Rating must be between 1 and 5");
    }
    if body.comment.len() > MAX_COMMENT_LEN {
        return failure(StatusCode::BAD_REQUEST, "Comment cannot exceed 1000 characters");
    }

    match state.reviews.create(&user.id, body) {
        Ok(CreateReview::Created(review)) => success(
            StatusCode::CREATED,
            "Review created",
            Some(serde_json::json!({ "review": review })),
        ),
        Ok(CreateReview::Duplicate) => failure(
            StatusCode::BAD_REQUEST,
            "You have already reviewed this dish",
        ),
        Ok(CreateReview::DishMissing) => failure(StatusCode::NOT_FOUND, "Dish not found"),
        Err(e) => {
            tracing::error!(error = %e, "review creation failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// GET /api/v1/dishes/{dish_id}/reviews
pub(crate) async fn handle_list_for_dish(
    State(state): State<AppState>,
    Path(dish_id): Path<String>,
) -> ApiResponse {
    match state.reviews.list_for_dish(&dish_id) {
        Ok(reviews) => success(
            StatusCode::OK,
            "Reviews retrieved",
            Some(serde_json::json!({ "reviews": reviews })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "review listing failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// DELETE /api/v1/reviews/{review_id} — owner or admin.
pub(crate) async fn handle_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(review_id): Path<String>,
) -> ApiResponse {
    let user = match require_user(&state, &headers).await {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match state
        .reviews
        .delete(&review_id, &user.id, user.role == Role::Admin)
    {
        Ok(true) => success(StatusCode::OK, "Review deleted", None),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Review not found"),
        Err(e) => {
            tracing::error!(error = %e, "review deletion failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
