use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser, OptionalAuthUser};
use crate::entities::review;
use crate::errors::ServiceError;
use crate::handlers::common::{created, no_content, ok, paged};
use crate::services::reviews::{
    CreateReviewInput, ModerateReviewInput, RatingSummary, ReviewListQuery,
};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

pub fn reviews_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews).post(create_review))
        .route("/summary/:product_id", get(rating_summary))
        .route("/:id", put(moderate_review).delete(delete_review))
}

/// List approved reviews, optionally for one product
#[utoipa::path(
    get,
    path = "/api/reviews",
    params(ReviewListQuery),
    responses(
        (status = 200, description = "Reviews page", body = ApiResponse<PaginatedResponse<review::Model>>)
    ),
    tag = "Reviews"
)]
pub async fn list_reviews(
    OptionalAuthUser(user): OptionalAuthUser,
    State(state): State<AppState>,
    Query(query): Query<ReviewListQuery>,
) -> ApiResult<PaginatedResponse<review::Model>> {
    Ok(paged(
        state.services.reviews.list_reviews(user.as_ref(), query).await?,
    ))
}

/// Average rating over approved reviews of a product
#[utoipa::path(
    get,
    path = "/api/reviews/summary/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Rating summary", body = ApiResponse<RatingSummary>)
    ),
    tag = "Reviews"
)]
pub async fn rating_summary(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<RatingSummary> {
    Ok(ok(state.services.reviews.rating_summary(product_id).await?))
}

/// Submit a review; it is published once approved
#[utoipa::path(
    post,
    path = "/api/reviews",
    request_body = CreateReviewInput,
    responses(
        (status = 201, description = "Review submitted", body = ApiResponse<review::Model>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Already reviewed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reviews"
)]
pub async fn create_review(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateReviewInput>,
) -> Result<(StatusCode, Json<ApiResponse<review::Model>>), ServiceError> {
    let review = state.services.reviews.create_review(&user, payload).await?;
    Ok(created(review))
}

/// Approve or hide a review
#[utoipa::path(
    put,
    path = "/api/reviews/{id}",
    params(("id" = Uuid, Path, description = "Review id")),
    request_body = ModerateReviewInput,
    responses(
        (status = 200, description = "Review moderated", body = ApiResponse<review::Model>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reviews"
)]
pub async fn moderate_review(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ModerateReviewInput>,
) -> ApiResult<review::Model> {
    Ok(ok(state.services.reviews.moderate_review(&admin, id, payload).await?))
}

/// Delete a review (author or admin)
#[utoipa::path(
    delete,
    path = "/api/reviews/{id}",
    params(("id" = Uuid, Path, description = "Review id")),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 403, description = "Not your review", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reviews"
)]
pub async fn delete_review(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.reviews.delete_review(&user, id).await?;
    Ok(no_content())
}
