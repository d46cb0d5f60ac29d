use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::entities::promo_code;
use crate::errors::ServiceError;
use crate::handlers::common::{created, no_content, ok, paged};
use crate::services::promotions::{
    CreatePromoInput, PromoListQuery, PromoQuote, UpdatePromoInput, ValidatePromoInput,
};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

/// `/api/promo`
pub fn promo_routes() -> Router<AppState> {
    Router::new().route("/validate", post(validate_promo))
}

/// `/api/promo-codes`
pub fn promo_codes_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_promo_codes).post(create_promo_code))
        .route("/:id", put(update_promo_code).delete(delete_promo_code))
}

/// Preview the discount a code gives on a subtotal
#[utoipa::path(
    post,
    path = "/api/promo/validate",
    request_body = ValidatePromoInput,
    responses(
        (status = 200, description = "Code is applicable", body = ApiResponse<PromoQuote>),
        (status = 400, description = "Invalid, expired or ineligible code", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Promotions"
)]
pub async fn validate_promo(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ValidatePromoInput>,
) -> ApiResult<PromoQuote> {
    Ok(ok(state
        .services
        .promotions
        .validate_code(user.user_id, payload)
        .await?))
}

#[utoipa::path(
    get,
    path = "/api/promo-codes",
    params(PromoListQuery),
    responses(
        (status = 200, description = "Promo codes page", body = ApiResponse<PaginatedResponse<promo_code::Model>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Promotions"
)]
pub async fn list_promo_codes(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<PromoListQuery>,
) -> ApiResult<PaginatedResponse<promo_code::Model>> {
    Ok(paged(state.services.promotions.list(query).await?))
}

#[utoipa::path(
    post,
    path = "/api/promo-codes",
    request_body = CreatePromoInput,
    responses(
        (status = 201, description = "Promo code created", body = ApiResponse<promo_code::Model>),
        (status = 409, description = "Code already exists", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Promotions"
)]
pub async fn create_promo_code(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePromoInput>,
) -> Result<(StatusCode, Json<ApiResponse<promo_code::Model>>), ServiceError> {
    Ok(created(state.services.promotions.create(payload).await?))
}

#[utoipa::path(
    put,
    path = "/api/promo-codes/{id}",
    params(("id" = Uuid, Path, description = "Promo code id")),
    request_body = UpdatePromoInput,
    responses(
        (status = 200, description = "Promo code updated", body = ApiResponse<promo_code::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Promotions"
)]
pub async fn update_promo_code(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePromoInput>,
) -> ApiResult<promo_code::Model> {
    Ok(ok(state.services.promotions.update(id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/promo-codes/{id}",
    params(("id" = Uuid, Path, description = "Promo code id")),
    responses(
        (status = 204, description = "Promo code deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Promotions"
)]
pub async fn delete_promo_code(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.promotions.delete(id).await?;
    Ok(no_content())
}
