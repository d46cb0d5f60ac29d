use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::entities::return_request;
use crate::errors::ServiceError;
use crate::handlers::common::{created, ok, paged};
use crate::services::returns::{CreateReturnInput, ReturnListQuery, UpdateReturnInput};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

pub fn returns_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_returns).post(create_return))
        .route("/:id", get(get_return).put(update_return))
        .route("/:id/cancel", post(cancel_return))
}

/// Request a return for a delivered order
#[utoipa::path(
    post,
    path = "/api/returns",
    request_body = CreateReturnInput,
    responses(
        (status = 201, description = "Return requested", body = ApiResponse<return_request::Model>),
        (status = 400, description = "Order not returnable or window expired", body = crate::errors::ErrorResponse),
        (status = 409, description = "A return is already open for this order", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn create_return(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateReturnInput>,
) -> Result<(StatusCode, Json<ApiResponse<return_request::Model>>), ServiceError> {
    let request = state.services.returns.create_return(&user, payload).await?;
    Ok(created(request))
}

/// List returns; customers see their own
#[utoipa::path(
    get,
    path = "/api/returns",
    params(ReturnListQuery),
    responses(
        (status = 200, description = "Returns page", body = ApiResponse<PaginatedResponse<return_request::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn list_returns(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ReturnListQuery>,
) -> ApiResult<PaginatedResponse<return_request::Model>> {
    Ok(paged(state.services.returns.list_returns(&user, query).await?))
}

/// Get a return
#[utoipa::path(
    get,
    path = "/api/returns/{id}",
    params(("id" = Uuid, Path, description = "Return id")),
    responses(
        (status = 200, description = "Return", body = ApiResponse<return_request::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn get_return(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<return_request::Model> {
    Ok(ok(state.services.returns.get_return(&user, id).await?))
}

/// Move a return along its workflow; completion triggers the refund
#[utoipa::path(
    put,
    path = "/api/returns/{id}",
    params(("id" = Uuid, Path, description = "Return id")),
    request_body = UpdateReturnInput,
    responses(
        (status = 200, description = "Return updated", body = ApiResponse<return_request::Model>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn update_return(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReturnInput>,
) -> ApiResult<return_request::Model> {
    Ok(ok(state.services.returns.update_return(&admin, id, payload).await?))
}

/// Withdraw a pending return
#[utoipa::path(
    post,
    path = "/api/returns/{id}/cancel",
    params(("id" = Uuid, Path, description = "Return id")),
    responses(
        (status = 200, description = "Return cancelled", body = ApiResponse<return_request::Model>),
        (status = 400, description = "Return is no longer pending", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn cancel_return(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<return_request::Model> {
    Ok(ok(state.services.returns.cancel_return(&user, id).await?))
}
