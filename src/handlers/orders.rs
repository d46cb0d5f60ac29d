use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::entities::order;
use crate::errors::ServiceError;
use crate::handlers::common::{created, no_content, ok, paged};
use crate::services::orders::{
    CancelOrderInput, CreateOrderInput, OrderListQuery, PlacedOrder, UpdateOrderInput,
};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route(
            "/:id",
            get(get_order).put(update_order).delete(delete_order),
        )
        .route("/:id/cancel", post(cancel_order))
}

/// Place an order
///
/// Online payments also return the gateway checkout details the browser
/// needs to collect payment.
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderInput,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<PlacedOrder>),
        (status = 400, description = "Invalid cart, address or promo code", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderInput>,
) -> Result<(StatusCode, Json<ApiResponse<PlacedOrder>>), ServiceError> {
    let placed = state.services.orders.create_order(&user, payload).await?;
    Ok(created(placed))
}

/// List orders; customers see their own, admins see all
#[utoipa::path(
    get,
    path = "/api/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders page", body = ApiResponse<PaginatedResponse<order::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<PaginatedResponse<order::Model>> {
    Ok(paged(state.services.orders.list_orders(&user, query).await?))
}

/// Get an order
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = ApiResponse<order::Model>),
        (status = 403, description = "Not your order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<order::Model> {
    Ok(ok(state.services.orders.get_order(&user, id).await?))
}

/// Advance order status or set the tracking number
#[utoipa::path(
    put,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderInput,
    responses(
        (status = 200, description = "Order updated", body = ApiResponse<order::Model>),
        (status = 400, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn update_order(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderInput>,
) -> ApiResult<order::Model> {
    Ok(ok(state.services.orders.update_order(&admin, id, payload).await?))
}

/// Cancel a pending or confirmed order
#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelOrderInput,
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<order::Model>),
        (status = 400, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not your order", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelOrderInput>>,
) -> ApiResult<order::Model> {
    let input = payload.map(|Json(input)| input).unwrap_or_default();
    Ok(ok(state.services.orders.cancel_order(&user, id, input).await?))
}

/// Delete an order
#[utoipa::path(
    delete,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn delete_order(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.orders.delete_order(&admin, id).await?;
    Ok(no_content())
}
