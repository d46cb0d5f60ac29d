use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::product;
use crate::entities::user::Address;
use crate::errors::ServiceError;
use crate::handlers::common::{created, ok};
use crate::services::users::{AddressInput, UpdateProfileInput, UserProfile};
use crate::{ApiResponse, ApiResult, AppState};

/// `/api/user`; every route acts on the caller's own account.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/addresses", get(list_addresses).post(add_address))
        .route(
            "/addresses/:id",
            put(update_address).delete(delete_address),
        )
        .route("/wishlist", get(get_wishlist))
        .route(
            "/wishlist/:product_id",
            post(add_to_wishlist).delete(remove_from_wishlist),
        )
}

#[utoipa::path(
    get,
    path = "/api/user/profile",
    responses(
        (status = 200, description = "Profile", body = ApiResponse<UserProfile>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Account"
)]
pub async fn get_profile(user: AuthUser, State(state): State<AppState>) -> ApiResult<UserProfile> {
    Ok(ok(state.services.users.get_profile(&user).await?))
}

/// Update name, contact details or password
#[utoipa::path(
    put,
    path = "/api/user/profile",
    request_body = UpdateProfileInput,
    responses(
        (status = 200, description = "Profile updated", body = ApiResponse<UserProfile>),
        (status = 401, description = "Current password is incorrect", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email or mobile already registered", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Account"
)]
pub async fn update_profile(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileInput>,
) -> ApiResult<UserProfile> {
    Ok(ok(state.services.users.update_profile(&user, payload).await?))
}

#[utoipa::path(
    get,
    path = "/api/user/addresses",
    responses((status = 200, description = "Address book", body = ApiResponse<Vec<Address>>)),
    security(("Bearer" = [])),
    tag = "Account"
)]
pub async fn list_addresses(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Vec<Address>> {
    Ok(ok(state.services.users.list_addresses(&user).await?))
}

/// Add an address; the first one becomes the default
#[utoipa::path(
    post,
    path = "/api/user/addresses",
    request_body = AddressInput,
    responses(
        (status = 201, description = "Address book after the insert", body = ApiResponse<Vec<Address>>),
        (status = 400, description = "Invalid address", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Account"
)]
pub async fn add_address(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<AddressInput>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<Address>>>), ServiceError> {
    Ok(created(state.services.users.add_address(&user, payload).await?))
}

#[utoipa::path(
    put,
    path = "/api/user/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    request_body = AddressInput,
    responses(
        (status = 200, description = "Address book after the update", body = ApiResponse<Vec<Address>>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Account"
)]
pub async fn update_address(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddressInput>,
) -> ApiResult<Vec<Address>> {
    Ok(ok(state.services.users.update_address(&user, id, payload).await?))
}

/// Remove an address; removing the default promotes the oldest remaining one
#[utoipa::path(
    delete,
    path = "/api/user/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    responses(
        (status = 200, description = "Address book after the removal", body = ApiResponse<Vec<Address>>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Account"
)]
pub async fn delete_address(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Address>> {
    Ok(ok(state.services.users.delete_address(&user, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/user/wishlist",
    responses((status = 200, description = "Wishlisted products", body = ApiResponse<Vec<product::Model>>)),
    security(("Bearer" = [])),
    tag = "Account"
)]
pub async fn get_wishlist(
    user: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Vec<product::Model>> {
    Ok(ok(state.services.users.wishlist(&user).await?))
}

#[utoipa::path(
    post,
    path = "/api/user/wishlist/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Wishlist after the insert", body = ApiResponse<Vec<product::Model>>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Account"
)]
pub async fn add_to_wishlist(
    user: AuthUser,
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Vec<product::Model>> {
    Ok(ok(state
        .services
        .users
        .add_to_wishlist(&user, product_id)
        .await?))
}

#[utoipa::path(
    delete,
    path = "/api/user/wishlist/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses((status = 200, description = "Wishlist after the removal", body = ApiResponse<Vec<product::Model>>)),
    security(("Bearer" = [])),
    tag = "Account"
)]
pub async fn remove_from_wishlist(
    user: AuthUser,
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Vec<product::Model>> {
    Ok(ok(state
        .services
        .users
        .remove_from_wishlist(&user, product_id)
        .await?))
}
