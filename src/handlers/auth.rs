use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::errors::ServiceError;
use crate::handlers::common::{created, ok};
use crate::services::users::{AuthSession, LoginInput, RegisterInput};
use crate::{ApiResponse, ApiResult, AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Register a customer account and receive an access token
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterInput,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<AuthSession>),
        (status = 400, description = "Invalid payload or weak password", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email or mobile already registered", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterInput>,
) -> Result<(StatusCode, Json<ApiResponse<AuthSession>>), ServiceError> {
    let session = state.services.users.register(payload).await?;
    Ok(created(session))
}

/// Exchange credentials for an access token
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginInput,
    responses(
        (status = 200, description = "Logged in", body = ApiResponse<AuthSession>),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginInput>,
) -> ApiResult<AuthSession> {
    Ok(ok(state.services.users.login(payload).await?))
}
