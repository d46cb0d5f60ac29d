use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::entities::support_ticket;
use crate::errors::ServiceError;
use crate::handlers::common::{created, ok, paged};
use crate::services::tickets::{
    CreateTicketInput, TicketListQuery, TicketMessageInput, UpdateTicketInput,
};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

pub fn tickets_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tickets).post(create_ticket))
        .route("/:id", get(get_ticket).put(update_ticket))
        .route("/:id/messages", post(add_message))
}

/// Open a support ticket
#[utoipa::path(
    post,
    path = "/api/tickets",
    request_body = CreateTicketInput,
    responses(
        (status = 201, description = "Ticket opened", body = ApiResponse<support_ticket::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Support"
)]
pub async fn create_ticket(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateTicketInput>,
) -> Result<(StatusCode, Json<ApiResponse<support_ticket::Model>>), ServiceError> {
    let ticket = state.services.tickets.create_ticket(&user, payload).await?;
    Ok(created(ticket))
}

/// List tickets; customers see their own
#[utoipa::path(
    get,
    path = "/api/tickets",
    params(TicketListQuery),
    responses(
        (status = 200, description = "Tickets page", body = ApiResponse<PaginatedResponse<support_ticket::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "Support"
)]
pub async fn list_tickets(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<TicketListQuery>,
) -> ApiResult<PaginatedResponse<support_ticket::Model>> {
    Ok(paged(state.services.tickets.list_tickets(&user, query).await?))
}

/// Get a ticket with its conversation
#[utoipa::path(
    get,
    path = "/api/tickets/{id}",
    params(("id" = Uuid, Path, description = "Ticket id")),
    responses(
        (status = 200, description = "Ticket", body = ApiResponse<support_ticket::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Support"
)]
pub async fn get_ticket(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<support_ticket::Model> {
    Ok(ok(state.services.tickets.get_ticket(&user, id).await?))
}

/// Post a message on a ticket
#[utoipa::path(
    post,
    path = "/api/tickets/{id}/messages",
    params(("id" = Uuid, Path, description = "Ticket id")),
    request_body = TicketMessageInput,
    responses(
        (status = 200, description = "Message added", body = ApiResponse<support_ticket::Model>),
        (status = 400, description = "Ticket is closed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Support"
)]
pub async fn add_message(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TicketMessageInput>,
) -> ApiResult<support_ticket::Model> {
    Ok(ok(state.services.tickets.add_message(&user, id, payload).await?))
}

/// Change ticket status or priority
#[utoipa::path(
    put,
    path = "/api/tickets/{id}",
    params(("id" = Uuid, Path, description = "Ticket id")),
    request_body = UpdateTicketInput,
    responses(
        (status = 200, description = "Ticket updated", body = ApiResponse<support_ticket::Model>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Support"
)]
pub async fn update_ticket(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTicketInput>,
) -> ApiResult<support_ticket::Model> {
    Ok(ok(state.services.tickets.update_ticket(&admin, id, payload).await?))
}
