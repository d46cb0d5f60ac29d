use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use uuid::Uuid;

use crate::auth::{AdminUser, OptionalAuthUser};
use crate::entities::{homepage_section, project, testimonial};
use crate::errors::ServiceError;
use crate::handlers::common::{created, no_content, ok, paged};
use crate::services::cms::{
    CreateProjectInput, HomepageSectionInput, ProjectQuery, TestimonialInput, UpdateProjectInput,
};
use crate::{ApiResponse, ApiResult, AppState, PaginatedResponse};

pub fn projects_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
}

pub fn testimonials_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_testimonials).post(create_testimonial))
        .route("/:id", put(update_testimonial).delete(delete_testimonial))
}

pub fn homepage_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_homepage))
        .route("/:key", put(upsert_section).delete(delete_section))
}

// Projects

/// Portfolio projects; drafts are visible to admins only
#[utoipa::path(
    get,
    path = "/api/projects",
    params(ProjectQuery),
    responses((status = 200, description = "Projects page", body = ApiResponse<PaginatedResponse<project::Model>>)),
    tag = "Content"
)]
pub async fn list_projects(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
) -> ApiResult<PaginatedResponse<project::Model>> {
    Ok(paged(
        state
            .services
            .cms
            .list_projects(viewer.is_admin(), query)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    params(("id" = String, Path, description = "Project id or slug")),
    responses(
        (status = 200, description = "Project", body = ApiResponse<project::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Content"
)]
pub async fn get_project(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<project::Model> {
    Ok(ok(state.services.cms.get_project(&id, viewer.is_admin()).await?))
}

#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProjectInput,
    responses(
        (status = 201, description = "Project created", body = ApiResponse<project::Model>),
        (status = 409, description = "Slug already in use", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Content"
)]
pub async fn create_project(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateProjectInput>,
) -> Result<(StatusCode, Json<ApiResponse<project::Model>>), ServiceError> {
    Ok(created(state.services.cms.create_project(payload).await?))
}

#[utoipa::path(
    put,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = UpdateProjectInput,
    responses(
        (status = 200, description = "Project updated", body = ApiResponse<project::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Content"
)]
pub async fn update_project(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProjectInput>,
) -> ApiResult<project::Model> {
    Ok(ok(state.services.cms.update_project(id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Content"
)]
pub async fn delete_project(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.cms.delete_project(id).await?;
    Ok(no_content())
}

// Testimonials

#[utoipa::path(
    get,
    path = "/api/testimonials",
    responses((status = 200, description = "Testimonials in display order", body = ApiResponse<Vec<testimonial::Model>>)),
    tag = "Content"
)]
pub async fn list_testimonials(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
) -> ApiResult<Vec<testimonial::Model>> {
    Ok(ok(state
        .services
        .cms
        .list_testimonials(viewer.is_admin())
        .await?))
}

#[utoipa::path(
    post,
    path = "/api/testimonials",
    request_body = TestimonialInput,
    responses((status = 201, description = "Testimonial created", body = ApiResponse<testimonial::Model>)),
    security(("Bearer" = [])),
    tag = "Content"
)]
pub async fn create_testimonial(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<TestimonialInput>,
) -> Result<(StatusCode, Json<ApiResponse<testimonial::Model>>), ServiceError> {
    Ok(created(state.services.cms.create_testimonial(payload).await?))
}

#[utoipa::path(
    put,
    path = "/api/testimonials/{id}",
    params(("id" = Uuid, Path, description = "Testimonial id")),
    request_body = TestimonialInput,
    responses(
        (status = 200, description = "Testimonial replaced", body = ApiResponse<testimonial::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Content"
)]
pub async fn update_testimonial(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TestimonialInput>,
) -> ApiResult<testimonial::Model> {
    Ok(ok(state.services.cms.update_testimonial(id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/testimonials/{id}",
    params(("id" = Uuid, Path, description = "Testimonial id")),
    responses(
        (status = 204, description = "Testimonial deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Content"
)]
pub async fn delete_testimonial(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.cms.delete_testimonial(id).await?;
    Ok(no_content())
}

// Home page

/// Active home page sections in display order
#[utoipa::path(
    get,
    path = "/api/homepage",
    responses((status = 200, description = "Home page sections", body = ApiResponse<Vec<homepage_section::Model>>)),
    tag = "Content"
)]
pub async fn get_homepage(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
) -> ApiResult<Vec<homepage_section::Model>> {
    Ok(ok(state.services.cms.homepage(viewer.is_admin()).await?))
}

#[utoipa::path(
    put,
    path = "/api/homepage/{key}",
    params(("key" = String, Path, description = "Section key, e.g. `hero`")),
    request_body = HomepageSectionInput,
    responses(
        (status = 200, description = "Section saved", body = ApiResponse<homepage_section::Model>),
        (status = 400, description = "Invalid key", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Content"
)]
pub async fn upsert_section(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(payload): Json<HomepageSectionInput>,
) -> ApiResult<homepage_section::Model> {
    Ok(ok(state.services.cms.upsert_section(&key, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/api/homepage/{key}",
    params(("key" = String, Path, description = "Section key")),
    responses(
        (status = 204, description = "Section deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Content"
)]
pub async fn delete_section(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.services.cms.delete_section(&key).await?;
    Ok(no_content())
}
