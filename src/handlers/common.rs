use axum::{http::StatusCode, Json};

use crate::services::Page;
use crate::{ApiResponse, PaginatedResponse};

/// Standard success response
pub fn ok<T>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

/// Standard created response
pub fn created<T>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

/// Standard no content response
pub fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Wraps a service page in the paginated envelope.
pub fn paged<T>(page: Page<T>) -> Json<ApiResponse<PaginatedResponse<T>>> {
    Json(ApiResponse::success(PaginatedResponse::from(page)))
}
