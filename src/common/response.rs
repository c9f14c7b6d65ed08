use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Standard API response wrapper
///
/// Provides a consistent response format for every endpoint the listener serves.
///
/// # Example
/// ```
/// use conductor::common::ApiResponse;
/// use axum::http::StatusCode;
///
/// let ok = ApiResponse::success("pong");
/// assert_eq!(ok.http_status, StatusCode::OK);
///
/// let missing: ApiResponse<()> = ApiResponse::error(StatusCode::NOT_FOUND, "Job not found");
/// assert_eq!(missing.error.unwrap().code, "NotFound");
/// ```
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,

    pub success: bool,

    #[serde(skip)]
    pub http_status: StatusCode,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful response with data
    ///
    /// Defaults to HTTP 200 OK.
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            success: true,
            http_status: StatusCode::OK,
        }
    }

    /// Create an error response
    ///
    /// The error `code` is the status's reason phrase without spaces,
    /// e.g. `ServiceUnavailable`.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(ApiError {
                code: error_code(status),
                message: message.into(),
            }),
            success: false,
            http_status: status,
        }
    }

    /// Keep the body but answer with `status`. A non-success status also clears `success`.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.success = self.success && status.is_success();
        self.http_status = status;
        self
    }
}

fn error_code(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(|reason| reason.split_whitespace().collect())
        .unwrap_or_else(|| status.as_str().to_string())
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.http_status, Json(self)).into_response()
    }
}
