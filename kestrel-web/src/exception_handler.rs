//! 异常边界
//!
//! 分发管道里没有被失败处理器消化的错误都在这里转换成 HTTP 响应：
//!
//! - `NotFound` → 404
//! - `InvalidInput` / `BadRequest` / `Validation` → 400
//! - 配置错误 → 500

use crate::error::{DispatchError, HttpFailure};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// 标准错误响应格式
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>, // 错误码等额外信息
}

impl ErrorResponse {
    pub fn new(status: StatusCode, error: String, message: String, path: String) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            status: status.as_u16(),
            error,
            message,
            path,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// 错误对应的 HTTP 状态码
pub fn status_for(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::Responded => StatusCode::OK,
        DispatchError::Failure(failure) => failure.status_code(),
        DispatchError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 把分发错误转换为错误响应
pub fn handle_error(error: &DispatchError, request_path: &str) -> ErrorResponse {
    let status = status_for(error);
    let reason = status.canonical_reason().unwrap_or("Unknown Error").to_string();

    match error {
        DispatchError::Failure(failure) => {
            tracing::warn!(
                status = status.as_u16(),
                code = failure.code(),
                path = request_path,
                error = %failure,
                "Request failed"
            );
            ErrorResponse::new(status, reason, failure.message().to_string(), request_path.to_string())
                .with_details(json!({ "code": failure.code(), "kind": kind(failure) }))
        }
        DispatchError::Configuration(err) => {
            // 详细信息只写日志，不返回给客户端
            tracing::error!(path = request_path, error = %err, "Configuration error");
            ErrorResponse::new(status, reason.clone(), reason, request_path.to_string())
        }
        DispatchError::Responded => {
            ErrorResponse::new(status, reason, error.to_string(), request_path.to_string())
        }
    }
}

fn kind(failure: &HttpFailure) -> &'static str {
    match failure {
        HttpFailure::NotFound { .. } => "not_found",
        HttpFailure::InvalidInput { .. } => "invalid_input",
        HttpFailure::BadRequest { .. } => "bad_request",
        HttpFailure::Validation { .. } => "validation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&HttpFailure::not_found("x").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&HttpFailure::invalid_input(1001, "x").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&HttpFailure::bad_request("x").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ConfigurationError::MiddlewareNotFound("auth".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_body() {
        let error: DispatchError = HttpFailure::invalid_input(1004, "too long").into();
        let response = handle_error(&error, "/register");

        assert_eq!(response.status, 400);
        assert_eq!(response.error, "Bad Request");
        assert_eq!(response.message, "too long");
        assert_eq!(response.path, "/register");
        assert_eq!(
            response.details,
            Some(json!({"code": 1004, "kind": "invalid_input"}))
        );
    }

    #[test]
    fn test_configuration_error_is_not_exposed() {
        let error: DispatchError = ConfigurationError::MiddlewareNotFound("auth".into()).into();
        let response = handle_error(&error, "/");

        assert_eq!(response.status, 500);
        assert_eq!(response.message, "Internal Server Error");
        assert!(!response.message.contains("auth"));
        assert!(response.details.is_none());
    }
}
