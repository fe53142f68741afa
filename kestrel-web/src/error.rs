//! 分发管道的错误类型
//!
//! 三条通道互不混用：
//!
//! 1. **字段级** - [`FieldError`]，收集后统一交给失败处理器或转换成 [`HttpFailure`]
//! 2. **请求级** - [`HttpFailure`]，由异常边界映射为 4xx
//! 3. **配置级** - [`ConfigurationError`]，部署/编程错误，映射为 500，不重试不重定向

use axum::http::StatusCode;
use kestrel_core::ContainerError;
use kestrel_validator::ValidationError;
use serde::Serialize;
use thiserror::Error;

/// 内联回调校验失败时使用的键
pub const MATCH_KEY: &str = "match";

/// 带键的字段错误
///
/// 内联回调返回 `false` 时没有错误码和消息，因此两者都是可选的。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub key: String,
    pub code: Option<i32>,
    pub message: Option<String>,
}

impl FieldError {
    pub fn new(key: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            code: Some(code),
            message: Some(message.into()),
        }
    }

    pub fn from_validation(key: impl Into<String>, error: &ValidationError) -> Self {
        Self::new(key, error.code, error.message.clone())
    }

    /// 内联回调返回 `false`
    pub fn unmatched() -> Self {
        Self {
            key: MATCH_KEY.to_string(),
            code: None,
            message: None,
        }
    }
}

/// 请求级失败
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpFailure {
    /// 404 - 路由不存在，或 GET 请求的输入无效
    #[error("Not found: {message}")]
    NotFound { code: i32, message: String },

    /// 400 - 非 GET 请求的输入无效
    #[error("Invalid input: {message}")]
    InvalidInput { code: i32, message: String },

    /// 400 - 处理器明确表示没有响应
    #[error("Bad request: {message}")]
    BadRequest { code: i32, message: String },

    /// 400 - 处理器主动抛出的验证失败
    #[error("Validation failed: {message}")]
    Validation { code: i32, message: String },
}

impl HttpFailure {
    pub fn not_found(message: impl Into<String>) -> Self {
        HttpFailure::NotFound {
            code: 0,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        HttpFailure::BadRequest {
            code: 0,
            message: message.into(),
        }
    }

    pub fn invalid_input(code: i32, message: impl Into<String>) -> Self {
        HttpFailure::InvalidInput {
            code,
            message: message.into(),
        }
    }

    pub fn validation(code: i32, message: impl Into<String>) -> Self {
        HttpFailure::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            HttpFailure::NotFound { code, .. }
            | HttpFailure::InvalidInput { code, .. }
            | HttpFailure::BadRequest { code, .. }
            | HttpFailure::Validation { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            HttpFailure::NotFound { message, .. }
            | HttpFailure::InvalidInput { message, .. }
            | HttpFailure::BadRequest { message, .. }
            | HttpFailure::Validation { message, .. } => message,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpFailure::NotFound { .. } => StatusCode::NOT_FOUND,
            HttpFailure::InvalidInput { .. }
            | HttpFailure::BadRequest { .. }
            | HttpFailure::Validation { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<ValidationError> for HttpFailure {
    fn from(error: ValidationError) -> Self {
        HttpFailure::Validation {
            code: error.code,
            message: error.message,
        }
    }
}

/// 配置错误（致命）
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Could not find: {0}::handle")]
    MiddlewareNotFound(String),

    #[error("Invalid component: \"{type_name}\" could not be resolved")]
    ComponentUnavailable {
        type_name: String,
        #[source]
        source: ContainerError,
    },

    #[error("Could not find controller: {controller}::{method}")]
    ControllerNotFound { controller: String, method: String },

    #[error("Unknown validator \"{name}\" for key \"{key}\"")]
    UnknownValidator { name: String, key: String },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid header value for {name}: {value}")]
    InvalidHeader { name: String, value: String },
}

/// 分发错误
#[derive(Debug, Error)]
pub enum DispatchError {
    /// 终止动作已经写入响应（例如失败处理器已重定向），不是真正的错误
    #[error("Response already sent")]
    Responded,

    #[error(transparent)]
    Failure(#[from] HttpFailure),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
