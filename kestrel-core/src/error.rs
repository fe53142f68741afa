//! 统一的错误类型
//!
//! 库内部一律使用 `thiserror` 定义的枚举；`anyhow::Result` 只在应用边界（例如 demo 的 `main`）使用。

use thiserror::Error;

pub use anyhow::Result;

/// 组件容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 请求的类型没有注册工厂
    #[error("Component not registered: {type_name}")]
    ComponentNotFound { type_name: String },

    /// 工厂执行失败
    #[error("Failed to create component '{type_name}': {reason}")]
    CreationFailed { type_name: String, reason: String },

    /// 工厂返回了与注册类型不一致的实例
    #[error("Component type mismatch: expected {expected}")]
    TypeMismatch { expected: String },
}

pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 应用级错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("{0}")]
    Other(String),
}

pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;
