//! Kestrel Validator - 字段验证模块
//!
//! 字符串 / 数值 / 上传文件三类验证原语，以及按名称注册的验证器表

pub mod error;
pub mod registry;
pub mod upload;
pub mod validator;

pub use error::*;
pub use registry::{FieldValidator, ValidatorKind, ValidatorRegistry};
pub use upload::*;
pub use validator::*;
