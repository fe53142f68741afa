//! # Kestrel Web
//!
//! 按路由分发请求的 Web 框架，基于 Axum 构建
//!
//! ## 请求管道
//!
//! - **路由上下文** - 按 (路由, 请求方法) 解析验证器、内联回调、中间件、失败处理器和控制器
//! - **输入初始化** - 合并查询参数、请求体、路径参数和上传文件，按点路径逐键验证
//! - **中间件链** - 按顺序执行，返回的映射合并回输入数据
//! - **返回值归类** - 渲染 / 发送 / 调用 / 文本 / 透传
//! - **失败处理** - 失败处理器（通常是重定向）或抛给异常边界

pub mod binding;
pub mod constants;
pub mod controller;
pub mod csrf;
pub mod error;
pub mod exception_handler;
pub mod exchange;
pub mod initializer;
pub mod input;
pub mod kernel;
pub mod layers;
pub mod middleware;
pub mod reply;
pub mod request;
pub mod response;
pub mod response_handler;
pub mod route;
pub mod server;
pub mod session;
pub mod template;

pub use inventory;

pub mod prelude {
    //! 预导入模块

    pub use crate::binding::{Arguments, Handler, Param};
    pub use crate::controller::{ControllerRegistration, ControllerRegistry};
    pub use crate::csrf::{csrf_field, VerifyCsrf};
    pub use crate::error::{
        ConfigurationError, DispatchError, DispatchResult, FieldError, HttpFailure,
    };
    pub use crate::exchange::Exchange;
    pub use crate::input::InputMap;
    pub use crate::kernel::Kernel;
    pub use crate::middleware::{Middleware, MiddlewareRegistration, MiddlewareRegistry};
    pub use crate::reply::Reply;
    pub use crate::request::{RawRequest, RequestContext, RequestMethod};
    pub use crate::response::{JsonResponse, Redirect, View};
    pub use crate::route::RouteTable;
    pub use crate::server::{KestrelWebServer, ServerProperties, UploadProperties};
    pub use crate::session::{MemorySessionStore, Session, SessionStore};
    pub use crate::template::TemplateEngine;

    pub use kestrel_validator::{FileRule, NumRule, StrRule, ValidatorRegistry};

    pub use axum::http::StatusCode;
    pub use serde_json::json;
}
