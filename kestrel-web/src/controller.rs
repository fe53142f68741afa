//! 控制器支持
//!
//! 控制器方法是带参数声明的 [`Handler`]，按 `(控制器名, 方法名)` 注册。
//!
//! 路由显式绑定控制器时使用绑定的控制器；否则按约定解析：
//! 路径第一段转为大驼峰加 `Controller` 后缀（空路径为 `IndexController`），
//! 方法名为小写的请求方法。

use crate::binding::Handler;
use crate::error::{ConfigurationError, DispatchResult, HttpFailure};
use crate::route::RouteContext;
use std::collections::HashMap;

/// 控制器注册信息
///
/// 用于编译时自动发现
pub struct ControllerRegistration {
    /// 控制器名称，如 `UserController`
    pub controller: &'static str,

    /// 方法名称，如 `get`
    pub method: &'static str,

    /// 构造处理函数
    pub create: fn() -> Handler,
}

impl ControllerRegistration {
    pub const fn new(controller: &'static str, method: &'static str, create: fn() -> Handler) -> Self {
        Self {
            controller,
            method,
            create,
        }
    }
}

// 使用 inventory 收集所有控制器方法
inventory::collect!(ControllerRegistration);

/// 控制器注册表
#[derive(Debug, Default, Clone)]
pub struct ControllerRegistry {
    handlers: HashMap<(String, String), Handler>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, controller: impl Into<String>, method: impl Into<String>, handler: Handler) {
        self.handlers
            .insert((controller.into(), method.into()), handler);
    }

    pub fn get(&self, controller: &str, method: &str) -> Option<&Handler> {
        self.handlers
            .get(&(controller.to_string(), method.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 解析路由对应的控制器方法
    ///
    /// 显式绑定的控制器不存在是配置错误；约定解析不到时返回 404。
    pub fn resolve(&self, route: &RouteContext) -> DispatchResult<&Handler> {
        if let Some((controller, method)) = route.controller() {
            return self.get(controller, method).ok_or_else(|| {
                ConfigurationError::ControllerNotFound {
                    controller: controller.to_string(),
                    method: method.to_string(),
                }
                .into()
            });
        }

        let controller = convention_name(route.path());
        let method = route.method().as_lower();
        self.get(&controller, method).ok_or_else(|| {
            tracing::debug!(controller = %controller, method = method, "No controller for route");
            HttpFailure::not_found("Controller not found.").into()
        })
    }

    /// 使用编译时收集的控制器构建注册表
    pub fn from_inventory() -> Self {
        let mut registry = Self::new();

        for registration in inventory::iter::<ControllerRegistration> {
            registry.register(
                registration.controller,
                registration.method,
                (registration.create)(),
            );
            tracing::info!(
                controller = registration.controller,
                method = registration.method,
                "Auto-registered controller method"
            );
        }

        registry
    }
}

/// 约定的控制器名称
pub fn convention_name(path: &str) -> String {
    let segment = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("index");

    let mut name: String = segment
        .split(|c: char| c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();

    name.push_str("Controller");
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use crate::input::InputMap;
    use crate::reply::Reply;
    use crate::request::RequestMethod;
    use crate::route::RouteTable;

    fn noop() -> Handler {
        Handler::new([], |_, _| Ok(Reply::Empty))
    }

    #[test]
    fn test_convention_name() {
        assert_eq!(convention_name(""), "IndexController");
        assert_eq!(convention_name("user"), "UserController");
        assert_eq!(convention_name("/user/{id}"), "UserController");
        assert_eq!(convention_name("blog-post/edit"), "BlogPostController");
        assert_eq!(convention_name("open_chat"), "OpenChatController");
    }

    #[test]
    fn test_resolve_by_convention() {
        let mut controllers = ControllerRegistry::new();
        controllers.register("UserController", "post", noop());

        let mut routes = RouteTable::new();
        routes.path("user/{id}").methods([RequestMethod::Get, RequestMethod::Post]);

        let post = routes.context(0, RequestMethod::Post, InputMap::new()).unwrap();
        assert!(controllers.resolve(&post).is_ok());

        let get = routes.context(0, RequestMethod::Get, InputMap::new()).unwrap();
        assert!(matches!(
            controllers.resolve(&get),
            Err(DispatchError::Failure(HttpFailure::NotFound { .. }))
        ));
    }

    #[test]
    fn test_explicit_binding_wins() {
        let mut controllers = ControllerRegistry::new();
        controllers.register("IndexController", "get", noop());
        controllers.register("PageController", "show", noop());

        let mut routes = RouteTable::new();
        routes.path("").controller("PageController", "show");
        routes.path("missing").controller("GhostController", "index");

        let route = routes.context(0, RequestMethod::Get, InputMap::new()).unwrap();
        assert!(controllers.resolve(&route).is_ok());

        let route = routes.context(1, RequestMethod::Get, InputMap::new()).unwrap();
        match controllers.resolve(&route) {
            Err(DispatchError::Configuration(ConfigurationError::ControllerNotFound {
                controller,
                method,
            })) => {
                assert_eq!(controller, "GhostController");
                assert_eq!(method, "index");
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
