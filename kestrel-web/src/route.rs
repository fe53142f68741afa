//! 路由表
//!
//! 路由在启动时注册，请求到来时由 [`RouteTable::context`] 生成只读的 [`RouteContext`]。
//!
//! ```ignore
//! let mut routes = RouteTable::new();
//! routes.kernel_middleware(["VerifyCsrf"]);
//!
//! routes
//!     .path("user/{id}")
//!     .methods([RequestMethod::Get, RequestMethod::Post])
//!     .match_num("id", NumRule::new().min(1))
//!     .on(RequestMethod::Post)
//!     .match_str("name", StrRule::new().max_len(20))
//!     .fails(Redirect::to("user"));
//! ```

use crate::binding::Handler;
use crate::error::{ConfigurationError, HttpFailure};
use crate::input::InputMap;
use crate::request::RequestMethod;
use crate::response::Sendable;
use kestrel_validator::{FieldValidator, FileRule, NumRule, StrRule, ValidatorRegistry};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 按请求方法区分的设置，`any` 对所有方法生效，具体方法的设置优先
struct PerMethod<T> {
    any: Option<T>,
    methods: HashMap<RequestMethod, T>,
}

impl<T> Default for PerMethod<T> {
    fn default() -> Self {
        Self {
            any: None,
            methods: HashMap::new(),
        }
    }
}

impl<T> PerMethod<T> {
    fn set(&mut self, method: Option<RequestMethod>, value: T) {
        match method {
            Some(method) => {
                self.methods.insert(method, value);
            }
            None => self.any = Some(value),
        }
    }

    fn get(&self, method: RequestMethod) -> Option<&T> {
        self.methods.get(&method).or(self.any.as_ref())
    }
}

/// 一条路由
pub struct RouteEntry {
    path: String,
    methods: Vec<RequestMethod>,
    validators: Vec<(Option<RequestMethod>, String, FieldValidator)>,
    callback: PerMethod<Handler>,
    controller: PerMethod<(String, String)>,
    fails: PerMethod<Arc<dyn Sendable>>,
    group_middleware: Vec<String>,
    middleware: Vec<(Option<RequestMethod>, String)>,
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl RouteEntry {
    fn new(path: &str, group_middleware: Vec<String>) -> Self {
        Self {
            path: normalize_path(path),
            methods: vec![RequestMethod::Get],
            validators: Vec::new(),
            callback: PerMethod::default(),
            controller: PerMethod::default(),
            fails: PerMethod::default(),
            group_middleware,
            middleware: Vec::new(),
        }
    }

    /// 路由路径，不含首尾的 `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> &[RequestMethod] {
        &self.methods
    }

    pub fn allows(&self, method: RequestMethod) -> bool {
        self.methods.contains(&method)
    }

    /// 当前方法生效的验证器，按注册顺序；同一个键以后注册的为准
    fn validators_for(&self, method: RequestMethod) -> Vec<(String, FieldValidator)> {
        let mut result: Vec<(String, FieldValidator)> = Vec::new();
        for (scope, key, validator) in &self.validators {
            if scope.is_some_and(|m| m != method) {
                continue;
            }
            match result.iter_mut().find(|(existing, _)| existing == key) {
                Some(slot) => slot.1 = validator.clone(),
                None => result.push((key.clone(), validator.clone())),
            }
        }
        result
    }

    fn middleware_for(&self, method: RequestMethod) -> impl Iterator<Item = &String> {
        self.group_middleware.iter().chain(
            self.middleware
                .iter()
                .filter(move |(scope, _)| scope.map_or(true, |m| m == method))
                .map(|(_, name)| name),
        )
    }
}

fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// 路由表
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<RouteEntry>,
    kernel_middleware: Vec<String>,
    group_middleware: Vec<String>,
    /// 文件规则的默认上限（KB），来自 `upload.max-file-size`
    max_file_size: Option<u64>,
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .field("kernel_middleware", &self.kernel_middleware)
            .finish()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 对所有路由生效的中间件，排在最前面
    pub fn kernel_middleware<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kernel_middleware.extend(names.into_iter().map(Into::into));
        self
    }

    /// 之后注册的文件规则在未显式设置上限时使用 `kb`
    pub fn max_file_size(&mut self, kb: u64) -> &mut Self {
        self.max_file_size = Some(kb);
        self
    }

    /// 注册路由，同一路径重复注册时返回已有的路由
    pub fn path(&mut self, pattern: &str) -> RouteBuilder<'_> {
        let path = normalize_path(pattern);
        let index = match self.find(&path) {
            Some(index) => index,
            None => {
                self.routes
                    .push(RouteEntry::new(&path, self.group_middleware.clone()));
                self.routes.len() - 1
            }
        };

        RouteBuilder {
            entry: &mut self.routes[index],
            scope: None,
            max_file_size: self.max_file_size,
        }
    }

    /// 中间件分组，`register` 中注册的路由都带上这些中间件
    pub fn group<I, S, F>(&mut self, middleware: I, register: F) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&mut RouteTable),
    {
        let depth = self.group_middleware.len();
        self.group_middleware
            .extend(middleware.into_iter().map(Into::into));
        register(self);
        self.group_middleware.truncate(depth);
        self
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn find(&self, pattern: &str) -> Option<usize> {
        let path = normalize_path(pattern);
        self.routes.iter().position(|route| route.path == path)
    }

    /// 生成本次请求的路由上下文；路由不存在或方法未声明时返回 404
    pub fn context(
        &self,
        route_key: usize,
        method: RequestMethod,
        path_params: InputMap,
    ) -> Result<RouteContext, HttpFailure> {
        let entry = self
            .routes
            .get(route_key)
            .ok_or_else(|| HttpFailure::not_found("Route not found."))?;

        if !entry.allows(method) {
            tracing::debug!(route = %entry.path, method = %method, "Method not registered for route");
            return Err(HttpFailure::not_found("Route not found."));
        }

        let middleware = self
            .kernel_middleware
            .iter()
            .chain(entry.middleware_for(method))
            .cloned()
            .collect();

        Ok(RouteContext {
            path: entry.path.clone(),
            method,
            path_params,
            validators: entry.validators_for(method),
            callback: entry.callback.get(method).cloned(),
            controller: entry.controller.get(method).cloned(),
            fails: entry.fails.get(method).cloned(),
            middleware,
        })
    }
}

/// 路由构建器
///
/// 设置默认对所有方法生效，[`RouteBuilder::on`] 之后只对指定方法生效。
pub struct RouteBuilder<'a> {
    entry: &'a mut RouteEntry,
    scope: Option<RequestMethod>,
    max_file_size: Option<u64>,
}

impl<'a> RouteBuilder<'a> {
    /// 允许的请求方法（默认只有 GET）
    pub fn methods(self, methods: impl IntoIterator<Item = RequestMethod>) -> Self {
        let mut allowed: Vec<RequestMethod> = Vec::new();
        for method in methods {
            if !allowed.contains(&method) {
                allowed.push(method);
            }
        }
        self.entry.methods = allowed;
        self
    }

    /// 之后的设置只对 `method` 生效
    pub fn on(mut self, method: RequestMethod) -> Self {
        self.scope = Some(method);
        self
    }

    /// 之后的设置对所有方法生效
    pub fn on_any(mut self) -> Self {
        self.scope = None;
        self
    }

    /// 内联回调
    pub fn match_fn(self, handler: Handler) -> Self {
        self.entry.callback.set(self.scope, handler);
        self
    }

    pub fn match_str(self, key: &str, rule: StrRule) -> Self {
        self.match_with(key, FieldValidator::str(rule))
    }

    pub fn match_num(self, key: &str, rule: NumRule) -> Self {
        self.match_with(key, FieldValidator::num(rule))
    }

    pub fn match_file(self, key: &str, rule: FileRule) -> Self {
        let rule = match self.max_file_size {
            Some(kb) => rule.with_default_max(kb),
            None => rule,
        };
        self.match_with(key, FieldValidator::file(rule))
    }

    /// 任意验证器，`key` 可以是点路径
    pub fn match_with(self, key: &str, validator: FieldValidator) -> Self {
        let scope = self.scope;
        match self
            .entry
            .validators
            .iter_mut()
            .find(|(s, k, _)| *s == scope && k == key)
        {
            Some(slot) => slot.2 = validator,
            None => self
                .entry
                .validators
                .push((scope, key.to_string(), validator)),
        }
        self
    }

    /// 使用已注册的具名验证器，名称在注册时解析
    pub fn validate(
        self,
        key: &str,
        name: &str,
        registry: &ValidatorRegistry,
    ) -> Result<Self, ConfigurationError> {
        let validator =
            registry
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigurationError::UnknownValidator {
                    name: name.to_string(),
                    key: key.to_string(),
                })?;
        Ok(self.match_with(key, validator))
    }

    pub fn middleware<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scope = self.scope;
        self.entry
            .middleware
            .extend(names.into_iter().map(|name| (scope, name.into())));
        self
    }

    /// 验证失败时的终止动作（通常是重定向）
    pub fn fails(self, response: impl Sendable + 'static) -> Self {
        self.entry.fails.set(self.scope, Arc::new(response));
        self
    }

    /// 显式绑定控制器
    pub fn controller(self, controller: &str, method: &str) -> Self {
        self.entry
            .controller
            .set(self.scope, (controller.to_string(), method.to_string()));
        self
    }
}

/// 本次请求的路由视图，构造后不再修改
#[derive(Clone)]
pub struct RouteContext {
    path: String,
    method: RequestMethod,
    path_params: InputMap,
    validators: Vec<(String, FieldValidator)>,
    callback: Option<Handler>,
    controller: Option<(String, String)>,
    fails: Option<Arc<dyn Sendable>>,
    middleware: Vec<String>,
}

impl fmt::Debug for RouteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteContext")
            .field("path", &self.path)
            .field("method", &self.method)
            .field(
                "validators",
                &self.validators.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .field("callback", &self.callback.is_some())
            .field("controller", &self.controller)
            .field("fails", &self.fails.is_some())
            .field("middleware", &self.middleware)
            .finish()
    }
}

impl RouteContext {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    pub fn path_params(&self) -> &InputMap {
        &self.path_params
    }

    pub fn validators(&self) -> Option<&[(String, FieldValidator)]> {
        (!self.validators.is_empty()).then_some(self.validators.as_slice())
    }

    pub fn callback(&self) -> Option<&Handler> {
        self.callback.as_ref()
    }

    /// 全局中间件在前，分组中间件其次，路由中间件最后
    pub fn middleware(&self) -> Option<&[String]> {
        (!self.middleware.is_empty()).then_some(self.middleware.as_slice())
    }

    pub fn fails(&self) -> Option<&Arc<dyn Sendable>> {
        self.fails.as_ref()
    }

    pub fn controller(&self) -> Option<(&str, &str)> {
        self.controller
            .as_ref()
            .map(|(controller, method)| (controller.as_str(), method.as_str()))
    }
}
