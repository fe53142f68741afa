//! 路由中间件
//!
//! 中间件按名称注册，在路由注册时引用。执行顺序：内核中间件、分组中间件、路由中间件。
//!
//! 返回映射时合并到输入数据，后面的中间件和控制器都能看到；
//! 返回终止动作时请求结束；抛出验证类失败时按路由的失败处理策略处理，后续中间件不再执行。
//!
//! # 示例
//!
//! ```ignore
//! struct Auth;
//!
//! impl Middleware for Auth {
//!     fn params(&self) -> Vec<Param> {
//!         vec![Param::named("token")]
//!     }
//!
//!     fn handle(&self, args: &Arguments, _exchange: &mut Exchange) -> DispatchResult<Reply> {
//!         match args.str("token") {
//!             Some("secret") => Ok(json!({"user": "admin"}).into()),
//!             _ => Err(HttpFailure::validation(401, "Unauthorized").into()),
//!         }
//!     }
//! }
//!
//! inventory::submit! {
//!     MiddlewareRegistration::new("auth", || Box::new(Auth))
//! }
//! ```

use crate::binding::{self, Arguments, Handler, Param};
use crate::error::{ConfigurationError, DispatchError, DispatchResult, FieldError, HttpFailure};
use crate::exchange::Exchange;
use crate::initializer::error_response;
use crate::reply::Reply;
use crate::response_handler::{Outcome, ResponseHandler};
use crate::route::RouteContext;
use kestrel_core::ComponentRegistry;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 中间件
pub trait Middleware: Send + Sync {
    /// 需要绑定的参数
    fn params(&self) -> Vec<Param> {
        Vec::new()
    }

    /// 入口
    fn handle(&self, args: &Arguments, exchange: &mut Exchange) -> DispatchResult<Reply>;
}

impl Middleware for Handler {
    fn params(&self) -> Vec<Param> {
        Handler::params(self).to_vec()
    }

    fn handle(&self, args: &Arguments, exchange: &mut Exchange) -> DispatchResult<Reply> {
        self.call(args, exchange)
    }
}

/// 中间件注册信息
pub struct MiddlewareRegistration {
    pub name: &'static str,
    pub create: fn() -> Box<dyn Middleware>,
}

impl MiddlewareRegistration {
    pub const fn new(name: &'static str, create: fn() -> Box<dyn Middleware>) -> Self {
        Self { name, create }
    }
}

inventory::collect!(MiddlewareRegistration);

/// 中间件注册表
#[derive(Default, Clone)]
pub struct MiddlewareRegistry {
    middleware: HashMap<String, Arc<dyn Middleware>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: Middleware + 'static>(&mut self, name: impl Into<String>, middleware: M) {
        self.middleware.insert(name.into(), Arc::new(middleware));
    }

    pub fn register_boxed(&mut self, name: impl Into<String>, middleware: Box<dyn Middleware>) {
        self.middleware.insert(name.into(), Arc::from(middleware));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Middleware>> {
        self.middleware.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.middleware.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// 使用编译时收集的中间件构建注册表
    pub fn from_inventory() -> Self {
        let mut registry = Self::new();

        for registration in inventory::iter::<MiddlewareRegistration> {
            registry.register_boxed(registration.name, (registration.create)());
            tracing::info!(middleware = registration.name, "Auto-registered middleware");
        }

        tracing::info!(
            count = registry.len(),
            "Middleware discovery completed"
        );
        registry
    }
}

/// 中间件链执行器
pub struct MiddlewareInvoker<'a> {
    registry: &'a MiddlewareRegistry,
    components: &'a ComponentRegistry,
    responses: ResponseHandler,
}

impl<'a> MiddlewareInvoker<'a> {
    pub fn new(registry: &'a MiddlewareRegistry, components: &'a ComponentRegistry) -> Self {
        Self {
            registry,
            components,
            responses: ResponseHandler::new(),
        }
    }

    /// 依次执行路由上的中间件
    pub fn run(&self, route: &RouteContext, exchange: &mut Exchange) -> DispatchResult<()> {
        let Some(names) = route.middleware() else {
            return Ok(());
        };

        for name in names {
            let middleware = self
                .registry
                .get(name)
                .ok_or_else(|| ConfigurationError::MiddlewareNotFound(name.clone()))?;

            let (args, _) =
                binding::bind(&middleware.params(), exchange.request.inputs(), self.components)?;

            debug!(route = %route.path(), middleware = %name, "Running middleware");

            let outcome = middleware
                .handle(&args, exchange)
                .and_then(|reply| self.responses.handle(reply, exchange));

            match outcome {
                Ok(Outcome::Handled) => {
                    debug!(middleware = %name, "Middleware responded");
                    return Err(DispatchError::Responded);
                }
                Ok(Outcome::Passthrough(Value::Object(patch))) => exchange.request.merge(patch),
                Ok(Outcome::Passthrough(_)) => {}
                Err(DispatchError::Failure(failure)) if is_recoverable(&failure) => {
                    debug!(middleware = %name, error = %failure, "Middleware rejected request");
                    let error = FieldError::new(name.as_str(), failure.code(), failure.message());
                    return Err(error_response(route, vec![error], exchange));
                }
                Err(other) => return Err(other),
            }
        }

        Ok(())
    }
}

/// 可以交给失败处理器的失败类型
fn is_recoverable(failure: &HttpFailure) -> bool {
    matches!(
        failure,
        HttpFailure::Validation { .. } | HttpFailure::NotFound { .. } | HttpFailure::BadRequest { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputMap;
    use crate::request::{RequestContext, RequestMethod};
    use crate::response::Redirect;
    use crate::route::RouteTable;
    use crate::session::Session;
    use parking_lot::Mutex;
    use serde_json::json;

    fn exchange(method: RequestMethod, input: Value) -> Exchange {
        let input = input.as_object().cloned().unwrap_or_default();
        let request = RequestContext::new(method, false, "http://localhost", input, InputMap::new());
        Exchange::new(request, Session::new("test"))
    }

    struct Recorder {
        name: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Recorder {
        fn handle(&self, _args: &Arguments, _exchange: &mut Exchange) -> DispatchResult<Reply> {
            self.seen.lock().push(self.name.to_string());
            Ok(Reply::Empty)
        }
    }

    fn flagging() -> Handler {
        Handler::new([], |_, _| Ok(json!({"flag": true}).into()))
    }

    fn rejecting() -> Handler {
        Handler::new([], |_, _| Err(HttpFailure::validation(7, "denied").into()))
    }

    #[test]
    fn test_runs_in_attachment_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = MiddlewareRegistry::new();
        for name in ["kernel", "group", "route"] {
            registry.register(
                name,
                Recorder {
                    name,
                    seen: Arc::clone(&seen),
                },
            );
        }

        let mut routes = RouteTable::new();
        routes.kernel_middleware(["kernel"]);
        routes.group(["group"], |t| {
            t.path("a").middleware(["route"]);
        });
        let route = routes.context(0, RequestMethod::Get, InputMap::new()).unwrap();
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({}));
        MiddlewareInvoker::new(&registry, &components)
            .run(&route, &mut ex)
            .unwrap();

        assert_eq!(*seen.lock(), vec!["kernel", "group", "route"]);
    }

    #[test]
    fn test_patch_is_visible_to_later_middleware() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("a", flagging());
        registry.register(
            "b",
            Handler::new([Param::named("flag")], |args, _| {
                Ok(json!({"observed": args.bool("flag") == Some(true)}).into())
            }),
        );

        let mut routes = RouteTable::new();
        routes.path("a").middleware(["a", "b"]);
        let route = routes.context(0, RequestMethod::Get, InputMap::new()).unwrap();
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({"flag": false}));
        MiddlewareInvoker::new(&registry, &components)
            .run(&route, &mut ex)
            .unwrap();

        assert_eq!(ex.request.input("flag"), Some(&json!(true)));
        assert_eq!(ex.request.input("observed"), Some(&json!(true)));
    }

    #[test]
    fn test_failure_stops_chain_and_keeps_prior_patch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = MiddlewareRegistry::new();
        registry.register("a", flagging());
        registry.register("b", rejecting());
        registry.register(
            "c",
            Recorder {
                name: "c",
                seen: Arc::clone(&seen),
            },
        );

        let mut routes = RouteTable::new();
        routes
            .path("a")
            .methods([RequestMethod::Post])
            .middleware(["a", "b", "c"]);
        let route = routes.context(0, RequestMethod::Post, InputMap::new()).unwrap();
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Post, json!({}));
        let err = MiddlewareInvoker::new(&registry, &components)
            .run(&route, &mut ex)
            .unwrap_err();

        match err {
            DispatchError::Failure(HttpFailure::InvalidInput { code, message }) => {
                assert_eq!((code, message.as_str()), (7, "denied"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(ex.request.input("flag"), Some(&json!(true)));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_failure_goes_to_fails_handler_keyed_by_name() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("auth", rejecting());

        let mut routes = RouteTable::new();
        routes
            .path("a")
            .middleware(["auth"])
            .fails(Redirect::to("login"));
        let route = routes.context(0, RequestMethod::Get, InputMap::new()).unwrap();
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({}));
        let err = MiddlewareInvoker::new(&registry, &components)
            .run(&route, &mut ex)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Responded));

        let mut next = Session::with_data("test", ex.session.into_data());
        next.take_flash();
        assert_eq!(next.error_code("auth"), Some(7));
        assert_eq!(next.error_message("auth"), Some("denied"));
    }

    #[test]
    fn test_false_reply_is_tagged_with_middleware_name() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("gate", Handler::new([], |_, _| Ok(Reply::Bool(false))));

        let mut routes = RouteTable::new();
        routes.path("a").middleware(["gate"]);
        let route = routes.context(0, RequestMethod::Get, InputMap::new()).unwrap();
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({}));
        let err = MiddlewareInvoker::new(&registry, &components)
            .run(&route, &mut ex)
            .unwrap_err();

        match err {
            DispatchError::Failure(HttpFailure::NotFound { message, .. }) => {
                assert_eq!(message, "no response")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_input_propagates_unchanged() {
        let mut registry = MiddlewareRegistry::new();
        registry.register(
            "strict",
            Handler::new([], |_, _| Err(HttpFailure::invalid_input(9, "bad").into())),
        );

        let mut routes = RouteTable::new();
        routes.path("a").middleware(["strict"]).fails(Redirect::home());
        let route = routes.context(0, RequestMethod::Get, InputMap::new()).unwrap();
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({}));
        let err = MiddlewareInvoker::new(&registry, &components)
            .run(&route, &mut ex)
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Failure(HttpFailure::InvalidInput { code: 9, .. })
        ));
        assert!(!ex.response.status().is_redirection());
    }

    #[test]
    fn test_unknown_middleware_is_configuration_error() {
        let registry = MiddlewareRegistry::new();
        let mut routes = RouteTable::new();
        routes.path("a").middleware(["missing"]);
        let route = routes.context(0, RequestMethod::Get, InputMap::new()).unwrap();
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({}));
        let err = MiddlewareInvoker::new(&registry, &components)
            .run(&route, &mut ex)
            .unwrap_err();

        match err {
            DispatchError::Configuration(ConfigurationError::MiddlewareNotFound(name)) => {
                assert_eq!(name, "missing")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_terminal_reply_stops_request() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("html", Handler::new([], |_, _| Ok("<i>stop</i>".into())));

        let mut routes = RouteTable::new();
        routes.path("a").middleware(["html"]);
        let route = routes.context(0, RequestMethod::Get, InputMap::new()).unwrap();
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({}));
        let err = MiddlewareInvoker::new(&registry, &components)
            .run(&route, &mut ex)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Responded));
        assert_eq!(ex.response.body_text(), "&lt;i&gt;stop&lt;/i&gt;");
    }
}
