//! 分发内核
//!
//! 一次请求的完整流程：路由上下文 → 输入初始化与验证 → 中间件链 → 控制器 → 返回值归类。
//! 整个流程是同步的，没有挂起点；服务器适配层在阻塞线程池中调用。

use crate::binding;
use crate::controller::ControllerRegistry;
use crate::error::{DispatchError, DispatchResult};
use crate::exchange::Exchange;
use crate::initializer::RequestInitializer;
use crate::input::InputMap;
use crate::middleware::{MiddlewareInvoker, MiddlewareRegistry};
use crate::request::RawRequest;
use crate::response::ResponseSink;
use crate::response_handler::{Outcome, ResponseHandler};
use crate::route::{RouteContext, RouteTable};
use crate::session::Session;
use kestrel_core::ComponentRegistry;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

/// 分发结果
#[derive(Debug)]
pub struct DispatchOutput {
    pub response: ResponseSink,
    pub session: Session,
    /// 需要交给异常边界的错误；终止动作已写入响应时为 `None`
    pub error: Option<DispatchError>,
}

pub struct Kernel {
    routes: RouteTable,
    middleware: MiddlewareRegistry,
    controllers: ControllerRegistry,
    components: Arc<ComponentRegistry>,
    responses: ResponseHandler,
    domain: OnceLock<String>,
}

impl Kernel {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes,
            middleware: MiddlewareRegistry::new(),
            controllers: ControllerRegistry::new(),
            components: Arc::new(ComponentRegistry::new()),
            responses: ResponseHandler::new(),
            domain: OnceLock::new(),
        }
    }

    pub fn with_middleware(mut self, middleware: MiddlewareRegistry) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn with_controllers(mut self, controllers: ControllerRegistry) -> Self {
        self.controllers = controllers;
        self
    }

    pub fn with_components(mut self, components: Arc<ComponentRegistry>) -> Self {
        self.components = components;
        self
    }

    /// 预先设置站点域名，不再从第一个请求推断
    pub fn with_domain(self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        let _ = self.domain.set(domain.trim_end_matches('/').to_string());
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn components(&self) -> &Arc<ComponentRegistry> {
        &self.components
    }

    /// 站点域名，进程内只解析一次
    pub fn domain(&self, raw: &RawRequest) -> &str {
        self.domain.get_or_init(|| {
            let scheme = if raw.secure { "https" } else { "http" };
            let host = raw.host.as_deref().unwrap_or("localhost");
            format!("{}://{}", scheme, host)
        })
    }

    /// 分发一个请求
    pub fn dispatch(
        &self,
        route_key: usize,
        path_params: InputMap,
        raw: RawRequest,
        session: Session,
    ) -> DispatchOutput {
        let route = match self.routes.context(route_key, raw.method, path_params) {
            Ok(route) => route,
            Err(failure) => {
                return DispatchOutput {
                    response: ResponseSink::new(),
                    session,
                    error: Some(failure.into()),
                }
            }
        };

        let initializer = RequestInitializer::new(&route, &self.components);
        let domain = self.domain(&raw).to_string();
        let mut exchange = initializer.initialize(raw, &domain, session);

        let error = match self.run(&initializer, &route, &mut exchange) {
            Ok(()) | Err(DispatchError::Responded) => None,
            Err(err) => Some(err),
        };

        let Exchange {
            response, session, ..
        } = exchange;

        DispatchOutput {
            response,
            session,
            error,
        }
    }

    fn run(
        &self,
        initializer: &RequestInitializer<'_>,
        route: &RouteContext,
        exchange: &mut Exchange,
    ) -> DispatchResult<()> {
        initializer.validate(exchange)?;
        MiddlewareInvoker::new(&self.middleware, &self.components).run(route, exchange)?;
        self.invoke_controller(route, exchange)
    }

    /// 调用控制器；透传的数据以 JSON 输出，`true` 和空值输出空的 200
    fn invoke_controller(&self, route: &RouteContext, exchange: &mut Exchange) -> DispatchResult<()> {
        let handler = self.controllers.resolve(route)?;
        let (args, _) =
            binding::bind(handler.params(), exchange.request.inputs(), &self.components)?;
        let reply = handler.call(&args, exchange)?;

        match self.responses.handle(reply, exchange)? {
            Outcome::Handled
            | Outcome::Passthrough(Value::Null)
            | Outcome::Passthrough(Value::Bool(true)) => {}
            Outcome::Passthrough(data) => exchange.response.write_json(&data),
        }
        Ok(())
    }
}
