//! 示例中间件，通过 inventory 在编译时注册

use crate::controllers::UserDirectory;
use kestrel_web::prelude::*;

/// 记录请求方法，不修改输入
struct Timing;

impl Middleware for Timing {
    fn handle(&self, _args: &Arguments, exchange: &mut Exchange) -> DispatchResult<Reply> {
        tracing::debug!(method = %exchange.request.method(), "Request entered pipeline");
        Ok(Reply::Empty)
    }
}

/// 按 id 加载用户，合并到输入数据
struct LoadUser;

impl Middleware for LoadUser {
    fn params(&self) -> Vec<Param> {
        vec![Param::component::<UserDirectory>(), Param::named("id")]
    }

    fn handle(&self, args: &Arguments, _exchange: &mut Exchange) -> DispatchResult<Reply> {
        let directory = args
            .component::<UserDirectory>()
            .ok_or_else(|| HttpFailure::not_found("User directory unavailable."))?;

        let id = args.i64("id").unwrap_or_default();
        match directory.find(id) {
            Some(user) => Ok(json!({ "user": user }).into()),
            None => Err(HttpFailure::not_found("User not found.").into()),
        }
    }
}

/// 简单的令牌校验
struct Auth;

impl Middleware for Auth {
    fn params(&self) -> Vec<Param> {
        vec![Param::named("token")]
    }

    fn handle(&self, args: &Arguments, _exchange: &mut Exchange) -> DispatchResult<Reply> {
        match args.str("token") {
            Some("secret") => Ok(json!({ "admin": true }).into()),
            _ => Err(HttpFailure::validation(401, "Unauthorized").into()),
        }
    }
}

fn timing() -> Box<dyn Middleware> {
    Box::new(Timing)
}

fn load_user() -> Box<dyn Middleware> {
    Box::new(LoadUser)
}

fn auth() -> Box<dyn Middleware> {
    Box::new(Auth)
}

inventory::submit! { MiddlewareRegistration::new("timing", timing) }
inventory::submit! { MiddlewareRegistration::new("load_user", load_user) }
inventory::submit! { MiddlewareRegistration::new("auth", auth) }
