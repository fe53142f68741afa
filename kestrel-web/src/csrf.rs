//! CSRF 校验
//!
//! 令牌由 [`Session::csrf_token`] 生成，表单通过 `_csrf` 字段提交，AJAX 请求使用
//! `X-CSRF-Token` 头部。内置中间件以 `csrf` 为名注册。

use crate::binding::{Arguments, Param};
use crate::constants::{CSRF_FIELD, CSRF_HEADER};
use crate::error::DispatchResult;
use crate::exchange::Exchange;
use crate::middleware::{Middleware, MiddlewareRegistration};
use crate::reply::Reply;
use crate::request::RequestMethod;
use crate::session::Session;

/// 生成新的令牌，返回表单隐藏字段
pub fn csrf_field(session: &mut Session) -> String {
    format!(
        r#"<input type="hidden" name="{}" value="{}" />"#,
        CSRF_FIELD,
        session.csrf_token()
    )
}

/// GET 以外的请求必须带上有效令牌
///
/// 没有令牌时为错误请求，会话中没有令牌或令牌不匹配时为验证失败，
/// 都按路由的失败处理策略处理。
#[derive(Debug, Default)]
pub struct VerifyCsrf;

impl Middleware for VerifyCsrf {
    fn params(&self) -> Vec<Param> {
        vec![Param::named(CSRF_FIELD)]
    }

    fn handle(&self, args: &Arguments, exchange: &mut Exchange) -> DispatchResult<Reply> {
        if exchange.request.is_method(RequestMethod::Get) {
            return Ok(Reply::Empty);
        }

        let token = args
            .str(CSRF_FIELD)
            .or_else(|| exchange.request.header(CSRF_HEADER));
        exchange.session.verify_csrf(token)?;
        Ok(Reply::Empty)
    }
}

fn verify_csrf() -> Box<dyn Middleware> {
    Box::new(VerifyCsrf)
}

inventory::submit! { MiddlewareRegistration::new("csrf", verify_csrf) }
