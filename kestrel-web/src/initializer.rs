//! 请求初始化与验证
//!
//! 1. 按合并规则生成输入数据
//! 2. 没有验证器也没有内联回调时，输入保持原样
//! 3. 按注册顺序执行验证器，失败的键写入 `false` 并记录错误，不提前退出
//! 4. 执行内联回调：`true` 采用内置类型映射，`false` 记录 `match` 错误，
//!    非空映射右合并到第 3 步的结果
//! 5. 有错误时走错误处理，否则用验证结果整体替换输入

use crate::binding;
use crate::error::{DispatchError, DispatchResult, FieldError, HttpFailure, MATCH_KEY};
use crate::exchange::Exchange;
use crate::input::{self, InputMap};
use crate::reply::Reply;
use crate::request::{RawRequest, RequestContext, RequestMethod};
use crate::response::ResponseSink;
use crate::response_handler::{Outcome, ResponseHandler};
use crate::route::RouteContext;
use crate::session::Session;
use kestrel_core::ComponentRegistry;
use kestrel_validator::FieldValidator;
use serde_json::Value;
use tracing::{debug, info};

/// 内联回调的裁决
enum Verdict {
    /// 返回 `true`，携带内置类型映射
    Accept(InputMap),
    /// 返回 `false`
    Reject,
    /// 返回非空映射
    Replace(InputMap),
    /// 其他值，携带内置类型映射
    Ignore(InputMap),
}

pub struct RequestInitializer<'a> {
    route: &'a RouteContext,
    components: &'a ComponentRegistry,
    responses: ResponseHandler,
}

impl<'a> RequestInitializer<'a> {
    pub fn new(route: &'a RouteContext, components: &'a ComponentRegistry) -> Self {
        Self {
            route,
            components,
            responses: ResponseHandler::new(),
        }
    }

    /// 生成本次请求的上下文，同时取走上一个请求的闪存
    pub fn initialize(&self, raw: RawRequest, domain: &str, mut session: Session) -> Exchange {
        let flash = session.take_flash();
        let request = RequestContext::from_raw(raw, self.route.path_params(), domain, flash);
        Exchange::new(request, session)
    }

    /// 执行验证管道
    pub fn validate(&self, exchange: &mut Exchange) -> DispatchResult<()> {
        let validators = self.route.validators();
        let callback = self.route.callback();

        if validators.is_none() && callback.is_none() {
            return Ok(());
        }

        let (mut validated, mut errors) = match validators {
            Some(validators) => validate_fields(validators, exchange.request.inputs()),
            None => (InputMap::new(), Vec::new()),
        };

        if let Some(handler) = callback {
            let (args, builtin) =
                binding::bind(handler.params(), exchange.request.inputs(), self.components)?;

            let result = handler.call(&args, exchange);
            match self.run_callback(result, builtin, &mut errors, exchange)? {
                Verdict::Accept(builtin) => input::merge(&mut validated, builtin),
                Verdict::Reject => errors.push(FieldError::unmatched()),
                Verdict::Replace(data) => input::merge(&mut validated, data),
                Verdict::Ignore(builtin) => {
                    if validators.is_none() {
                        validated = builtin;
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(error_response(self.route, errors, exchange));
        }

        exchange.request.overwrite(validated);
        Ok(())
    }

    /// 终止动作和失败都会连同已收集的字段错误一起走错误处理
    fn run_callback(
        &self,
        result: DispatchResult<Reply>,
        builtin: InputMap,
        errors: &mut Vec<FieldError>,
        exchange: &mut Exchange,
    ) -> DispatchResult<Verdict> {
        let outcome = result.and_then(|reply| match reply {
            Reply::Bool(false) | Reply::Data(Value::Bool(false)) => {
                Ok(Outcome::Passthrough(Value::Bool(false)))
            }
            reply => self.responses.handle(reply, exchange),
        });

        match outcome {
            Ok(Outcome::Passthrough(Value::Bool(true))) => Ok(Verdict::Accept(builtin)),
            Ok(Outcome::Passthrough(Value::Bool(false))) => Ok(Verdict::Reject),
            Ok(Outcome::Passthrough(Value::Object(data))) if !data.is_empty() => {
                Ok(Verdict::Replace(data))
            }
            Ok(Outcome::Passthrough(_)) => Ok(Verdict::Ignore(builtin)),
            // 回调自己已经输出了终止动作
            Ok(Outcome::Handled) if errors.is_empty() => Err(DispatchError::Responded),
            Ok(Outcome::Handled) => {
                debug!(route = %self.route.path(), errors = errors.len(), "Discarding callback output");
                exchange.response = ResponseSink::new();
                Err(error_response(self.route, std::mem::take(errors), exchange))
            }
            Err(DispatchError::Failure(failure)) => {
                debug!(route = %self.route.path(), error = %failure, "Route callback failed");
                errors.push(FieldError::new(MATCH_KEY, failure.code(), failure.message()));
                Err(error_response(self.route, std::mem::take(errors), exchange))
            }
            Err(other) => Err(other),
        }
    }
}

/// 按注册顺序验证每个键
///
/// 缺失的路径段解析为 null 交给验证器；失败时输出中写入 `false`。
pub fn validate_fields(
    validators: &[(String, FieldValidator)],
    raw: &InputMap,
) -> (InputMap, Vec<FieldError>) {
    let mut validated = InputMap::new();
    let mut errors = Vec::new();

    for (key, validator) in validators {
        let value = input::get_path(raw, key).unwrap_or(&Value::Null);

        let normalized = match validator.validate(value) {
            Ok(normalized) => normalized,
            Err(error) => {
                debug!(key = %key, code = error.code, message = %error.message, "Validation failed");
                errors.push(FieldError::from_validation(key.as_str(), &error));
                Value::Bool(false)
            }
        };

        input::set_path(&mut validated, key, normalized);
    }

    (validated, errors)
}

/// 错误处理
///
/// 有失败处理器时把所有错误写入会话并执行它，返回 [`DispatchError::Responded`]；
/// 否则用第一个错误的错误码和消息生成失败：GET 为 404，其他方法为无效输入。
pub fn error_response(
    route: &RouteContext,
    errors: Vec<FieldError>,
    exchange: &mut Exchange,
) -> DispatchError {
    if let Some(fails) = route.fails() {
        for error in &errors {
            exchange.session.add_error(
                &error.key,
                error.code.unwrap_or(0),
                error.message.as_deref().unwrap_or_default(),
            );
        }

        info!(
            route = %route.path(),
            method = %exchange.request.method(),
            errors = errors.len(),
            "Request rejected, running failure handler"
        );

        return match fails.send(exchange) {
            Ok(()) => DispatchError::Responded,
            Err(err) => err,
        };
    }

    let first = errors.into_iter().next();
    let code = first.as_ref().and_then(|e| e.code).unwrap_or(0);
    let message = first
        .and_then(|e| e.message)
        .unwrap_or_else(|| "Request validation failed.".to_string());

    if exchange.request.is_method(RequestMethod::Get) {
        HttpFailure::NotFound { code, message }.into()
    } else {
        HttpFailure::InvalidInput { code, message }.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Handler, Param};
    use crate::response::{Redirect, View};
    use crate::route::RouteTable;
    use kestrel_core::Scope;
    use kestrel_validator::{NumRule, StrRule, NUM_NOT_NUMERIC, STR_NOT_STRING};
    use serde_json::json;

    fn map(value: Value) -> InputMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn exchange(method: RequestMethod, input: Value) -> Exchange {
        let request =
            RequestContext::new(method, false, "http://localhost", map(input), InputMap::new());
        Exchange::new(request, Session::new("test"))
    }

    fn context(routes: &RouteTable, method: RequestMethod) -> RouteContext {
        routes.context(0, method, InputMap::new()).unwrap()
    }

    #[test]
    fn test_nested_key_is_normalized() {
        let mut routes = RouteTable::new();
        routes.path("a").match_num("a.b", NumRule::new().min(1));
        let route = context(&routes, RequestMethod::Get);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({"a": {"b": "5"}}));
        RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap();

        assert_eq!(Value::Object(ex.request.inputs().clone()), json!({"a": {"b": 5}}));
    }

    #[test]
    fn test_missing_nested_key_becomes_false() {
        let validators = vec![("a.b".to_string(), FieldValidator::num(NumRule::new().min(1)))];
        let (validated, errors) = validate_fields(&validators, &InputMap::new());

        assert_eq!(Value::Object(validated), json!({"a": {"b": false}}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "a.b");
        assert_eq!(errors[0].code, Some(NUM_NOT_NUMERIC));
    }

    #[test]
    fn test_all_keys_are_validated_without_short_circuit() {
        let validators = vec![
            ("id".to_string(), FieldValidator::num(NumRule::new())),
            ("name".to_string(), FieldValidator::str(StrRule::new())),
            ("page".to_string(), FieldValidator::num(NumRule::new())),
        ];
        let raw = map(json!({"id": "x", "name": 3, "page": "2"}));

        let (validated, errors) = validate_fields(&validators, &raw);

        assert_eq!(
            Value::Object(validated),
            json!({"id": false, "name": false, "page": 2})
        );
        let keys: Vec<&str> = errors.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["id", "name"]);
        assert_eq!(errors[1].code, Some(STR_NOT_STRING));
    }

    #[test]
    fn test_second_key_failure_keeps_first_value() {
        let validators = vec![
            ("id".to_string(), FieldValidator::num(NumRule::new())),
            ("name".to_string(), FieldValidator::str(StrRule::new().max_len(2))),
        ];
        let raw = map(json!({"id": "7", "name": "long"}));

        let (validated, errors) = validate_fields(&validators, &raw);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "name");
        assert_eq!(validated["id"], json!(7));
    }

    #[test]
    fn test_unvalidated_keys_are_dropped() {
        let mut routes = RouteTable::new();
        routes.path("a").match_str("name", StrRule::new());
        let route = context(&routes, RequestMethod::Get);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({"name": "kit", "extra": "x"}));
        RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap();

        assert_eq!(Value::Object(ex.request.inputs().clone()), json!({"name": "kit"}));
    }

    #[test]
    fn test_no_validators_leaves_input() {
        let mut routes = RouteTable::new();
        routes.path("a");
        let route = context(&routes, RequestMethod::Get);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({"q": "1"}));
        RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap();
        assert_eq!(ex.request.input("q"), Some(&json!("1")));
    }

    #[test]
    fn test_callback_true_uses_builtin_mapping() {
        let mut routes = RouteTable::new();
        routes.path("a").match_fn(Handler::new(
            [Param::named("id"), Param::named("missing")],
            |args, _| Ok(Reply::Bool(args.value("id") == &json!("3"))),
        ));
        let route = context(&routes, RequestMethod::Get);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({"id": "3", "body": "ignored"}));
        RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap();

        assert_eq!(
            Value::Object(ex.request.inputs().clone()),
            json!({"id": "3", "missing": null})
        );
    }

    #[test]
    fn test_callback_mapping_overrides_builtin_value() {
        let mut routes = RouteTable::new();
        routes
            .path("a")
            .methods([RequestMethod::Post])
            .match_num("x", NumRule::new())
            .match_str("y", StrRule::new())
            .match_fn(Handler::new([], |_, _| Ok(json!({"x": 1}).into())));
        let route = context(&routes, RequestMethod::Post);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Post, json!({"x": "9", "y": "keep"}));
        RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap();

        assert_eq!(
            Value::Object(ex.request.inputs().clone()),
            json!({"x": 1, "y": "keep"})
        );
    }

    #[test]
    fn test_callback_other_value_is_ignored() {
        let mut routes = RouteTable::new();
        routes
            .path("a")
            .match_num("x", NumRule::new())
            .match_fn(Handler::new([Param::named("x")], |_, _| Ok(Reply::Empty)));
        let route = context(&routes, RequestMethod::Get);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({"x": "9"}));
        RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap();
        assert_eq!(ex.request.input("x"), Some(&json!(9)));
    }

    #[test]
    fn test_callback_false_without_fails_throws_default_message() {
        let mut routes = RouteTable::new();
        routes
            .path("a")
            .methods([RequestMethod::Post])
            .match_fn(Handler::new([], |_, _| Ok(Reply::Bool(false))));
        let route = context(&routes, RequestMethod::Post);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Post, json!({}));
        let err = RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap_err();

        match err {
            DispatchError::Failure(HttpFailure::InvalidInput { code, message }) => {
                assert_eq!(code, 0);
                assert_eq!(message, "Request validation failed.");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_get_failure_is_not_found_with_first_error() {
        let mut routes = RouteTable::new();
        routes
            .path("a")
            .match_num("id", NumRule::new())
            .match_num("page", NumRule::new());
        let route = context(&routes, RequestMethod::Get);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({"id": "x", "page": "y"}));
        let err = RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap_err();

        match err {
            DispatchError::Failure(HttpFailure::NotFound { code, .. }) => {
                assert_eq!(code, NUM_NOT_NUMERIC)
            }
            other => panic!("unexpected: {:?}", other),
        }
        // 失败时输入不被替换
        assert_eq!(ex.request.input("id"), Some(&json!("x")));
    }

    #[test]
    fn test_fails_handler_records_every_error() {
        let mut routes = RouteTable::new();
        routes
            .path("form")
            .methods([RequestMethod::Post])
            .match_str("name", StrRule::new())
            .match_num("age", NumRule::new())
            .match_fn(Handler::new([], |_, _| Ok(Reply::Bool(false))))
            .fails(Redirect::to("form"));
        let route = context(&routes, RequestMethod::Post);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Post, json!({"name": "", "age": "x"}));
        let err = RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Responded));
        assert_eq!(ex.response.status(), axum::http::StatusCode::FOUND);

        let mut next = Session::with_data("test", ex.session.into_data());
        next.take_flash();
        assert!(next.has_error("name"));
        assert!(next.has_error("age"));
        assert_eq!(next.error_code("match"), Some(0));
        assert_eq!(next.error_message("match"), Some(""));
    }

    #[test]
    fn test_callback_failure_becomes_match_error() {
        let mut routes = RouteTable::new();
        routes
            .path("a")
            .methods([RequestMethod::Post])
            .match_fn(Handler::new([], |_, _| {
                Err(HttpFailure::validation(42, "taken").into())
            }));
        let route = context(&routes, RequestMethod::Post);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Post, json!({}));
        let err = RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap_err();

        match err {
            DispatchError::Failure(HttpFailure::InvalidInput { code, message }) => {
                assert_eq!((code, message.as_str()), (42, "taken"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_callback_render_terminates() {
        let mut routes = RouteTable::new();
        routes
            .path("a")
            .match_fn(Handler::new([], |_, _| Ok(View::from_html("<p>hi</p>").into())));
        let route = context(&routes, RequestMethod::Get);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({}));
        let err = RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Responded));
        assert_eq!(ex.response.body_text(), "<p>hi</p>");
    }

    #[test]
    fn test_callback_render_does_not_bypass_field_errors() {
        let mut routes = RouteTable::new();
        routes
            .path("a")
            .match_num("id", NumRule::new())
            .match_fn(Handler::new([], |_, _| Ok(View::from_html("ok").into())));
        let route = context(&routes, RequestMethod::Get);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Get, json!({"id": "x"}));
        let err = RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap_err();

        match err {
            DispatchError::Failure(HttpFailure::NotFound { code, .. }) => {
                assert_eq!(code, NUM_NOT_NUMERIC)
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(ex.response.body_text(), "");
    }

    #[test]
    fn test_callback_failure_keeps_field_errors() {
        let mut routes = RouteTable::new();
        routes
            .path("a")
            .methods([RequestMethod::Post])
            .match_num("id", NumRule::new())
            .match_fn(Handler::new([], |_, _| {
                Err(HttpFailure::validation(42, "taken").into())
            }));
        let route = context(&routes, RequestMethod::Post);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Post, json!({"id": "x"}));
        let err = RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap_err();

        // 第一个错误来自字段验证
        match err {
            DispatchError::Failure(HttpFailure::InvalidInput { code, .. }) => {
                assert_eq!(code, NUM_NOT_NUMERIC)
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_callback_failure_with_fails_records_field_errors() {
        let mut routes = RouteTable::new();
        routes
            .path("a")
            .methods([RequestMethod::Post])
            .match_num("id", NumRule::new())
            .match_fn(Handler::new([], |_, _| {
                Err(HttpFailure::validation(42, "taken").into())
            }))
            .fails(Redirect::to("a"));
        let route = context(&routes, RequestMethod::Post);
        let components = ComponentRegistry::new();

        let mut ex = exchange(RequestMethod::Post, json!({"id": "x"}));
        let err = RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Responded));

        let mut next = Session::with_data("test", ex.session.into_data());
        next.take_flash();
        assert!(next.has_error("id"));
        assert_eq!(next.error_code("match"), Some(42));
    }

    #[test]
    fn test_callback_component_injection() {
        struct Clock(i64);

        let mut routes = RouteTable::new();
        routes.path("a").match_fn(Handler::new(
            [Param::component::<Clock>(), Param::named("at")],
            |args, _| {
                let clock = args.component::<Clock>();
                Ok(Reply::Bool(clock.map(|c| c.0) == args.i64("at")))
            },
        ));
        let route = context(&routes, RequestMethod::Get);

        let components = ComponentRegistry::new();
        components.register::<Clock, _>(Scope::Prototype, || Ok(Clock(5)));

        let mut ex = exchange(RequestMethod::Get, json!({"at": 5}));
        RequestInitializer::new(&route, &components)
            .validate(&mut ex)
            .unwrap();
        assert_eq!(ex.request.input("at"), Some(&json!(5)));

        let empty = ComponentRegistry::new();
        let mut ex = exchange(RequestMethod::Get, json!({"at": 5}));
        let err = RequestInitializer::new(&route, &empty)
            .validate(&mut ex)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
    }

    #[test]
    fn test_initialize_consumes_flash() {
        let mut routes = RouteTable::new();
        routes.path("user/{id}");
        let route = routes
            .context(0, RequestMethod::Get, map(json!({"id": "3"})))
            .unwrap();
        let components = ComponentRegistry::new();

        let mut previous = Session::new("s");
        previous.flash("notice", json!("hello"));
        let session = Session::with_data("s", previous.into_data());

        let raw = RawRequest::new(RequestMethod::Get).query_string("page=1");
        let ex = RequestInitializer::new(&route, &components).initialize(raw, "http://h", session);

        assert_eq!(ex.request.flash()["notice"], json!("hello"));
        assert_eq!(ex.request.input("id"), Some(&json!("3")));
        assert_eq!(ex.request.domain(), "http://h");
        assert!(ex.session.into_data().is_empty());
    }
}
