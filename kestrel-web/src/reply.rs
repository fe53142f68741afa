use crate::error::DispatchResult;
use crate::exchange::Exchange;
use crate::input::InputMap;
use crate::response::{JsonResponse, Redirect, Renderable, Sendable, View};
use serde_json::Value;
use std::fmt;

type Deferred = Box<dyn FnOnce(&mut Exchange) -> DispatchResult<()> + Send>;

/// 回调、中间件和控制器的返回值
///
/// 交给 [`ResponseHandler`](crate::response_handler::ResponseHandler) 归类。
pub enum Reply {
    Render(Box<dyn Renderable>),
    Send(Box<dyn Sendable>),
    /// 无参调用
    Invoke(Deferred),
    Bool(bool),
    Text(String),
    Data(Value),
    Empty,
}

impl Reply {
    pub fn render(view: impl Renderable + 'static) -> Self {
        Reply::Render(Box::new(view))
    }

    pub fn send(response: impl Sendable + 'static) -> Self {
        Reply::Send(Box::new(response))
    }

    pub fn invoke<F>(func: F) -> Self
    where
        F: FnOnce(&mut Exchange) -> DispatchResult<()> + Send + 'static,
    {
        Reply::Invoke(Box::new(func))
    }

    /// 合并回输入数据的映射
    pub fn patch(data: InputMap) -> Self {
        Reply::Data(Value::Object(data))
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Render(_) => f.write_str("Render(..)"),
            Reply::Send(_) => f.write_str("Send(..)"),
            Reply::Invoke(_) => f.write_str("Invoke(..)"),
            Reply::Bool(b) => write!(f, "Bool({})", b),
            Reply::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Reply::Data(data) => f.debug_tuple("Data").field(data).finish(),
            Reply::Empty => f.write_str("Empty"),
        }
    }
}

impl From<bool> for Reply {
    fn from(value: bool) -> Self {
        Reply::Bool(value)
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Reply::Text(value)
    }
}

impl From<&str> for Reply {
    fn from(value: &str) -> Self {
        Reply::Text(value.to_string())
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Data(value)
    }
}

impl From<InputMap> for Reply {
    fn from(value: InputMap) -> Self {
        Reply::patch(value)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

impl From<View> for Reply {
    fn from(view: View) -> Self {
        Reply::render(view)
    }
}

impl From<Redirect> for Reply {
    fn from(redirect: Redirect) -> Self {
        Reply::send(redirect)
    }
}

impl From<JsonResponse> for Reply {
    fn from(response: JsonResponse) -> Self {
        Reply::send(response)
    }
}
