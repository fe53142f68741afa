//! 返回值归类
//!
//! 优先级：渲染 > 发送 > 调用 > `false` > 文本 > 其他数据原样返回。

use crate::error::{DispatchResult, HttpFailure};
use crate::exchange::Exchange;
use crate::reply::Reply;
use crate::request::RequestMethod;
use crate::response::escape_html;
use serde_json::Value;

/// 归类结果
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 终止动作已经执行
    Handled,
    /// 交给调用方解释（`true`、映射或其他数据）
    Passthrough(Value),
}

/// 返回值归类器
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseHandler;

impl ResponseHandler {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, reply: Reply, exchange: &mut Exchange) -> DispatchResult<Outcome> {
        match reply {
            Reply::Render(view) => {
                view.render(&mut exchange.response);
                Ok(Outcome::Handled)
            }
            Reply::Send(response) => {
                response.send(exchange)?;
                Ok(Outcome::Handled)
            }
            Reply::Invoke(func) => {
                func(exchange)?;
                Ok(Outcome::Handled)
            }
            Reply::Bool(false) | Reply::Data(Value::Bool(false)) => {
                let failure = if exchange.request.is_method(RequestMethod::Get) {
                    HttpFailure::not_found("no response")
                } else {
                    HttpFailure::bad_request("no response")
                };
                Err(failure.into())
            }
            Reply::Text(text) | Reply::Data(Value::String(text)) => {
                exchange.response.write_html(&escape_html(&text));
                Ok(Outcome::Handled)
            }
            Reply::Bool(true) => Ok(Outcome::Passthrough(Value::Bool(true))),
            Reply::Data(data) => Ok(Outcome::Passthrough(data)),
            Reply::Empty => Ok(Outcome::Passthrough(Value::Null)),
        }
    }
}
