//! HTTP 层中间件
//!
//! 与路由中间件不同，这里是包在 axum 路由外面的 `from_fn` 中间件。
//! `request_id` 在最外层，访问日志通过请求扩展拿到同一个 ID。

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// 本次请求的 ID，放在请求扩展里
#[derive(Debug, Clone)]
pub struct RequestId(pub HeaderValue);

impl RequestId {
    fn from_request(req: &Request) -> Self {
        match req.headers().get(&REQUEST_ID_HEADER) {
            Some(value) if !value.is_empty() => Self(value.clone()),
            _ => {
                let id = uuid::Uuid::new_v4().simple().to_string();
                Self(HeaderValue::from_str(&id).unwrap_or_else(|_| HeaderValue::from_static("-")))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.to_str().unwrap_or("-")
    }
}

/// 沿用客户端的 `X-Request-ID`，没有时生成一个，并回写到响应
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = RequestId::from_request(&req);
    req.headers_mut().insert(REQUEST_ID_HEADER.clone(), id.0.clone());
    req.extensions_mut().insert(id.clone());

    let mut response = next.run(req).await;
    response.headers_mut().insert(REQUEST_ID_HEADER.clone(), id.0);
    response
}

/// 访问日志，只记录路径，不记录查询串
pub async fn request_logging(req: Request, next: Next) -> Response {
    let id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.as_str().to_string())
        .unwrap_or_default();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        request_id = %id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );
    response
}
