//! 响应
//!
//! 管道本身是同步的，处理器把结果写进 [`ResponseSink`]，由服务器适配层转换成 HTTP 响应。

use crate::error::{ConfigurationError, DispatchResult, FieldError};
use crate::exchange::Exchange;
use crate::input::InputMap;
use crate::template::TemplateEngine;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

/// HTML 转义，单双引号都转义
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 响应缓冲
#[derive(Debug)]
pub struct ResponseSink {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Default for ResponseSink {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 追加 HTML 文本
    pub fn write_html(&mut self, html: &str) {
        self.set_default_content_type("text/html; charset=utf-8");
        self.body.extend_from_slice(html.as_bytes());
    }

    /// 以 JSON 替换响应体
    pub fn write_json(&mut self, data: &Value) {
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = data.to_string().into_bytes();
    }

    fn set_default_content_type(&mut self, content_type: &'static str) {
        if !self.headers.contains_key(header::CONTENT_TYPE) {
            self.headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }
}

impl IntoResponse for ResponseSink {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// 可渲染的结果（视图）
pub trait Renderable: Send + Sync {
    fn render(&self, sink: &mut ResponseSink);
}

/// 可发送的结果（重定向、JSON 等），可以读写会话
pub trait Sendable: Send + Sync {
    fn send(&self, exchange: &mut Exchange) -> DispatchResult<()>;
}

// ==================== View ====================

/// 视图：预先渲染好的 HTML 缓冲
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct View {
    cache: String,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_html(html: impl Into<String>) -> Self {
        Self { cache: html.into() }
    }

    /// 渲染模板并追加到缓冲
    pub fn make(
        mut self,
        engine: &TemplateEngine,
        template: &str,
        values: &InputMap,
    ) -> Result<Self, ConfigurationError> {
        let html = engine.render(template, values)?;
        self.cache.push_str(&html);
        Ok(self)
    }

    /// 追加另一个视图
    pub fn append(mut self, view: &View) -> Self {
        self.cache.push_str(&view.cache);
        self
    }

    pub fn cache(&self) -> &str {
        &self.cache
    }
}

impl Renderable for View {
    fn render(&self, sink: &mut ResponseSink) {
        sink.write_html(&self.cache);
    }
}

// ==================== JSON ====================

/// JSON 响应
#[derive(Debug, Clone)]
pub struct JsonResponse {
    data: Value,
    status: StatusCode,
}

impl JsonResponse {
    pub fn new(data: impl Into<Value>) -> Self {
        Self {
            data: data.into(),
            status: StatusCode::OK,
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl Sendable for JsonResponse {
    fn send(&self, exchange: &mut Exchange) -> DispatchResult<()> {
        exchange.response.set_status(self.status);
        exchange.response.write_json(&self.data);
        Ok(())
    }
}

// ==================== Redirect ====================

/// 重定向
///
/// 相对地址基于站点域名解析；发送时把闪存数据、错误和旧输入写入会话。
#[derive(Debug, Clone)]
pub struct Redirect {
    url: Option<String>,
    status: StatusCode,
    flash: InputMap,
    errors: Vec<FieldError>,
    keep_input: Option<Vec<String>>,
}

impl Redirect {
    /// 重定向到指定地址
    pub fn to(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::home()
        }
    }

    /// 重定向到站点根路径
    pub fn home() -> Self {
        Self {
            url: None,
            status: StatusCode::FOUND,
            flash: InputMap::new(),
            errors: Vec::new(),
            keep_input: None,
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.flash.insert(key.into(), value);
        self
    }

    pub fn with_errors(mut self, key: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        self.errors.push(FieldError::new(key, code, message));
        self
    }

    /// 保留本次请求的输入，`except` 中的键不保留
    pub fn with_input(mut self, except: &[&str]) -> Self {
        self.keep_input = Some(except.iter().map(|s| s.to_string()).collect());
        self
    }

    /// 解析最终地址
    pub fn target(&self, domain: &str) -> String {
        let domain = domain.trim_end_matches('/');
        match self.url.as_deref() {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                url.to_string()
            }
            Some(path) => format!("{}/{}", domain, path.trim_start_matches('/')),
            None => format!("{}/", domain),
        }
    }
}

impl Sendable for Redirect {
    fn send(&self, exchange: &mut Exchange) -> DispatchResult<()> {
        let target = self.target(exchange.request.domain());
        let location = HeaderValue::from_str(&target).map_err(|_| {
            ConfigurationError::InvalidHeader {
                name: header::LOCATION.to_string(),
                value: target.clone(),
            }
        })?;

        for (key, value) in &self.flash {
            exchange.session.flash(key.clone(), value.clone());
        }
        for error in &self.errors {
            exchange.session.add_error(
                &error.key,
                error.code.unwrap_or(0),
                error.message.as_deref().unwrap_or_default(),
            );
        }
        if let Some(except) = &self.keep_input {
            let except: Vec<&str> = except.iter().map(String::as_str).collect();
            exchange
                .session
                .flash_input(exchange.request.inputs(), &except);
        }

        tracing::debug!(location = %target, status = %self.status.as_u16(), "Redirecting");
        exchange.response.set_status(self.status);
        exchange.response.header(header::LOCATION, location);
        Ok(())
    }
}
