//! 请求上下文
//!
//! [`RawRequest`] 是 HTTP 层交给管道的原始数据，[`RequestContext`] 是每个请求新建的
//! 可变状态，贯穿整个管道。

use crate::constants::OLD_ARRAY_KEY;
use crate::input::{self, InputMap};
use http::HeaderMap;
use kestrel_validator::UploadedFile;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// 支持的 HTTP 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl RequestMethod {
    pub const ALL: [RequestMethod; 5] = [
        RequestMethod::Get,
        RequestMethod::Post,
        RequestMethod::Put,
        RequestMethod::Patch,
        RequestMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Put => "PUT",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Delete => "DELETE",
        }
    }

    /// 小写形式，用作约定的控制器方法名
    pub fn as_lower(&self) -> &'static str {
        match self {
            RequestMethod::Get => "get",
            RequestMethod::Post => "post",
            RequestMethod::Put => "put",
            RequestMethod::Patch => "patch",
            RequestMethod::Delete => "delete",
        }
    }
}

impl FromStr for RequestMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(RequestMethod::Get),
            "POST" => Ok(RequestMethod::Post),
            "PUT" => Ok(RequestMethod::Put),
            "PATCH" => Ok(RequestMethod::Patch),
            "DELETE" => Ok(RequestMethod::Delete),
            _ => Err(format!("Unsupported request method: {}", s)),
        }
    }
}

impl TryFrom<&http::Method> for RequestMethod {
    type Error = String;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP 层解析出的原始请求
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: RequestMethod,
    pub is_json: bool,
    pub query: InputMap,
    pub body: InputMap,
    pub files: InputMap,
    pub host: Option<String>,
    pub secure: bool,
    pub headers: HeaderMap,
}

impl RawRequest {
    pub fn new(method: RequestMethod) -> Self {
        Self {
            method,
            is_json: false,
            query: InputMap::new(),
            body: InputMap::new(),
            files: InputMap::new(),
            host: None,
            secure: false,
            headers: HeaderMap::new(),
        }
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn query_string(mut self, query: &str) -> Self {
        self.query = input::parse_query(query);
        self
    }

    pub fn query(mut self, query: InputMap) -> Self {
        self.query = query;
        self
    }

    /// 根据 Content-Type 标记 JSON 请求
    pub fn content_type(mut self, content_type: &str) -> Self {
        self.is_json = content_type.contains("application/json");
        self
    }

    /// JSON 请求体；不是 JSON 对象时视为空
    pub fn json_body(mut self, bytes: &[u8]) -> Self {
        self.is_json = true;
        self.body = match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::debug!("Request body is not a JSON object, ignoring it");
                InputMap::new()
            }
        };
        self
    }

    pub fn form_body(mut self, body: InputMap) -> Self {
        self.body = body;
        self
    }

    pub fn urlencoded_body(mut self, body: &str) -> Self {
        self.body = input::parse_query(body);
        self
    }

    pub fn file(mut self, field: &str, file: &UploadedFile) -> Self {
        input::insert_bracketed(&mut self.files, field, file.to_value());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// 合并输入数据
    ///
    /// - GET：查询参数 < 路径参数
    /// - 其他：查询参数 < 请求体 < 路径参数 < 上传文件
    pub fn into_input(self, path_params: &InputMap) -> InputMap {
        let mut data = self.query;

        if self.method == RequestMethod::Get {
            input::merge(&mut data, path_params.clone());
            return data;
        }

        input::merge(&mut data, self.body);
        input::merge(&mut data, path_params.clone());
        input::merge(&mut data, self.files);
        data
    }
}

/// 每个请求的上下文
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: RequestMethod,
    is_json: bool,
    domain: String,
    input: InputMap,
    flash: InputMap,
    headers: HeaderMap,
}

impl RequestContext {
    pub fn new(
        method: RequestMethod,
        is_json: bool,
        domain: impl Into<String>,
        input: InputMap,
        flash: InputMap,
    ) -> Self {
        Self {
            method,
            is_json,
            domain: domain.into(),
            input,
            flash,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn from_raw(
        mut raw: RawRequest,
        path_params: &InputMap,
        domain: impl Into<String>,
        flash: InputMap,
    ) -> Self {
        let method = raw.method;
        let is_json = raw.is_json;
        let headers = std::mem::take(&mut raw.headers);
        Self::new(method, is_json, domain, raw.into_input(path_params), flash).with_headers(headers)
    }

    /// 请求头，值不是合法字符串时视为不存在
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn method(&self) -> RequestMethod {
        self.method
    }

    pub fn is_method(&self, method: RequestMethod) -> bool {
        self.method == method
    }

    pub fn is_json(&self) -> bool {
        self.is_json
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// 全部输入数据
    pub fn inputs(&self) -> &InputMap {
        &self.input
    }

    /// 按点路径读取输入
    pub fn input(&self, path: &str) -> Option<&Value> {
        input::get_path(&self.input, path)
    }

    pub fn input_or(&self, path: &str, default: Value) -> Value {
        self.input(path).cloned().unwrap_or(default)
    }

    /// 键存在且不为 null
    pub fn has(&self, name: &str) -> bool {
        self.input
            .get(name)
            .map(|value| !value.is_null())
            .unwrap_or(false)
    }

    /// 读取嵌套对象的副本
    pub fn object(&self, path: &str) -> Option<InputMap> {
        match self.input(path) {
            Some(Value::Object(map)) => Some(map.clone()),
            _ => None,
        }
    }

    /// 整体替换输入数据
    pub fn overwrite(&mut self, input: InputMap) {
        self.input = input;
    }

    /// 右合并到输入数据
    pub fn merge(&mut self, patch: InputMap) {
        input::merge(&mut self.input, patch);
    }

    /// 上一个请求留下的闪存数据
    pub fn flash(&self) -> &InputMap {
        &self.flash
    }

    /// 上一个请求的旧输入
    pub fn old(&self, key: &str) -> Option<&Value> {
        match self.flash.get(OLD_ARRAY_KEY) {
            Some(Value::Object(old)) => input::get_path(old, key),
            _ => None,
        }
    }
}
