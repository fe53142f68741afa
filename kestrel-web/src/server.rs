//! Web 服务器模块
//!
//! 基于 Axum 的服务器适配层：解析原始请求、加载会话，在阻塞线程池中运行同步的分发内核，
//! 最后把结果或错误转换成 HTTP 响应。

use crate::constants::*;
use crate::error::{DispatchError, HttpFailure};
use crate::exception_handler::{handle_error, ErrorResponse};
use crate::input::{self, InputMap};
use crate::kernel::{DispatchOutput, Kernel};
use crate::layers;
use crate::request::{RawRequest, RequestMethod};
use crate::session::{MemorySessionStore, Session, SessionStore, DEFAULT_SESSION_LIFETIME};
use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use kestrel_core::prelude::*;
use kestrel_validator::{UploadedFile, UPLOAD_ERR_INI_SIZE, UPLOAD_ERR_NO_FILE, UPLOAD_ERR_OK, UPLOAD_ERR_PARTIAL};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Web 服务器配置
#[derive(Debug, Clone)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 站点域名，未配置时从第一个请求推断
    pub domain: Option<String>,

    /// 是否启用请求日志
    pub enable_request_logging: bool,

    /// 会话 Cookie 名称
    pub session_cookie: String,

    /// 会话有效期（秒）
    pub session_lifetime: u64,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            domain: None,
            enable_request_logging: true,
            session_cookie: DEFAULT_SESSION_COOKIE_NAME.to_string(),
            session_lifetime: DEFAULT_SESSION_LIFETIME,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        Self {
            host: env.get_string_or(SERVER_HOST, "0.0.0.0"),
            port: u16::try_from(env.get_i64_or(SERVER_PORT, 8080)).unwrap_or(8080),
            domain: env.get_string(SERVER_DOMAIN).filter(|d| !d.is_empty()),
            enable_request_logging: env.get_bool_or(SERVER_ENABLE_REQUEST_LOGGING, true),
            session_cookie: env.get_string_or(SESSION_COOKIE_NAME, DEFAULT_SESSION_COOKIE_NAME),
            session_lifetime: env
                .get_i64(SESSION_LIFETIME)
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(DEFAULT_SESSION_LIFETIME),
        }
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 上传配置
#[derive(Debug, Clone)]
pub struct UploadProperties {
    /// 单个文件大小上限（KB）
    pub max_file_size: u64,

    /// 临时目录
    pub tmp_dir: PathBuf,
}

impl Default for UploadProperties {
    fn default() -> Self {
        Self {
            max_file_size: 20480,
            tmp_dir: std::env::temp_dir(),
        }
    }
}

/// 请求体中上传文件之外的表单字段余量
const FORM_ALLOWANCE: usize = 1024 * 1024;

impl UploadProperties {
    /// 读取请求体的字节上限
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.max_file_size.saturating_mul(1024))
            .unwrap_or(usize::MAX)
            .saturating_add(FORM_ALLOWANCE)
    }

    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            max_file_size: env
                .get_i64(UPLOAD_MAX_FILE_SIZE)
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(defaults.max_file_size),
            tmp_dir: env
                .get_string(UPLOAD_TMP_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.tmp_dir),
        }
    }
}

#[derive(Clone)]
struct AppState {
    kernel: Arc<Kernel>,
    sessions: Arc<dyn SessionStore>,
    upload: Arc<UploadProperties>,
    cookie_name: Arc<str>,
}

/// Kestrel Web 服务器
pub struct KestrelWebServer {
    /// 服务器配置
    config: ServerProperties,

    upload: UploadProperties,

    kernel: Arc<Kernel>,

    sessions: Arc<dyn SessionStore>,
}

impl KestrelWebServer {
    /// 创建新的 Web 服务器，配置了域名时写入内核
    pub fn new(kernel: Kernel, config: ServerProperties) -> Self {
        let kernel = match &config.domain {
            Some(domain) => kernel.with_domain(domain.clone()),
            None => {
                tracing::warn!(
                    "server.domain is not configured, redirects will use the Host header of the first request"
                );
                kernel
            }
        };
        let sessions = MemorySessionStore::with_lifetime(Duration::from_secs(config.session_lifetime));

        Self {
            config,
            upload: UploadProperties::default(),
            kernel: Arc::new(kernel),
            sessions: Arc::new(sessions),
        }
    }

    pub fn with_session_store(mut self, store: impl SessionStore + 'static) -> Self {
        self.sessions = Arc::new(store);
        self
    }

    pub fn with_upload(mut self, upload: UploadProperties) -> Self {
        self.upload = upload;
        self
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// 生成 axum 路由
    pub fn router(&self) -> Router {
        let state = AppState {
            kernel: Arc::clone(&self.kernel),
            sessions: Arc::clone(&self.sessions),
            upload: Arc::new(self.upload.clone()),
            cookie_name: Arc::from(self.config.session_cookie.as_str()),
        };

        let mut router: Router<AppState> = Router::new();
        for (route_key, entry) in self.kernel.routes().routes().iter().enumerate() {
            let path = axum_path(entry.path());
            tracing::debug!(route = %entry.path(), path = %path, methods = ?entry.methods(), "Mapped route");

            router = router.route(
                &path,
                any(
                    move |State(state): State<AppState>,
                          params: Option<Path<HashMap<String, String>>>,
                          request: Request| async move {
                        let params = params.map(|Path(params)| params).unwrap_or_default();
                        dispatch(state, route_key, params, request).await
                    },
                ),
            );
        }

        let mut router = router.fallback(fallback).with_state(state);

        if self.config.enable_request_logging {
            router = router
                .layer(axum::middleware::from_fn(layers::request_logging))
                .layer(TraceLayer::new_for_http());
        }

        // 最外层，日志层才能拿到请求 ID
        router.layer(axum::middleware::from_fn(layers::request_id))
    }

    /// 启动服务器
    pub async fn run(self) -> ApplicationResult<()> {
        let addr = self.config.address();
        let app = self.router().into_make_service();

        tracing::info!(routes = self.kernel.routes().routes().len(), "Starting Kestrel web server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApplicationError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        tracing::info!("Server listening on http://{}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| ApplicationError::Server(e.to_string()))?;

        Ok(())
    }
}

/// `user/{id}` → `/user/:id`
fn axum_path(path: &str) -> String {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    let placeholder = PLACEHOLDER.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").ok());

    let path = match placeholder {
        Some(re) => re.replace_all(path, ":$1").into_owned(),
        None => path.to_string(),
    };
    format!("/{}", path.trim_start_matches('/'))
}

async fn fallback(request: Request) -> Response {
    let failure: DispatchError = HttpFailure::not_found("Route not found.").into();
    handle_error(&failure, request.uri().path()).into_response()
}

async fn dispatch(
    state: AppState,
    route_key: usize,
    params: HashMap<String, String>,
    request: Request,
) -> Response {
    let path = request.uri().path().to_string();
    let session_id = session_id(request.headers(), &state.cookie_name);

    let path_params: InputMap = params
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    let (raw, spooled) = match read_raw(request, &state.upload).await {
        Ok(parsed) => parsed,
        Err(failure) => return handle_error(&failure.into(), &path).into_response(),
    };

    // 只接受存储中存在的会话 ID，未知 ID 换成新会话
    let session = match session_id.and_then(|id| state.sessions.load(&id).map(|data| (id, data))) {
        Some((id, data)) => Session::with_data(id, data),
        None => Session::generate(),
    };

    let kernel = Arc::clone(&state.kernel);
    let joined = tokio::task::spawn_blocking(move || {
        kernel.dispatch(route_key, path_params, raw, session)
    })
    .await;

    for file in spooled {
        if let Err(e) = tokio::fs::remove_file(&file).await {
            tracing::debug!(file = %file.display(), error = %e, "Uploaded file already removed");
        }
    }

    let DispatchOutput {
        response,
        session,
        error,
    } = match joined {
        Ok(output) => output,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Dispatch task failed");
            return ErrorResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
                "Dispatch task failed".to_string(),
                path,
            )
            .into_response();
        }
    };

    let id = session.id().to_string();
    let data = session.into_data();
    let persisted = !data.is_empty();
    state.sessions.save(&id, data);

    let mut response = match error {
        Some(err) => handle_error(&err, &path).into_response(),
        None => response.into_response(),
    };

    // 空会话不下发 Cookie
    if persisted {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", state.cookie_name, id);
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(_) => tracing::warn!(session = %id, "Session id is not a valid cookie value"),
        }
    }

    response
}

fn session_id(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// 把 HTTP 请求解析成原始请求，返回值中带上需要在请求结束后删除的临时文件
async fn read_raw(
    request: Request,
    upload: &UploadProperties,
) -> Result<(RawRequest, Vec<PathBuf>), HttpFailure> {
    let (parts, body) = request.into_parts();

    let method = RequestMethod::try_from(&parts.method).map_err(HttpFailure::not_found)?;
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let secure = parts.uri.scheme_str() == Some("https")
        || parts
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            == Some("https");

    let mut raw = RawRequest::new(method)
        .query_string(parts.uri.query().unwrap_or_default())
        .content_type(&content_type)
        .secure(secure)
        .headers(parts.headers.clone());
    if let Some(host) = parts.headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
        raw = raw.host(host);
    }

    if method == RequestMethod::Get {
        return Ok((raw, Vec::new()));
    }

    let limit = upload.body_limit();
    let bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
        tracing::debug!(limit, error = %e, "Request body rejected");
        HttpFailure::bad_request("Request body is too large or unreadable.")
    })?;

    if content_type.starts_with("application/json") {
        Ok((raw.json_body(&bytes), Vec::new()))
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        Ok((raw.urlencoded_body(&String::from_utf8_lossy(&bytes)), Vec::new()))
    } else if content_type.starts_with("multipart/form-data") {
        read_multipart(raw, &content_type, bytes, upload).await
    } else {
        Ok((raw, Vec::new()))
    }
}

async fn read_multipart(
    mut raw: RawRequest,
    content_type: &str,
    bytes: Bytes,
    upload: &UploadProperties,
) -> Result<(RawRequest, Vec<PathBuf>), HttpFailure> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| HttpFailure::bad_request(format!("Failed to parse boundary: {}", e)))?;
    let mut multipart = multer::Multipart::new(
        futures_util::stream::once(async move { Ok::<Bytes, std::io::Error>(bytes) }),
        boundary,
    );

    let mut fields = InputMap::new();
    let mut spooled = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match field.file_name().map(str::to_string) {
            None => {
                let text = field.text().await.map_err(form_error)?;
                input::insert_bracketed(&mut fields, &name, Value::String(text));
            }
            Some(file_name) => {
                let mime = field
                    .content_type()
                    .map(|m| m.to_string())
                    .unwrap_or_default();
                let data = field.bytes().await.map_err(form_error)?;
                let file = spool(file_name, mime, data, upload).await;
                if !file.tmp_name.is_empty() {
                    spooled.push(PathBuf::from(&file.tmp_name));
                }
                raw = raw.file(&name, &file);
            }
        }
    }

    Ok((raw.form_body(fields), spooled))
}

fn form_error(e: multer::Error) -> HttpFailure {
    HttpFailure::bad_request(format!("Invalid form data: {}", e))
}

/// 把上传内容写入临时目录
async fn spool(name: String, mime: String, data: Bytes, upload: &UploadProperties) -> UploadedFile {
    let size = data.len() as u64;
    let mut file = UploadedFile {
        name,
        mime,
        size,
        tmp_name: String::new(),
        error: UPLOAD_ERR_OK,
    };

    if file.name.is_empty() && data.is_empty() {
        file.error = UPLOAD_ERR_NO_FILE;
        return file;
    }

    if size > upload.max_file_size.saturating_mul(1024) {
        tracing::debug!(name = %file.name, size, "Uploaded file exceeds the size limit");
        file.error = UPLOAD_ERR_INI_SIZE;
        return file;
    }

    let path = upload
        .tmp_dir
        .join(format!("kestrel-{}", uuid::Uuid::new_v4().simple()));
    match tokio::fs::write(&path, &data).await {
        Ok(()) => file.tmp_name = path.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to spool uploaded file");
            file.error = UPLOAD_ERR_PARTIAL;
        }
    }

    file
}
