//! 框架配置常量定义
//!
//! 配置键名称，以及会话中保留的键

// ==================== Server 配置 ====================

/// 服务器监听地址
pub const SERVER_HOST: &str = "server.host";

/// 服务器监听端口
pub const SERVER_PORT: &str = "server.port";

/// 站点域名（例如 `https://example.com`），配置后不再从请求推断
pub const SERVER_DOMAIN: &str = "server.domain";

/// 是否启用请求日志
pub const SERVER_ENABLE_REQUEST_LOGGING: &str = "server.enable-request-logging";

// ==================== Session 配置 ====================

/// 会话 Cookie 名称
pub const SESSION_COOKIE_NAME: &str = "session.cookie-name";

pub const DEFAULT_SESSION_COOKIE_NAME: &str = "KESTRELSESSID";

/// 会话有效期（秒）
pub const SESSION_LIFETIME: &str = "session.lifetime";

// ==================== 上传配置 ====================

/// 单个上传文件的大小上限（KB）
pub const UPLOAD_MAX_FILE_SIZE: &str = "upload.max-file-size";

/// 上传文件的临时目录
pub const UPLOAD_TMP_DIR: &str = "upload.tmp-dir";

// ==================== 模板配置 ====================

/// 模板目录
pub const TEMPLATE_DIR: &str = "template.dir";

// ==================== 会话保留键 ====================

/// 一次性闪存数据
pub const FLASH_SESSION_KEY: &str = "_flash";

/// 闪存中的验证错误
pub const ERRORS_KEY: &str = "ERRORS";

/// 闪存中的旧输入
pub const OLD_ARRAY_KEY: &str = "OLD_ARRAY";

// ==================== CSRF ====================

/// 会话中保存令牌摘要的键
pub const CSRF_SESSION_KEY: &str = "_csrf";

/// 表单字段名
pub const CSRF_FIELD: &str = "_csrf";

/// AJAX 请求使用的头部
pub const CSRF_HEADER: &str = "x-csrf-token";

/// 会话中没有令牌
pub const CSRF_SESSION_EXPIRED: i32 = 4001;

/// 令牌不匹配
pub const CSRF_TOKEN_MISMATCH: i32 = 4002;
