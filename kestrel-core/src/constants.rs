//! 核心配置键常量
//!
//! 所有 `Environment` 查找都通过这里的常量，避免在各 crate 中硬编码键名

/// 环境变量配置源前缀，例如 `KESTREL_SERVER_PORT`
pub const ENV_PREFIX: &str = "KESTREL_";

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "kestrel.toml";

// ==================== Logging 配置 ====================

/// 日志级别（trace / debug / info / warn / error）
pub const LOGGING_LEVEL: &str = "logging.level";

/// 日志格式（compact / full / json / pretty）
pub const LOGGING_FORMAT: &str = "logging.format";

/// 自定义过滤器，例如 "kestrel_web=debug"
pub const LOGGING_FILTER: &str = "logging.filter";
