use thiserror::Error;

// ==================== 错误码 ====================

/// 输入必须是字符串
pub const STR_NOT_STRING: i32 = 1001;
/// 字符串与正则不匹配
pub const STR_PATTERN_MISMATCH: i32 = 1002;
/// 空字符串或仅包含空白
pub const STR_EMPTY: i32 = 1003;
/// 超出最大长度
pub const STR_TOO_LONG: i32 = 1004;

/// 输入必须是整数或纯数字字符串
pub const NUM_NOT_NUMERIC: i32 = 2001;
/// 与期望值不一致
pub const NUM_NOT_EXACT: i32 = 2002;
/// 小于最小值
pub const NUM_TOO_SMALL: i32 = 2003;
/// 大于最大值
pub const NUM_TOO_LARGE: i32 = 2004;

/// 文件过大
pub const FILE_TOO_LARGE: i32 = 3001;
/// 扩展名不允许
pub const FILE_EXTENSION_NOT_ALLOWED: i32 = 3002;
/// 文件内容类型不匹配
pub const FILE_TYPE_MISMATCH: i32 = 3003;
/// 没有上传文件
pub const FILE_MISSING: i32 = 3004;

/// 单个字段的验证失败
///
/// 这是可恢复的错误通道：管道会收集它们并继续验证其余字段。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct ValidationError {
    pub code: i32,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;
