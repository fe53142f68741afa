use crate::error::*;
use crate::upload::{extensions_for, UploadedFile, UPLOAD_ERR_FORM_SIZE, UPLOAD_ERR_INI_SIZE};
use regex::Regex;
use serde_json::Value;

/// 默认的上传文件大小上限（KB）
pub const DEFAULT_MAX_FILE_SIZE: u64 = 20_480;

/// 零宽字符：U+200B..U+200D 与 U+FEFF
fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}')
}

/// 去除零宽字符
pub fn remove_zero_width(s: &str) -> String {
    s.chars().filter(|c| !is_zero_width(*c)).collect()
}

/// 字符串规则
#[derive(Debug, Clone, Default)]
pub struct StrRule {
    max_len: Option<usize>,
    pattern: Option<Regex>,
    empty_able: bool,
}

impl StrRule {
    /// 默认不允许空字符串
    pub fn new() -> Self {
        Self::default()
    }

    /// 最大字符数（按 Unicode 标量计数）
    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.pattern = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// 只允许列表中的值，生成 `^(?:a|b|c)$`
    pub fn one_of<S: AsRef<str>>(mut self, choices: &[S]) -> Result<Self, regex::Error> {
        let alternatives = choices
            .iter()
            .map(|c| regex::escape(c.as_ref()))
            .collect::<Vec<_>>()
            .join("|");
        self.pattern = Some(Regex::new(&format!("^(?:{})$", alternatives))?);
        Ok(self)
    }

    pub fn empty_able(mut self, empty_able: bool) -> Self {
        self.empty_able = empty_able;
        self
    }
}

/// 数值规则
#[derive(Debug, Clone, Copy, Default)]
pub struct NumRule {
    max: Option<i64>,
    min: Option<i64>,
    exact: Option<i64>,
}

impl NumRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn exact(mut self, exact: i64) -> Self {
        self.exact = Some(exact);
        self
    }
}

/// 文件规则
#[derive(Debug, Clone)]
pub struct FileRule {
    allowed_mime_types: Vec<String>,
    /// 单位 KB，未设置时使用配置的上传上限或 [`DEFAULT_MAX_FILE_SIZE`]
    max_file_size: Option<u64>,
    empty_able: bool,
}

impl FileRule {
    /// 默认允许不上传
    pub fn new<S: Into<String>>(allowed_mime_types: impl IntoIterator<Item = S>) -> Self {
        Self {
            allowed_mime_types: allowed_mime_types.into_iter().map(Into::into).collect(),
            max_file_size: None,
            empty_able: true,
        }
    }

    pub fn max_file_size(mut self, kb: u64) -> Self {
        self.max_file_size = Some(kb);
        self
    }

    /// 没有显式设置上限时采用 `kb`
    pub fn with_default_max(mut self, kb: u64) -> Self {
        self.max_file_size.get_or_insert(kb);
        self
    }

    /// 生效的上限（KB）
    pub fn max_size(&self) -> u64 {
        self.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE)
    }

    pub fn empty_able(mut self, empty_able: bool) -> Self {
        self.empty_able = empty_able;
        self
    }

    pub fn allowed_mime_types(&self) -> &[String] {
        &self.allowed_mime_types
    }
}

/// 验证规则
///
/// 每个函数只看一个原始值，成功时返回规范化后的值。
pub struct ValidationRules;

impl ValidationRules {
    /// 验证字符串，返回去除零宽字符后的字符串
    pub fn str(input: &Value, rule: &StrRule) -> ValidationResult<Value> {
        let Value::String(raw) = input else {
            return Err(ValidationError::new(
                STR_NOT_STRING,
                "The input must be a string.",
            ));
        };

        let s = remove_zero_width(raw);

        if s.trim().is_empty() {
            if rule.empty_able && s.is_empty() {
                return Ok(Value::String(s));
            }
            if !rule.empty_able {
                return Err(ValidationError::new(
                    STR_EMPTY,
                    "The input string contains only whitespace characters or an empty string.",
                ));
            }
        }

        if let Some(max_len) = rule.max_len {
            if s.chars().count() > max_len {
                return Err(ValidationError::new(
                    STR_TOO_LONG,
                    format!(
                        "The input string exceeds the maximum length limit of {} characters.",
                        max_len
                    ),
                ));
            }
        }

        if let Some(pattern) = &rule.pattern {
            if !pattern.is_match(&s) {
                return Err(ValidationError::new(
                    STR_PATTERN_MISMATCH,
                    "The input string does not match the specified regex pattern.",
                ));
            }
        }

        Ok(Value::String(s))
    }

    /// 验证整数或纯数字字符串，返回整数
    pub fn num(input: &Value, rule: &NumRule) -> ValidationResult<Value> {
        let not_numeric = || {
            ValidationError::new(
                NUM_NOT_NUMERIC,
                "The input must be an integer or a string containing only digits.",
            )
        };

        let n = match input {
            Value::Number(n) => n.as_i64().ok_or_else(not_numeric)?,
            Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                s.parse::<i64>().map_err(|_| not_numeric())?
            }
            _ => return Err(not_numeric()),
        };

        if let Some(exact) = rule.exact {
            if n != exact {
                return Err(ValidationError::new(
                    NUM_NOT_EXACT,
                    "The input does not match the expected value.",
                ));
            }
        }

        if let Some(min) = rule.min {
            if n < min {
                return Err(ValidationError::new(
                    NUM_TOO_SMALL,
                    format!("The input must be greater than or equal to {}.", min),
                ));
            }
        }

        if let Some(max) = rule.max {
            if n > max {
                return Err(ValidationError::new(
                    NUM_TOO_LARGE,
                    format!("The input must be less than or equal to {}.", max),
                ));
            }
        }

        Ok(Value::from(n))
    }

    /// 验证上传文件，返回文件描述对象；允许为空且未上传时返回 null
    pub fn file(input: &Value, rule: &FileRule) -> ValidationResult<Value> {
        let missing = || ValidationError::new(FILE_MISSING, "No file was uploaded.");

        let file = match input {
            Value::Null => None,
            other => Some(UploadedFile::from_value(other).ok_or_else(missing)?),
        };

        let file = match file {
            Some(file) if !file.is_missing() => file,
            _ if rule.empty_able => return Ok(Value::Null),
            _ => return Err(missing()),
        };

        let too_large = || ValidationError::new(FILE_TOO_LARGE, "File too large.");
        match file.error {
            0 => {}
            UPLOAD_ERR_INI_SIZE | UPLOAD_ERR_FORM_SIZE => return Err(too_large()),
            _ => return Err(missing()),
        }

        if file.size > rule.max_size().saturating_mul(1024) {
            return Err(too_large());
        }

        let extension = file.extension().unwrap_or_default();
        let extension_allowed = rule
            .allowed_mime_types
            .iter()
            .any(|mime| extensions_for(mime).contains(&extension.as_str()));
        if !extension_allowed {
            return Err(ValidationError::new(
                FILE_EXTENSION_NOT_ALLOWED,
                "File extension not allowed.",
            ));
        }

        let type_mismatch = || ValidationError::new(FILE_TYPE_MISMATCH, "File type does not match.");
        let actual = file.sniff_mime().map_err(|e| {
            tracing::debug!(tmp_name = %file.tmp_name, error = %e, "Failed to read uploaded file");
            type_mismatch()
        })?;

        let matches_extension = extensions_for(actual).contains(&extension.as_str());
        if !rule.allowed_mime_types.iter().any(|m| m == actual) || !matches_extension {
            return Err(type_mismatch());
        }

        Ok(file.to_value())
    }
}
