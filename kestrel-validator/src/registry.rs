//! 具名验证器注册表
//!
//! 路由注册时按名称解析一次，之后持有 [`FieldValidator`] 本身，请求期间不再查表。

use crate::error::ValidationResult;
use crate::validator::{FileRule, NumRule, StrRule, ValidationRules};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type ValidateFn = dyn Fn(&Value) -> ValidationResult<Value> + Send + Sync;

/// 验证器种类，用于日志和调试输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorKind {
    Str,
    Num,
    File,
    Custom,
}

/// 单个字段的验证器：接收原始值（可能为 null），返回规范化后的值
#[derive(Clone)]
pub struct FieldValidator {
    kind: ValidatorKind,
    func: Arc<ValidateFn>,
}

impl FieldValidator {
    pub fn str(rule: StrRule) -> Self {
        Self {
            kind: ValidatorKind::Str,
            func: Arc::new(move |value| ValidationRules::str(value, &rule)),
        }
    }

    pub fn num(rule: NumRule) -> Self {
        Self {
            kind: ValidatorKind::Num,
            func: Arc::new(move |value| ValidationRules::num(value, &rule)),
        }
    }

    pub fn file(rule: FileRule) -> Self {
        Self {
            kind: ValidatorKind::File,
            func: Arc::new(move |value| ValidationRules::file(value, &rule)),
        }
    }

    /// 自定义验证函数
    pub fn custom<F>(func: F) -> Self
    where
        F: Fn(&Value) -> ValidationResult<Value> + Send + Sync + 'static,
    {
        Self {
            kind: ValidatorKind::Custom,
            func: Arc::new(func),
        }
    }

    pub fn kind(&self) -> ValidatorKind {
        self.kind
    }

    pub fn validate(&self, value: &Value) -> ValidationResult<Value> {
        (self.func)(value)
    }
}

impl fmt::Debug for FieldValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldValidator")
            .field("kind", &self.kind)
            .finish()
    }
}

/// 验证器注册表
#[derive(Debug, Default, Clone)]
pub struct ValidatorRegistry {
    validators: HashMap<String, FieldValidator>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册验证器，同名覆盖
    pub fn register(&mut self, name: impl Into<String>, validator: FieldValidator) {
        let name = name.into();
        debug!(validator = %name, kind = ?validator.kind(), "Registering validator");
        self.validators.insert(name, validator);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValidator> {
        self.validators.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }

    /// 已注册的名称（排序后）
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ValidationError, NUM_TOO_SMALL};
    use serde_json::json;

    #[test]
    fn test_builtin_constructors() {
        let v = FieldValidator::num(NumRule::new().min(1));
        assert_eq!(v.kind(), ValidatorKind::Num);
        assert_eq!(v.validate(&json!("3")).unwrap(), json!(3));
        assert_eq!(v.validate(&json!(0)).unwrap_err().code, NUM_TOO_SMALL);
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ValidatorRegistry::new();
        registry.register(
            "even",
            FieldValidator::custom(|value| match value.as_i64() {
                Some(n) if n % 2 == 0 => Ok(json!(n)),
                _ => Err(ValidationError::new(9001, "must be even")),
            }),
        );
        registry.register("name", FieldValidator::str(StrRule::new().max_len(8)));

        assert_eq!(registry.names(), vec!["even", "name"]);
        assert!(registry.contains("even"));
        assert!(registry.get("missing").is_none());

        let even = registry.get("even").unwrap();
        assert!(even.validate(&json!(4)).is_ok());
        assert_eq!(even.validate(&json!(3)).unwrap_err().code, 9001);
    }
}
