//! 模板引擎支持
//!
//! 基于 Tera。传入模板的值会先递归做 HTML 转义（以 `_` 开头的键除外），
//! 因此引擎自身的自动转义是关闭的。
//!
//! ```ignore
//! let engine = TemplateEngine::new("views/**/*")?;
//! let view = View::new().make(&engine, "user/detail", &values)?;
//! ```

use crate::constants::TEMPLATE_DIR;
use crate::error::ConfigurationError;
use crate::input::InputMap;
use crate::response::escape_html;
use kestrel_core::Environment;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tera::Tera;

/// 模板配置
#[derive(Debug, Clone)]
pub struct TemplateProperties {
    /// 模板目录（默认 "views"）
    pub template_dir: String,
}

impl Default for TemplateProperties {
    fn default() -> Self {
        Self {
            template_dir: "views".to_string(),
        }
    }
}

impl TemplateProperties {
    pub fn from_environment(env: &Environment) -> Self {
        Self {
            template_dir: env.get_string_or(TEMPLATE_DIR, "views"),
        }
    }

    /// glob 模式
    pub fn pattern(&self) -> String {
        format!("{}/**/*", self.template_dir.trim_end_matches('/'))
    }
}

/// 模板错误类型
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Could not find template file: {0}")]
    NotFound(String),

    #[error("Failed to render template '{template}': {cause}")]
    RenderError { template: String, cause: String },

    #[error("Template initialization error: {0}")]
    InitError(String),
}

impl From<TemplateError> for ConfigurationError {
    fn from(error: TemplateError) -> Self {
        ConfigurationError::Template(error.to_string())
    }
}

/// 模板引擎，可作为组件注册后注入处理器
#[derive(Clone)]
pub struct TemplateEngine {
    tera: Arc<RwLock<Tera>>,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tera = self.tera.read();
        f.debug_struct("TemplateEngine")
            .field("templates", &tera.get_template_names().count())
            .finish()
    }
}

impl TemplateEngine {
    /// 按 glob 模式加载模板，例如 "views/**/*"
    pub fn new(pattern: &str) -> Result<Self, TemplateError> {
        let mut tera = Tera::new(pattern).map_err(|e| {
            TemplateError::InitError(format!(
                "Failed to initialize Tera with pattern '{}': {}",
                pattern, e
            ))
        })?;
        tera.autoescape_on(vec![]);

        tracing::info!(pattern = %pattern, "Template engine created");

        Ok(Self {
            tera: Arc::new(RwLock::new(tera)),
        })
    }

    pub fn from_environment(env: &Environment) -> Result<Self, TemplateError> {
        Self::new(&TemplateProperties::from_environment(env).pattern())
    }

    /// 从内存中的模板创建，主要用于测试
    pub fn from_raw_templates(templates: &[(&str, &str)]) -> Result<Self, TemplateError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_templates(templates.iter().copied())
            .map_err(|e| TemplateError::InitError(e.to_string()))?;

        Ok(Self {
            tera: Arc::new(RwLock::new(tera)),
        })
    }

    /// 依次尝试 `name` 和 `name.html`
    fn resolve(&self, name: &str) -> Option<String> {
        let name = name.trim_start_matches('/');
        let tera = self.tera.read();
        let html = format!("{}.html", name);

        let mut found = None;
        for candidate in tera.get_template_names() {
            if candidate == name {
                return Some(name.to_string());
            }
            if candidate == html {
                found = Some(html.clone());
            }
        }
        found
    }

    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// 渲染模板，值先经过 [`sanitize`]
    pub fn render(&self, name: &str, values: &InputMap) -> Result<String, TemplateError> {
        let template = self
            .resolve(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;

        let context = tera::Context::from_value(Value::Object(sanitize(values))).map_err(|e| {
            TemplateError::RenderError {
                template: template.clone(),
                cause: e.to_string(),
            }
        })?;

        self.tera
            .read()
            .render(&template, &context)
            .map_err(|e| {
                tracing::error!(error = ?e, template = %template, "Template render error");
                TemplateError::RenderError {
                    template: template.clone(),
                    cause: e.to_string(),
                }
            })
    }
}

/// 递归转义字符串值，以 `_` 开头的键原样保留
pub fn sanitize(values: &InputMap) -> InputMap {
    values
        .iter()
        .map(|(key, value)| {
            let value = if key.starts_with('_') {
                value.clone()
            } else {
                sanitize_value(value)
            };
            (key.clone(), value)
        })
        .collect()
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_html(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(sanitize(map)),
        other => other.clone(),
    }
}
