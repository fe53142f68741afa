// kestrel-core: Kestrel 的基础设施
//
// - 分层配置（TOML / 环境变量 / 内存）
// - 日志初始化
// - 按类型标识解析的组件注册表（单例 / 原型）

pub mod config;
pub mod constants;
pub mod container;
pub mod error;
pub mod logging;
pub mod scope;

pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use constants::*;
pub use container::{ComponentInstance, ComponentRegistry};
pub use error::{
    ApplicationError, ApplicationResult, ContainerError, ContainerResult, Result,
};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use scope::Scope;

/// Prelude 模块，包含常用的类型
pub mod prelude {
    pub use crate::config::{ConfigValue, Environment, MapPropertySource, PropertySource};
    pub use crate::container::ComponentRegistry;
    pub use crate::error::{ApplicationError, ApplicationResult, ContainerError, ContainerResult};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::scope::Scope;
    pub use anyhow::{anyhow, Context};
}
