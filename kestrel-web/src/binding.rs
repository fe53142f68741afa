//! 参数绑定
//!
//! 处理器显式声明参数列表：
//!
//! - [`Param::named`] 按名称从输入数据中取值（不存在时为 null），同时记录到“内置类型映射”
//! - [`Param::component`] 按类型标识从 [`ComponentRegistry`] 解析，解析失败是配置错误

use crate::error::{ConfigurationError, DispatchError, DispatchResult};
use crate::exchange::Exchange;
use crate::input::InputMap;
use crate::reply::Reply;
use kestrel_core::{ComponentInstance, ComponentRegistry};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

static NULL: Value = Value::Null;

/// 参数声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Named(String),
    Component {
        type_id: TypeId,
        type_name: &'static str,
    },
}

impl Param {
    pub fn named(name: impl Into<String>) -> Self {
        Param::Named(name.into())
    }

    pub fn component<T: Any + Send + Sync>() -> Self {
        Param::Component {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

/// 绑定好的参数
#[derive(Default)]
pub struct Arguments {
    values: Vec<(String, Value)>,
    components: Vec<ComponentInstance>,
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("values", &self.values)
            .field("components", &self.components.len())
            .finish()
    }
}

impl Arguments {
    /// 具名参数的值，未声明时为 null
    pub fn value(&self, name: &str) -> &Value {
        self.get(name).unwrap_or(&NULL)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.value(name).as_str()
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.value(name).as_i64()
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.value(name).as_bool()
    }

    /// 按类型取组件
    pub fn component<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.components
            .iter()
            .find_map(|instance| Arc::clone(instance).downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 按声明顺序绑定参数，返回参数列表和内置类型映射
pub fn bind(
    params: &[Param],
    input: &InputMap,
    components: &ComponentRegistry,
) -> Result<(Arguments, InputMap), ConfigurationError> {
    let mut arguments = Arguments::default();
    let mut builtin = InputMap::new();

    for param in params {
        match param {
            Param::Named(name) => {
                let value = input.get(name).cloned().unwrap_or(Value::Null);
                builtin.insert(name.clone(), value.clone());
                arguments.values.push((name.clone(), value));
            }
            Param::Component { type_id, type_name } => {
                let instance = components.resolve(*type_id, type_name).map_err(|source| {
                    ConfigurationError::ComponentUnavailable {
                        type_name: type_name.to_string(),
                        source,
                    }
                })?;
                arguments.components.push(instance);
            }
        }
    }

    Ok((arguments, builtin))
}

type HandlerFn = dyn Fn(&Arguments, &mut Exchange) -> DispatchResult<Reply> + Send + Sync;

/// 带参数声明的处理函数，用于内联回调和控制器方法
#[derive(Clone)]
pub struct Handler {
    params: Vec<Param>,
    func: Arc<HandlerFn>,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("params", &self.params)
            .finish()
    }
}

impl Handler {
    pub fn new<P, F>(params: P, func: F) -> Self
    where
        P: IntoIterator<Item = Param>,
        F: Fn(&Arguments, &mut Exchange) -> DispatchResult<Reply> + Send + Sync + 'static,
    {
        Self {
            params: params.into_iter().collect(),
            func: Arc::new(func),
        }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn call(&self, args: &Arguments, exchange: &mut Exchange) -> Result<Reply, DispatchError> {
        (self.func)(args, exchange)
    }
}
