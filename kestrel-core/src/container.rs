//! 组件注册表
//!
//! 按类型标识注册零参数工厂，解析时根据 [`Scope`] 返回缓存实例或新实例。
//! 路由回调和中间件声明的“组件参数”都通过这里解析。

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ContainerError, ContainerResult};
use crate::Scope;

/// 类型擦除后的组件实例
pub type ComponentInstance = Arc<dyn Any + Send + Sync>;

type ComponentFactory = Box<dyn Fn() -> ContainerResult<ComponentInstance> + Send + Sync>;

struct ComponentDefinition {
    type_name: &'static str,
    scope: Scope,
    factory: ComponentFactory,
}

/// 组件注册表
#[derive(Default)]
pub struct ComponentRegistry {
    definitions: RwLock<HashMap<TypeId, ComponentDefinition>>,
    singletons: RwLock<HashMap<TypeId, ComponentInstance>>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let definitions = self.definitions.read();
        f.debug_struct("ComponentRegistry")
            .field(
                "components",
                &definitions.values().map(|d| d.type_name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册组件工厂，重复注册同一类型会覆盖旧定义
    pub fn register<T, F>(&self, scope: Scope, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> ContainerResult<T> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<T>();
        let definition = ComponentDefinition {
            type_name,
            scope,
            factory: Box::new(move || factory().map(|c| Arc::new(c) as ComponentInstance)),
        };

        let type_id = TypeId::of::<T>();
        self.definitions.write().insert(type_id, definition);
        self.singletons.write().remove(&type_id);
        tracing::debug!(component = type_name, scope = ?scope, "Registered component");
    }

    /// 以 `Default` 作为零参数构造函数注册
    pub fn register_default<T>(&self, scope: Scope)
    where
        T: Any + Send + Sync + Default,
    {
        self.register::<T, _>(scope, || Ok(T::default()));
    }

    /// 注册一个已经构造好的单例
    pub fn register_instance<T>(&self, instance: T)
    where
        T: Any + Send + Sync,
    {
        let type_id = TypeId::of::<T>();
        let instance: ComponentInstance = Arc::new(instance);
        let cached = Arc::clone(&instance);
        self.definitions.write().insert(
            type_id,
            ComponentDefinition {
                type_name: std::any::type_name::<T>(),
                scope: Scope::Singleton,
                factory: Box::new(move || Ok(Arc::clone(&cached))),
            },
        );
        self.singletons.write().insert(type_id, instance);
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.definitions.read().contains_key(&type_id)
    }

    /// 按类型标识解析组件
    ///
    /// `type_name` 仅用于错误信息。
    pub fn resolve(&self, type_id: TypeId, type_name: &str) -> ContainerResult<ComponentInstance> {
        if let Some(instance) = self.singletons.read().get(&type_id) {
            return Ok(Arc::clone(instance));
        }

        let definitions = self.definitions.read();
        let definition = definitions
            .get(&type_id)
            .ok_or_else(|| ContainerError::ComponentNotFound {
                type_name: type_name.to_string(),
            })?;

        let instance = (definition.factory)()?;

        if definition.scope == Scope::Singleton {
            // 并发解析时以先写入的实例为准
            let mut singletons = self.singletons.write();
            let cached = singletons
                .entry(type_id)
                .or_insert_with(|| Arc::clone(&instance));
            return Ok(Arc::clone(cached));
        }

        Ok(instance)
    }

    /// 类型化解析
    pub fn get<T>(&self) -> ContainerResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let type_name = std::any::type_name::<T>();
        self.resolve(TypeId::of::<T>(), type_name)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                expected: type_name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Clock {
        offset: i64,
    }

    struct Counter(usize);

    #[test]
    fn test_singleton_is_cached() {
        let registry = ComponentRegistry::new();
        let created = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&created);
        registry.register::<Counter, _>(Scope::Singleton, move || {
            Ok(Counter(seen.fetch_add(1, Ordering::SeqCst)))
        });

        let a = registry.get::<Counter>().unwrap();
        let b = registry.get::<Counter>().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prototype_creates_fresh_instances() {
        let registry = ComponentRegistry::new();
        let created = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&created);
        registry.register::<Counter, _>(Scope::Prototype, move || {
            Ok(Counter(seen.fetch_add(1, Ordering::SeqCst)))
        });

        let a = registry.get::<Counter>().unwrap();
        let b = registry.get::<Counter>().unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!((a.0, b.0), (0, 1));
    }

    #[test]
    fn test_register_default_and_instance() {
        let registry = ComponentRegistry::new();
        registry.register_default::<Clock>(Scope::Prototype);
        assert_eq!(registry.get::<Clock>().unwrap().offset, 0);

        registry.register_instance(Clock { offset: 9 });
        assert_eq!(registry.get::<Clock>().unwrap().offset, 9);
    }

    #[test]
    fn test_missing_component() {
        let registry = ComponentRegistry::new();
        let err = match registry.get::<Clock>() {
            Err(err) => err,
            Ok(_) => panic!("Clock should not be registered"),
        };
        assert!(matches!(err, ContainerError::ComponentNotFound { .. }));
        assert!(err.to_string().contains("Clock"));
    }
}
