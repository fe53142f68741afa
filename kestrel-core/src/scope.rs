/// 组件的生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// 单例模式 - 首次解析时创建并缓存
    #[default]
    Singleton,

    /// 原型模式 - 每次解析都创建新实例
    Prototype,
}
