//! 作用域抽象
//!
//! 作用域是静态配置；作用域解析器（scopelet）是某个作用域在运行时的实例管理者。

use crate::factory::{Creation, Factory};
use crate::registry::{Id, Instance};
use crate::selector::{Qualifier, Selector};
use infrastructure_common::{ReferenceResult, TypeInfo};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 作用域标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(Cow<'static, str>);

impl ScopeId {
    /// 单例作用域，自我管理的根作用域
    pub const SINGLETON: ScopeId = ScopeId::new("singleton");
    /// 依赖作用域（none），由单例作用域管理
    pub const NONE: ScopeId = ScopeId::new("none");

    /// 从静态名称创建
    pub const fn new(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// 从运行时名称创建
    pub fn named(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// 名称
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 作用域
///
/// `normal` 为 true 表示实例生命周期较长且可以安全地通过客户端代理访问。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    id: ScopeId,
    normal: bool,
}

impl Scope {
    /// 内置单例作用域（伪作用域）
    pub const SINGLETON: Scope = Scope::new(ScopeId::SINGLETON, false);
    /// 内置依赖作用域（伪作用域）
    pub const NONE: Scope = Scope::new(ScopeId::NONE, false);

    /// 创建作用域
    pub const fn new(id: ScopeId, normal: bool) -> Self {
        Self { id, normal }
    }

    /// 作用域标识
    pub fn id(&self) -> &ScopeId {
        &self.id
    }

    /// 是否为常规作用域
    pub fn is_normal(&self) -> bool {
        self.normal
    }
}

/// 作用域表
#[derive(Debug, Clone, Default)]
pub struct Scopes {
    scopes: HashMap<ScopeId, Scope>,
}

impl Scopes {
    /// 仅包含内置作用域的表
    pub fn builtin() -> Self {
        Self::default().with(Scope::SINGLETON).with(Scope::NONE)
    }

    /// 追加作用域
    pub fn with(mut self, scope: Scope) -> Self {
        self.register(scope);
        self
    }

    /// 注册作用域，同名作用域会被替换
    pub fn register(&mut self, scope: Scope) {
        self.scopes.insert(scope.id().clone(), scope);
    }

    /// 查找作用域
    pub fn get(&self, id: &ScopeId) -> Option<&Scope> {
        self.scopes.get(id)
    }

    /// 作用域是否为常规作用域，未知作用域视为伪作用域
    pub fn is_normal(&self, id: &ScopeId) -> bool {
        self.get(id).is_some_and(Scope::is_normal)
    }

    /// 作用域数量
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// 作用域解析器
///
/// 管理一个作用域内 bean 标识到实例的映射。同一作用域标识在任一时刻最多只能有一个活动的解析器。
pub trait Scopelet: Send + Sync {
    /// 所属作用域
    fn scope(&self) -> &Scope;

    /// 所属作用域标识
    fn scope_id(&self) -> &ScopeId {
        self.scope().id()
    }

    /// 管理本解析器自身的作用域标识
    fn governing_scope_id(&self) -> &ScopeId;

    /// 是否为当前活动的解析器
    fn active(&self) -> bool {
        true
    }

    /// 获取或创建 `id` 对应的实例
    fn instance(
        &self,
        id: &Id,
        factory: &Arc<dyn Factory>,
        creation: &dyn Creation,
    ) -> ReferenceResult<Instance>;

    /// 移除并销毁 `id` 对应的实例，返回是否有实例被移除
    fn remove(&self, id: &Id) -> ReferenceResult<bool>;

    /// 关闭解析器，销毁所有实例
    fn close(&self) -> ReferenceResult<()>;
}

/// 作用域解析器的原始类型
pub fn scopelet_type() -> TypeInfo {
    TypeInfo::of::<dyn Scopelet>()
}

/// 管理 `scope_id` 的作用域解析器的 bean 类型
pub fn scopelet_type_for(scope_id: &ScopeId) -> TypeInfo {
    scopelet_type().parameterized(scope_id.as_str())
}

/// 选择管理 `scope_id` 的作用域解析器的选择器
pub fn scopelet_selector(scope_id: &ScopeId) -> Selector {
    Selector::new(
        [scopelet_type()],
        [Qualifier::Scope(scope_id.clone())],
        true,
    )
}

/// 将作用域解析器包装为实例
pub fn scopelet_instance(scopelet: Arc<dyn Scopelet>) -> Instance {
    Arc::new(scopelet)
}

/// 从实例中取出作用域解析器
pub fn as_scopelet(instance: &Instance) -> Option<Arc<dyn Scopelet>> {
    instance.downcast_ref::<Arc<dyn Scopelet>>().cloned()
}
