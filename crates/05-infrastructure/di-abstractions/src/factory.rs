//! bean 工厂抽象接口
//!
//! 提供 bean 实例创建与销毁的工厂模式支持

use crate::destructor::{DestructorRegistry, DestructorTree};
use crate::registry::{Bean, Id, Instance};
use crate::scope::{scopelet_instance, scopelet_type_for, Scopelet};
use crate::selector::{Qualifier, Selector};
use infrastructure_common::ReferenceResult;
use std::fmt;
use std::sync::Arc;

/// 创建上下文
///
/// 工厂在创建实例时看到的上下文：既是销毁器注册表，也能继续解析依赖的引用。
pub trait Creation: DestructorRegistry {
    /// 正在创建的 bean，根上下文为 `None`
    fn bean(&self) -> Option<&Bean>;

    /// 解析满足选择器的引用
    fn reference(&self, selector: &Selector) -> ReferenceResult<Instance>;

    /// 以指定 bean 解析引用，bean 必须满足选择器
    fn reference_bean(&self, selector: &Selector, bean: &Bean) -> ReferenceResult<Instance>;

    /// 销毁由本上下文产生的引用，返回是否执行了销毁
    fn destroy(&self, instance: &Instance) -> ReferenceResult<bool>;

    /// 获取可长期持有的上下文句柄
    fn shared(&self) -> Arc<dyn Creation>;

    /// 派生一个解析能力相同、但把依赖的销毁动作登记到 `tree` 的上下文
    ///
    /// 作用域解析器保存的实例比创建它的请求活得更久，它的依赖必须归属于解析器自己的节点。
    fn owned_by(&self, tree: Arc<dyn DestructorTree>) -> Arc<dyn Creation>;
}

/// bean 工厂 trait
pub trait Factory: Send + Sync {
    /// 预先存在的单例，存在时直接返回而不经过作用域链
    fn singleton(&self) -> Option<Instance> {
        None
    }

    /// 创建实例
    fn create(&self, creation: &dyn Creation) -> ReferenceResult<Instance>;

    /// 销毁实例
    fn destroy(&self, instance: &Instance, creation: &dyn Creation) -> ReferenceResult<()> {
        let _ = (instance, creation);
        Ok(())
    }

    /// 工厂本身是作用域解析器时返回该解析器
    fn scopelet(&self) -> Option<Arc<dyn Scopelet>> {
        None
    }
}

type DestroyFn = Box<dyn Fn(&Instance) -> ReferenceResult<()> + Send + Sync>;

/// Lambda 工厂包装器
pub struct LambdaFactory<F> {
    create_fn: F,
    destroy_fn: Option<DestroyFn>,
}

impl<F> LambdaFactory<F>
where
    F: Fn(&dyn Creation) -> ReferenceResult<Instance> + Send + Sync,
{
    pub fn new(create_fn: F) -> Self {
        Self {
            create_fn,
            destroy_fn: None,
        }
    }

    /// 设置销毁回调
    pub fn with_destroy<D>(mut self, destroy_fn: D) -> Self
    where
        D: Fn(&Instance) -> ReferenceResult<()> + Send + Sync + 'static,
    {
        self.destroy_fn = Some(Box::new(destroy_fn));
        self
    }
}

impl<F> Factory for LambdaFactory<F>
where
    F: Fn(&dyn Creation) -> ReferenceResult<Instance> + Send + Sync,
{
    fn create(&self, creation: &dyn Creation) -> ReferenceResult<Instance> {
        (self.create_fn)(creation)
    }

    fn destroy(&self, instance: &Instance, _creation: &dyn Creation) -> ReferenceResult<()> {
        match &self.destroy_fn {
            Some(destroy_fn) => destroy_fn(instance),
            None => Ok(()),
        }
    }
}

impl<F> fmt::Debug for LambdaFactory<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LambdaFactory")
            .field("has_destroy", &self.destroy_fn.is_some())
            .finish()
    }
}

/// 单例工厂
///
/// 包装一个预先构造好的实例。
#[derive(Clone)]
pub struct SingletonFactory {
    instance: Instance,
}

impl SingletonFactory {
    pub fn new(instance: Instance) -> Self {
        Self { instance }
    }
}

impl Factory for SingletonFactory {
    fn singleton(&self) -> Option<Instance> {
        Some(self.instance.clone())
    }

    fn create(&self, _creation: &dyn Creation) -> ReferenceResult<Instance> {
        Ok(self.instance.clone())
    }
}

/// 作用域解析器工厂
///
/// 使作用域解析器本身成为一个 bean。创建时交出解析器，销毁时关闭解析器。
#[derive(Clone)]
pub struct ScopeletFactory {
    scopelet: Arc<dyn Scopelet>,
}

impl ScopeletFactory {
    pub fn new(scopelet: Arc<dyn Scopelet>) -> Self {
        Self { scopelet }
    }

    /// 作用域解析器 bean
    ///
    /// 类型为以作用域标识参数化的解析器类型，限定符为所管理的作用域。
    pub fn bean(scopelet: Arc<dyn Scopelet>) -> Bean {
        let scope_id = scopelet.scope_id().clone();
        let id = Id::new(
            [scopelet_type_for(&scope_id)],
            [Qualifier::Scope(scope_id)],
            scopelet.governing_scope_id().clone(),
        );
        Bean::with_factory(id, Self::new(scopelet))
    }
}

impl Factory for ScopeletFactory {
    fn create(&self, _creation: &dyn Creation) -> ReferenceResult<Instance> {
        Ok(scopelet_instance(self.scopelet.clone()))
    }

    fn destroy(&self, _instance: &Instance, _creation: &dyn Creation) -> ReferenceResult<()> {
        self.scopelet.close()
    }

    fn scopelet(&self) -> Option<Arc<dyn Scopelet>> {
        Some(self.scopelet.clone())
    }
}
