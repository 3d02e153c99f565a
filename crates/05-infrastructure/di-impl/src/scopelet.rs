//! 作用域解析器实现
//!
//! - [`SingletonScopelet`] - 自我管理的单例作用域
//! - [`NoneScopelet`] - 依赖作用域，每次创建新实例并登记到请求的销毁器树
//! - [`ContextualScopelet`] - 可激活的常规作用域

use crate::destructor_tree::DefaultDestructorTree;
use dashmap::DashMap;
use di_abstractions::{
    Creation, Destructor, DestructorRegistry, DestructorTree, Factory, Id, Instance,
    InstanceIdentity, Scope, ScopeId, Scopelet,
};
use infrastructure_common::{ReferenceError, ReferenceResult};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

/// 为工厂创建的实例构造销毁动作
fn destructor_for(
    factory: &Arc<dyn Factory>,
    instance: &Instance,
    creation: &dyn Creation,
) -> Destructor {
    let factory = Arc::clone(factory);
    let instance = Arc::clone(instance);
    let creation = creation.shared();
    Box::new(move || factory.destroy(&instance, creation.as_ref()))
}

/// 保存的实例的销毁动作：先销毁实例，再销毁它创建时解析的依赖
fn stored_destructor(
    factory: &Arc<dyn Factory>,
    instance: &Instance,
    context: Arc<dyn Creation>,
    dependents: Arc<DefaultDestructorTree>,
) -> Destructor {
    let factory = Arc::clone(factory);
    let instance = Arc::clone(instance);
    Box::new(move || {
        let errors: Vec<ReferenceError> = [
            factory.destroy(&instance, context.as_ref()).err(),
            dependents.close().err(),
        ]
        .into_iter()
        .flatten()
        .collect();
        match ReferenceError::aggregate(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    })
}

/// 标记当前线程正在创建某个标识的实例，离开作用域时清除
struct CreatingMark<'a> {
    creating: &'a DashMap<Id, ThreadId>,
    id: &'a Id,
}

impl Drop for CreatingMark<'_> {
    fn drop(&mut self) {
        self.creating.remove(self.id);
    }
}

/// 实例存储
///
/// 按 bean 标识保存实例，每个标识的实例最多创建一次；实例的销毁动作登记在存储自己的销毁器树中。
/// 实例创建时解析的依赖归属于该实例自己的节点，随实例一起销毁，而不是随请求销毁。
pub struct InstanceStore {
    instances: DashMap<Id, Arc<OnceCell<Instance>>>,
    /// 正在创建的标识及执行创建的线程
    creating: DashMap<Id, ThreadId>,
    tree: DefaultDestructorTree,
}

impl InstanceStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            creating: DashMap::new(),
            tree: DefaultDestructorTree::new(),
        }
    }

    /// 获取或创建实例
    ///
    /// 工厂在不持有任何存储锁的情况下被调用，并发的首次请求收敛到同一个实例。
    /// 同一线程在创建过程中再次请求同一标识（例如经由自身的客户端代理）时报告循环依赖。
    pub fn get_or_create(
        &self,
        id: &Id,
        factory: &Arc<dyn Factory>,
        creation: &dyn Creation,
    ) -> ReferenceResult<Instance> {
        if self.tree.is_closed() {
            return Err(ReferenceError::Closed);
        }
        let cell = self
            .instances
            .entry(id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();
        if let Some(instance) = cell.get() {
            return Ok(instance.clone());
        }
        let current = thread::current().id();
        if self.creating.get(id).is_some_and(|owner| *owner == current) {
            return Err(ReferenceError::CircularDependency {
                dependency_chain: format!("{id} -> {id}"),
            });
        }

        let instance = cell.get_or_try_init(|| {
            self.creating.insert(id.clone(), current);
            let _mark = CreatingMark {
                creating: &self.creating,
                id,
            };
            self.create(id, factory, creation)
        })?;
        Ok(instance.clone())
    }

    fn create(
        &self,
        id: &Id,
        factory: &Arc<dyn Factory>,
        creation: &dyn Creation,
    ) -> ReferenceResult<Instance> {
        let dependents = Arc::new(DefaultDestructorTree::new());
        let context = creation.owned_by(dependents.clone());
        let instance = match factory.create(context.as_ref()) {
            Ok(instance) => instance,
            Err(e) => {
                if let Err(cleanup) = dependents.close() {
                    warn!("实例创建失败后清理依赖出错: {}: {}", id, cleanup);
                }
                return Err(e);
            }
        };

        let destructor =
            stored_destructor(factory, &instance, Arc::clone(&context), Arc::clone(&dependents));
        if !self.tree.register(instance.clone(), destructor) && self.tree.is_closed() {
            // 存储在创建期间被关闭，实例不再交出
            warn!("作用域已关闭，丢弃刚创建的实例: {}", id);
            stored_destructor(factory, &instance, context, dependents)()?;
            return Err(ReferenceError::Closed);
        }
        debug!("作用域实例已创建: {}", id);
        Ok(instance)
    }

    /// 已保存的实例
    pub fn get(&self, id: &Id) -> Option<Instance> {
        self.instances
            .get(id)
            .and_then(|cell| cell.get().cloned())
    }

    /// 移除并销毁实例
    pub fn remove(&self, id: &Id) -> ReferenceResult<bool> {
        let Some((_, cell)) = self.instances.remove(id) else {
            return Ok(false);
        };
        let Some(instance) = cell.get() else {
            return Ok(false);
        };
        if let Some(destructor) = self.tree.remove(InstanceIdentity::of(instance)) {
            destructor()?;
        }
        debug!("作用域实例已移除: {}", id);
        Ok(true)
    }

    /// 关闭存储，销毁全部实例
    pub fn close(&self) -> ReferenceResult<()> {
        self.instances.clear();
        self.tree.close()
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.tree.is_closed()
    }

    /// 已保存的实例数量
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl Default for InstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 单例作用域解析器
///
/// 管理自身所在的作用域，是作用域链的终点。
pub struct SingletonScopelet {
    scope: Scope,
    store: InstanceStore,
}

impl SingletonScopelet {
    pub fn new() -> Self {
        Self {
            scope: Scope::SINGLETON,
            store: InstanceStore::new(),
        }
    }

    /// 已保存的单例数量
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// 是否没有单例
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for SingletonScopelet {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopelet for SingletonScopelet {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn governing_scope_id(&self) -> &ScopeId {
        self.scope.id()
    }

    fn instance(
        &self,
        id: &Id,
        factory: &Arc<dyn Factory>,
        creation: &dyn Creation,
    ) -> ReferenceResult<Instance> {
        self.store.get_or_create(id, factory, creation)
    }

    fn remove(&self, id: &Id) -> ReferenceResult<bool> {
        self.store.remove(id)
    }

    fn close(&self) -> ReferenceResult<()> {
        info!("关闭单例作用域，销毁 {} 个实例", self.store.len());
        self.store.close()
    }
}

/// 依赖作用域解析器
///
/// 不保存实例：每次都创建新实例，并把销毁动作登记到创建上下文中，随请求一起销毁。
pub struct NoneScopelet {
    scope: Scope,
    governing_scope_id: ScopeId,
}

impl NoneScopelet {
    pub fn new() -> Self {
        Self {
            scope: Scope::NONE,
            governing_scope_id: ScopeId::SINGLETON,
        }
    }
}

impl Default for NoneScopelet {
    fn default() -> Self {
        Self::new()
    }
}

impl Scopelet for NoneScopelet {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn governing_scope_id(&self) -> &ScopeId {
        &self.governing_scope_id
    }

    fn instance(
        &self,
        id: &Id,
        factory: &Arc<dyn Factory>,
        creation: &dyn Creation,
    ) -> ReferenceResult<Instance> {
        let instance = factory.create(creation)?;
        if !creation.register(instance.clone(), destructor_for(factory, &instance, creation)) {
            debug!("依赖实例未登记销毁动作: {}", id);
        }
        Ok(instance)
    }

    fn remove(&self, _id: &Id) -> ReferenceResult<bool> {
        Ok(false)
    }

    fn close(&self) -> ReferenceResult<()> {
        Ok(())
    }
}

/// 上下文作用域解析器
///
/// 常规作用域，可以在运行时激活和停用。停用会销毁当前保存的全部实例，
/// 同一作用域标识的多个解析器之间借此完成交接。
pub struct ContextualScopelet {
    scope: Scope,
    governing_scope_id: ScopeId,
    active: AtomicBool,
    store: RwLock<Arc<InstanceStore>>,
}

impl ContextualScopelet {
    /// 创建由单例作用域管理的常规作用域解析器，初始为活动状态
    pub fn new(scope_id: ScopeId) -> Self {
        Self::with_scope(Scope::new(scope_id, true), ScopeId::SINGLETON)
    }

    /// 以指定作用域和管理作用域创建
    pub fn with_scope(scope: Scope, governing_scope_id: ScopeId) -> Self {
        Self {
            scope,
            governing_scope_id,
            active: AtomicBool::new(true),
            store: RwLock::new(Arc::new(InstanceStore::new())),
        }
    }

    /// 设置初始活动状态
    pub fn with_active(self, active: bool) -> Self {
        self.active.store(active, Ordering::SeqCst);
        self
    }

    /// 激活
    pub fn activate(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            info!("作用域已激活: {}", self.scope.id());
        }
    }

    /// 停用并销毁当前保存的全部实例
    pub fn deactivate(&self) -> ReferenceResult<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let previous = std::mem::replace(&mut *self.store.write(), Arc::new(InstanceStore::new()));
        info!(
            "作用域已停用: {}，销毁 {} 个实例",
            self.scope.id(),
            previous.len()
        );
        previous.close()
    }

    /// 已保存的实例数量
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    /// 是否没有实例
    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    fn current_store(&self) -> Arc<InstanceStore> {
        Arc::clone(&self.store.read())
    }
}

impl Scopelet for ContextualScopelet {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn governing_scope_id(&self) -> &ScopeId {
        &self.governing_scope_id
    }

    fn active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn instance(
        &self,
        id: &Id,
        factory: &Arc<dyn Factory>,
        creation: &dyn Creation,
    ) -> ReferenceResult<Instance> {
        if !self.active() {
            return Err(ReferenceError::InactiveScope {
                scope_id: self.scope.id().to_string(),
            });
        }
        self.current_store().get_or_create(id, factory, creation)
    }

    fn remove(&self, id: &Id) -> ReferenceResult<bool> {
        self.current_store().remove(id)
    }

    fn close(&self) -> ReferenceResult<()> {
        self.active.store(false, Ordering::SeqCst);
        self.current_store().close()
    }
}
