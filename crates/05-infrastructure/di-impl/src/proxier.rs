//! 客户端代理层实现
//!
//! 代理策略在装配时选定：通用转发代理、按类型生成的代理构造器，或者不支持代理。

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use di_abstractions::{
    cast, proxy_instance, ClientProxier, ClientProxy, ClientProxyStrategy, DefaultProxyNamer, Id,
    Instance, InstanceSupplier, ProxyClassGenerator, ProxyConstructor, ProxyNamer,
    ProxySpecification, ProxyStrategyKind, Scopes,
};
use infrastructure_common::{ReferenceError, ReferenceResult};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// 默认客户端代理层
///
/// 只有管理作用域为常规作用域的 bean 需要代理。每个 bean 标识最多创建一个代理，并发的首次请求得到同一个代理。
pub struct DefaultClientProxier {
    scopes: Scopes,
    strategy: Arc<dyn ClientProxyStrategy>,
    namer: Arc<dyn ProxyNamer>,
    cache: DashMap<Id, Arc<OnceCell<Instance>>>,
    created: AtomicU64,
}

impl DefaultClientProxier {
    /// 使用默认命名器创建
    pub fn new(scopes: Scopes, strategy: Arc<dyn ClientProxyStrategy>) -> Self {
        Self::with_namer(scopes, strategy, Arc::new(DefaultProxyNamer))
    }

    /// 使用指定命名器创建
    pub fn with_namer(
        scopes: Scopes,
        strategy: Arc<dyn ClientProxyStrategy>,
        namer: Arc<dyn ProxyNamer>,
    ) -> Self {
        Self {
            scopes,
            strategy,
            namer,
            cache: DashMap::new(),
            created: AtomicU64::new(0),
        }
    }

    /// 作用域表
    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    /// 已创建的代理数量
    pub fn proxies_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}

impl ClientProxier for DefaultClientProxier {
    fn needs_client_proxy(&self, id: &Id) -> bool {
        self.scopes.is_normal(id.governing_scope_id())
    }

    fn client_proxy(&self, id: &Id, supplier: InstanceSupplier) -> ReferenceResult<Instance> {
        if !self.strategy.supports_runtime_generation() {
            return Err(ReferenceError::ProxyUnsupported {
                type_name: id.to_string(),
            });
        }
        let cell = self
            .cache
            .entry(id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .value()
            .clone();
        let proxy = cell.get_or_try_init(|| {
            let specification = ProxySpecification::new(id, self.namer.as_ref())?;
            let proxy = self.strategy.instantiate(&specification, id, supplier)?;
            self.created.fetch_add(1, Ordering::Relaxed);
            debug!("创建客户端代理 {} -> {}", specification.name(), id);
            Ok::<_, ReferenceError>(proxy_instance(proxy))
        })?;
        Ok(proxy.clone())
    }
}

/// 通用转发代理
///
/// 每次访问都通过提供者取得当前实例，代理本身不保存实例。
pub struct ForwardingClientProxy {
    id: Id,
    supplier: InstanceSupplier,
}

impl ForwardingClientProxy {
    pub fn new(id: Id, supplier: InstanceSupplier) -> Self {
        Self { id, supplier }
    }

    /// 以具体类型访问当前实例
    pub fn with<T, R>(&self, f: impl FnOnce(&T) -> R) -> ReferenceResult<R>
    where
        T: Send + Sync + 'static,
    {
        let target = cast::<T>(&self.proxied()?)?;
        Ok(f(target.as_ref()))
    }
}

impl ClientProxy for ForwardingClientProxy {
    fn id(&self) -> &Id {
        &self.id
    }

    fn proxied(&self) -> ReferenceResult<Instance> {
        (self.supplier)()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ForwardingClientProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingClientProxy")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// 转发代理策略
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardingProxyStrategy;

impl ClientProxyStrategy for ForwardingProxyStrategy {
    fn instantiate(
        &self,
        _specification: &ProxySpecification,
        id: &Id,
        supplier: InstanceSupplier,
    ) -> ReferenceResult<Arc<dyn ClientProxy>> {
        Ok(Arc::new(ForwardingClientProxy::new(id.clone(), supplier)))
    }
}

/// 生成代理策略
///
/// 按代理名称查找已定义的代理构造器；未找到时交给生成器生成并定义。定义可能因并发而失败，
/// 此时再查找一次，仍未找到才返回生成错误。
pub struct GeneratingProxyStrategy {
    generator: Arc<dyn ProxyClassGenerator>,
    classes: DashMap<String, ProxyConstructor>,
}

impl GeneratingProxyStrategy {
    pub fn new(generator: Arc<dyn ProxyClassGenerator>) -> Self {
        Self {
            generator,
            classes: DashMap::new(),
        }
    }

    /// 预先定义代理构造器
    pub fn register_class(
        &self,
        name: impl Into<String>,
        constructor: ProxyConstructor,
    ) -> ReferenceResult<()> {
        self.define(name.into(), constructor)
    }

    /// 查找已定义的代理构造器
    pub fn load(&self, name: &str) -> Option<ProxyConstructor> {
        self.classes.get(name).map(|constructor| constructor.clone())
    }

    /// 定义代理构造器，同名构造器已存在时失败
    pub fn define(&self, name: String, constructor: ProxyConstructor) -> ReferenceResult<()> {
        match self.classes.entry(name) {
            Entry::Occupied(entry) => Err(ReferenceError::illegal_state(format!(
                "代理 {} 已定义",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(constructor);
                Ok(())
            }
        }
    }

    /// 已定义的代理数量
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// 是否没有已定义的代理
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    fn constructor(&self, specification: &ProxySpecification) -> ReferenceResult<ProxyConstructor> {
        let name = specification.name();
        if let Some(constructor) = self.load(name) {
            return Ok(constructor);
        }
        let generated = self.generator.generate(specification).and_then(|constructor| {
            self.define(name.to_string(), constructor.clone())?;
            Ok(constructor)
        });
        match generated {
            Ok(constructor) => {
                debug!("代理未预先定义，已生成: {}", name);
                Ok(constructor)
            }
            Err(generation_error) => match self.load(name) {
                Some(constructor) => {
                    debug!("代理生成失败后重新查找成功: {}", name);
                    Ok(constructor)
                }
                None => Err(generation_error),
            },
        }
    }
}

impl ClientProxyStrategy for GeneratingProxyStrategy {
    fn instantiate(
        &self,
        specification: &ProxySpecification,
        id: &Id,
        supplier: InstanceSupplier,
    ) -> ReferenceResult<Arc<dyn ClientProxy>> {
        let constructor = self.constructor(specification)?;
        constructor(id, supplier)
            .map_err(|e| ReferenceError::instantiation_failed(specification.name(), e))
    }
}

/// 不支持代理的策略
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedProxyStrategy;

impl ClientProxyStrategy for UnsupportedProxyStrategy {
    fn supports_runtime_generation(&self) -> bool {
        false
    }

    fn instantiate(
        &self,
        specification: &ProxySpecification,
        _id: &Id,
        _supplier: InstanceSupplier,
    ) -> ReferenceResult<Arc<dyn ClientProxy>> {
        Err(ReferenceError::ProxyUnsupported {
            type_name: specification.proxied().to_string(),
        })
    }
}

/// 按配置选择代理策略
pub fn proxy_strategy(
    kind: ProxyStrategyKind,
    generator: Option<Arc<dyn ProxyClassGenerator>>,
) -> ReferenceResult<Arc<dyn ClientProxyStrategy>> {
    info!("使用代理策略: {:?}", kind);
    match (kind, generator) {
        (ProxyStrategyKind::Forwarding, _) => Ok(Arc::new(ForwardingProxyStrategy)),
        (ProxyStrategyKind::Generating, Some(generator)) => {
            Ok(Arc::new(GeneratingProxyStrategy::new(generator)))
        }
        (ProxyStrategyKind::Generating, None) => Err(ReferenceError::configuration(
            "生成代理策略需要提供代理生成器",
        )),
        (ProxyStrategyKind::Unsupported, _) => Ok(Arc::new(UnsupportedProxyStrategy)),
    }
}
