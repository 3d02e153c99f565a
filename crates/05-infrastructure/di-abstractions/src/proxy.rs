//! 客户端代理抽象
//!
//! 常规作用域中的 bean 不直接交给调用方，而是交出一个代理；代理在每次调用时通过提供者取得当前实例。

use crate::registry::{Id, Instance};
use infrastructure_common::{ReferenceError, ReferenceResult, TypeInfo};
use std::any::Any;
use std::sync::Arc;

/// 实例提供者，每次调用都执行真实的查找
pub type InstanceSupplier = Arc<dyn Fn() -> ReferenceResult<Instance> + Send + Sync>;

/// 客户端代理
pub trait ClientProxy: Send + Sync {
    /// 被代理 bean 的标识
    fn id(&self) -> &Id;

    /// 取得当前的被代理实例，不做缓存
    fn proxied(&self) -> ReferenceResult<Instance>;

    /// 以 `Any` 访问具体代理类型
    fn as_any(&self) -> &dyn Any;
}

/// 将客户端代理包装为实例
pub fn proxy_instance(proxy: Arc<dyn ClientProxy>) -> Instance {
    Arc::new(proxy)
}

/// 从实例中取出客户端代理
pub fn as_client_proxy(instance: &Instance) -> Option<Arc<dyn ClientProxy>> {
    instance.downcast_ref::<Arc<dyn ClientProxy>>().cloned()
}

/// 将实例解析为具体类型
///
/// 实例是客户端代理时先取得当前的被代理实例。
pub fn cast<T>(instance: &Instance) -> ReferenceResult<Arc<T>>
where
    T: Send + Sync + 'static,
{
    if let Some(proxy) = as_client_proxy(instance) {
        return cast::<T>(&proxy.proxied()?);
    }
    instance
        .clone()
        .downcast::<T>()
        .map_err(|_| ReferenceError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
        })
}

/// 客户端代理层
pub trait ClientProxier: Send + Sync {
    /// 标识对应的 bean 是否需要客户端代理
    fn needs_client_proxy(&self, id: &Id) -> bool;

    /// 获取标识对应的代理，每个标识最多创建一个代理
    fn client_proxy(&self, id: &Id, supplier: InstanceSupplier) -> ReferenceResult<Instance>;
}

/// 代理命名器
pub trait ProxyNamer: Send + Sync {
    /// 为被代理类型计算代理名称
    fn proxy_name(&self, proxied: &TypeInfo) -> String;
}

/// 默认代理命名器
///
/// 代理与被代理类型位于同一模块，名称为 `Proxy$` 加上以 `$` 连接的完整路径。
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProxyNamer;

impl ProxyNamer for DefaultProxyNamer {
    fn proxy_name(&self, proxied: &TypeInfo) -> String {
        let path = proxied.erased_name();
        let flattened = path.replace("::", "$");
        match path.rsplit_once("::") {
            Some((module, _)) => format!("{module}::Proxy${flattened}"),
            None => format!("Proxy${flattened}"),
        }
    }
}

/// 代理描述
///
/// 首要类型为被代理类型，其余类型为代理同样要满足的附加类型。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxySpecification {
    proxied: TypeInfo,
    additional: Vec<TypeInfo>,
    name: String,
}

impl ProxySpecification {
    /// 根据 bean 标识计算代理描述
    pub fn new(id: &Id, namer: &dyn ProxyNamer) -> ReferenceResult<Self> {
        let Some((proxied, additional)) = id.types().split_first() else {
            return Err(ReferenceError::invalid_argument(format!(
                "bean {id} 没有可代理的类型"
            )));
        };
        Ok(Self {
            name: namer.proxy_name(proxied),
            proxied: proxied.clone(),
            additional: additional.to_vec(),
        })
    }

    /// 被代理类型
    pub fn proxied(&self) -> &TypeInfo {
        &self.proxied
    }

    /// 附加类型
    pub fn additional(&self) -> &[TypeInfo] {
        &self.additional
    }

    /// 代理名称
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 代理构造器：以标识和实例提供者构造代理
pub type ProxyConstructor =
    Arc<dyn Fn(&Id, InstanceSupplier) -> ReferenceResult<Arc<dyn ClientProxy>> + Send + Sync>;

/// 代理生成器
pub trait ProxyClassGenerator: Send + Sync {
    /// 为代理描述生成构造器
    fn generate(&self, specification: &ProxySpecification) -> ReferenceResult<ProxyConstructor>;
}

/// 代理策略
///
/// 在装配时选定，决定代理如何被构造。
pub trait ClientProxyStrategy: Send + Sync {
    /// 是否支持在运行时生成代理
    fn supports_runtime_generation(&self) -> bool {
        true
    }

    /// 构造代理
    fn instantiate(
        &self,
        specification: &ProxySpecification,
        id: &Id,
        supplier: InstanceSupplier,
    ) -> ReferenceResult<Arc<dyn ClientProxy>>;
}
