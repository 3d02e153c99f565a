//! 引用请求
//!
//! 一次顶层引用获取的工作单元。每直接解析一个依赖就派生一个子请求，子请求拥有销毁器树上新压入的子节点，
//! 工厂看到的创建上下文是子请求而不是父请求，因此依赖的清理动作总是归属于请求它的一方。
//! 经由客户端代理交出的引用不派生子请求：代理背后的实例归作用域解析器所有，在解析器提供的上下文中创建。

use crate::destructor_tree::DefaultDestructorTree;
use di_abstractions::{
    cast, Bean, ClientProxier, Creation, Destructor, DestructorRegistry, DestructorTree, Id,
    Instance, InstanceIdentity, InstanceManager, InstanceSupplier, ReferenceConfig, ScopeId,
    Selector,
};
use infrastructure_common::{ReferenceError, ReferenceResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// 通过迭代器交出的依赖作用域引用
struct Dependent {
    _instance: Instance,
    tree: Arc<dyn DestructorTree>,
}

struct RequestNode {
    id: Uuid,
    instance_manager: Arc<dyn InstanceManager>,
    proxier: Arc<dyn ClientProxier>,
    tree: Arc<dyn DestructorTree>,
    config: Arc<ReferenceConfig>,
    bean: Option<Bean>,
    parent: Option<Arc<RequestNode>>,
    /// 为客户端代理派生的请求，循环检测不越过此节点
    proxy_boundary: bool,
    dependents: Mutex<HashMap<InstanceIdentity, Dependent>>,
}

/// 一次解析的结果
struct Produced {
    instance: Instance,
    /// 直接解析（未代理）时的子请求
    child: Option<Request>,
}

/// 引用请求
///
/// 轻量的共享句柄，克隆得到的是同一个请求。
#[derive(Clone)]
pub struct Request {
    node: Arc<RequestNode>,
}

impl Request {
    /// 创建根请求
    pub fn new(
        instance_manager: Arc<dyn InstanceManager>,
        proxier: Arc<dyn ClientProxier>,
        tree: Arc<dyn DestructorTree>,
        config: Arc<ReferenceConfig>,
    ) -> Self {
        let node = RequestNode {
            id: Uuid::new_v4(),
            instance_manager,
            proxier,
            tree,
            config,
            bean: None,
            parent: None,
            proxy_boundary: false,
            dependents: Mutex::new(HashMap::new()),
        };
        debug!(request = %node.id, "创建根请求");
        Self {
            node: Arc::new(node),
        }
    }

    /// 请求标识
    pub fn id(&self) -> Uuid {
        self.node.id
    }

    /// 父请求，根请求返回 `None`
    pub fn parent(&self) -> Option<Request> {
        self.node
            .parent
            .as_ref()
            .map(|node| Request { node: Arc::clone(node) })
    }

    /// 本请求拥有的销毁器树节点
    pub fn destructor_tree(&self) -> &Arc<dyn DestructorTree> {
        &self.node.tree
    }

    /// 解析满足选择器的引用
    pub fn reference(&self, selector: &Selector) -> ReferenceResult<Instance> {
        let bean = self.node.instance_manager.bean(selector)?;
        Ok(self.produce(selector, &bean)?.instance)
    }

    /// 以指定 bean 解析引用
    pub fn reference_bean(&self, selector: &Selector, bean: &Bean) -> ReferenceResult<Instance> {
        if !self.node.instance_manager.catalog().selects(selector, bean) {
            return Err(ReferenceError::invalid_argument(format!(
                "bean {bean} 不满足选择器 {selector}"
            )));
        }
        Ok(self.produce(selector, bean)?.instance)
    }

    /// 解析引用并转换为具体类型
    pub fn reference_as<T>(&self, selector: &Selector) -> ReferenceResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        cast::<T>(&self.reference(selector)?)
    }

    /// 逐个解析满足选择器的全部 bean
    pub fn references(&self, selector: &Selector) -> ReferenceIter {
        ReferenceIter {
            request: self.clone(),
            selector: selector.clone(),
            beans: self
                .node
                .instance_manager
                .catalog()
                .beans(selector)
                .into_iter(),
            last: None,
        }
    }

    /// 销毁通过迭代器交出的依赖作用域引用
    ///
    /// 返回是否执行了销毁；其他引用以及重复销毁都返回 `false`。
    pub fn destroy(&self, reference: &Instance) -> ReferenceResult<bool> {
        let dependent = self
            .node
            .dependents
            .lock()
            .remove(&InstanceIdentity::of(reference));
        let Some(dependent) = dependent else {
            return Ok(false);
        };
        let Some(destructor) = self.node.tree.remove(InstanceIdentity::of(&dependent.tree)) else {
            return Ok(false);
        };
        debug!(request = %self.node.id, "销毁引用");
        destructor().map_err(|e| {
            error!(request = %self.node.id, "销毁引用失败: {}", e);
            e
        })?;
        Ok(true)
    }

    /// 关闭请求，连同全部子请求
    pub fn close(&self) -> ReferenceResult<()> {
        let result = self.node.tree.close();
        self.node.dependents.lock().clear();
        debug!(request = %self.node.id, "请求已关闭");
        result
    }

    /// 是否已关闭
    pub fn is_closed(&self) -> bool {
        self.node.tree.is_closed()
    }

    /// 让实例管理器移除并销毁 `id` 对应的实例
    pub fn remove(&self, id: &Id) -> ReferenceResult<bool> {
        self.node.instance_manager.remove(id, self)
    }

    fn produce(&self, selector: &Selector, bean: &Bean) -> ReferenceResult<Produced> {
        let id = bean.id();
        if self.node.proxier.needs_client_proxy(id) {
            if self.is_closed() {
                return Err(ReferenceError::Closed);
            }
            // 代理缓存在容器生命周期内有效，供应者不能引用当前请求
            let context = self.detached(bean);
            let instance_manager = Arc::clone(&self.node.instance_manager);
            let selector = selector.clone();
            let target = bean.clone();
            let supplier: InstanceSupplier =
                Arc::new(move || instance_manager.instance(&selector, Some(&target), &context));
            debug!(request = %self.node.id, bean = %bean, "交出客户端代理");
            let instance = self.node.proxier.client_proxy(id, supplier)?;
            return Ok(Produced {
                instance,
                child: None,
            });
        }

        let child = self.child(bean)?;
        debug!(request = %child.node.id, bean = %bean, "解析引用");
        let instance = self
            .node
            .instance_manager
            .instance(selector, Some(bean), &child)?;
        Ok(Produced {
            instance,
            child: Some(child),
        })
    }

    /// 派生子请求，子请求拥有新压入的销毁器树子节点
    fn child(&self, bean: &Bean) -> ReferenceResult<Request> {
        if self.node.config.enable_circular_dependency_detection {
            self.check_cycle(bean)?;
        }
        let tree = self.node.tree.new_child()?;
        Ok(self.derive(tree, Some(bean.clone()), Some(Arc::clone(&self.node)), false))
    }

    /// 客户端代理背后的解析上下文
    ///
    /// 不属于任何请求：作用域解析器为保存的实例另行提供销毁器节点。
    fn detached(&self, bean: &Bean) -> Request {
        let tree: Arc<dyn DestructorTree> = Arc::new(DefaultDestructorTree::new());
        self.derive(tree, Some(bean.clone()), None, true)
    }

    fn derive(
        &self,
        tree: Arc<dyn DestructorTree>,
        bean: Option<Bean>,
        parent: Option<Arc<RequestNode>>,
        proxy_boundary: bool,
    ) -> Request {
        Request {
            node: Arc::new(RequestNode {
                id: Uuid::new_v4(),
                instance_manager: Arc::clone(&self.node.instance_manager),
                proxier: Arc::clone(&self.node.proxier),
                tree,
                config: Arc::clone(&self.node.config),
                bean,
                parent,
                proxy_boundary,
                dependents: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// 祖先请求正在解析同一个 bean 时报告循环依赖
    ///
    /// 只检查到最近的代理边界为止：代理延迟解析的目标不属于当前的构造链。
    fn check_cycle(&self, bean: &Bean) -> ReferenceResult<()> {
        let mut chain = vec![bean.to_string()];
        let mut node = Some(&self.node);
        while let Some(current) = node {
            if let Some(ancestor) = &current.bean {
                chain.push(ancestor.to_string());
                if ancestor == bean {
                    chain.reverse();
                    return Err(ReferenceError::CircularDependency {
                        dependency_chain: chain.join(" -> "),
                    });
                }
            }
            if current.proxy_boundary {
                break;
            }
            node = current.parent.as_ref();
        }
        Ok(())
    }

    fn track(&self, instance: &Instance, child: &Request) {
        self.node.dependents.lock().insert(
            InstanceIdentity::of(instance),
            Dependent {
                _instance: Arc::clone(instance),
                tree: Arc::clone(&child.node.tree),
            },
        );
    }
}

impl DestructorRegistry for Request {
    fn register(&self, instance: Instance, destructor: Destructor) -> bool {
        self.node.tree.register(instance, destructor)
    }
}

impl Creation for Request {
    fn bean(&self) -> Option<&Bean> {
        self.node.bean.as_ref()
    }

    fn reference(&self, selector: &Selector) -> ReferenceResult<Instance> {
        Request::reference(self, selector)
    }

    fn reference_bean(&self, selector: &Selector, bean: &Bean) -> ReferenceResult<Instance> {
        Request::reference_bean(self, selector, bean)
    }

    fn destroy(&self, instance: &Instance) -> ReferenceResult<bool> {
        Request::destroy(self, instance)
    }

    fn shared(&self) -> Arc<dyn Creation> {
        Arc::new(self.clone())
    }

    fn owned_by(&self, tree: Arc<dyn DestructorTree>) -> Arc<dyn Creation> {
        // 不保留父请求，保存的上下文不能让创建它的请求一直存活
        Arc::new(self.derive(
            tree,
            self.node.bean.clone(),
            None,
            self.node.proxy_boundary,
        ))
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.node.id)
            .field("bean", &self.node.bean)
            .field("closed", &self.node.tree.is_closed())
            .finish_non_exhaustive()
    }
}

/// 引用迭代器
///
/// 单次遍历，每次前进时才解析下一个 bean。
pub struct ReferenceIter {
    request: Request,
    selector: Selector,
    beans: std::vec::IntoIter<Bean>,
    last: Option<Instance>,
}

impl ReferenceIter {
    /// 销毁最近一次交出的引用
    ///
    /// 仅对依赖作用域的引用有效；尚未交出任何引用时返回错误。
    pub fn remove(&mut self) -> ReferenceResult<bool> {
        let last = self
            .last
            .take()
            .ok_or_else(|| ReferenceError::illegal_state("迭代器尚未交出引用"))?;
        self.request.destroy(&last)
    }
}

impl Iterator for ReferenceIter {
    type Item = ReferenceResult<Instance>;

    fn next(&mut self) -> Option<Self::Item> {
        let bean = self.beans.next()?;
        let produced = match self.request.produce(&self.selector, &bean) {
            Ok(produced) => produced,
            Err(e) => return Some(Err(e)),
        };
        if let Some(child) = &produced.child {
            if bean.id().governing_scope_id() == &ScopeId::NONE {
                self.request.track(&produced.instance, child);
            }
        }
        self.last = Some(Arc::clone(&produced.instance));
        Some(Ok(produced.instance))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.beans.size_hint()
    }
}
