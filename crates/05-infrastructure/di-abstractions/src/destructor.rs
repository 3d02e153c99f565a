//! 销毁器注册表抽象
//!
//! 分层的清理动作注册表：关闭节点会执行其下注册的全部动作，子节点以自身的关闭动作注册在父节点中。

use crate::registry::{Instance, InstanceIdentity};
use infrastructure_common::ReferenceResult;
use std::sync::Arc;

/// 销毁动作
pub type Destructor = Box<dyn FnOnce() -> ReferenceResult<()> + Send>;

/// 销毁器注册表
pub trait DestructorRegistry: Send + Sync {
    /// 为实例注册销毁动作
    ///
    /// 按实例身份去重：已关闭或已注册时返回 `false` 且不做任何事。
    fn register(&self, instance: Instance, destructor: Destructor) -> bool;
}

/// 销毁器树
pub trait DestructorTree: DestructorRegistry {
    /// 创建子节点，并以子节点的关闭动作注册到本节点
    fn new_child(&self) -> ReferenceResult<Arc<dyn DestructorTree>>;

    /// 取消注册并交出销毁动作，不执行它
    fn remove(&self, identity: InstanceIdentity) -> Option<Destructor>;

    /// 关闭节点，执行全部销毁动作
    ///
    /// 重复关闭不做任何事。所有动作都会被执行，失败会被聚合后一次性返回。
    fn close(&self) -> ReferenceResult<()>;

    /// 是否已关闭
    fn is_closed(&self) -> bool;

    /// 已注册的销毁动作数量
    fn len(&self) -> usize;

    /// 是否没有已注册的销毁动作
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
