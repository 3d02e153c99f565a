//! 实例管理抽象接口
//!
//! 提供沿作用域链获取实例的能力

use crate::factory::Creation;
use crate::registry::{Bean, BeanCatalog, Id, Instance};
use crate::selector::Selector;
use infrastructure_common::{ReferenceError, ReferenceResult};
use std::sync::Arc;

/// 实例管理器 trait
///
/// 从 bean 出发找到管理它的作用域解析器（解析器本身也是 bean），逐级向上直到自我管理的解析器，再逐级向下取得实例。
pub trait InstanceManager: Send + Sync {
    /// bean 目录
    fn catalog(&self) -> &Arc<dyn BeanCatalog>;

    /// 解析满足选择器的唯一 bean
    fn bean(&self, selector: &Selector) -> ReferenceResult<Bean>;

    /// 获取实例
    ///
    /// 未指定 `bean` 时按选择器解析；指定时 `bean` 必须满足选择器。
    fn instance(
        &self,
        selector: &Selector,
        bean: Option<&Bean>,
        creation: &dyn Creation,
    ) -> ReferenceResult<Instance>;

    /// 让管理 `id` 所在作用域的解析器移除并销毁对应实例
    fn remove(&self, id: &Id, creation: &dyn Creation) -> ReferenceResult<bool>;
}

/// 作用域链
///
/// 记录一次解析中已经经过的 bean 标识，用于检测作用域管理关系中的循环并限制链的深度。
#[derive(Debug, Clone)]
pub struct ScopeChain {
    /// 当前解析链
    links: Vec<Id>,
    /// 最大管理层数
    max_depth: usize,
}

impl ScopeChain {
    /// 以起始 bean 创建作用域链
    pub fn new(origin: &Id, max_depth: usize) -> Self {
        Self {
            links: vec![origin.clone()],
            max_depth,
        }
    }

    /// 添加下一层管理者
    pub fn push(&mut self, governing: &Id) -> ReferenceResult<()> {
        if self.links.contains(governing) {
            return Err(ReferenceError::configuration(format!(
                "作用域管理关系存在循环: {} -> {}",
                self.describe(),
                governing
            )));
        }
        if self.depth() >= self.max_depth {
            return Err(ReferenceError::configuration(format!(
                "作用域链超过最大深度 {}: {} -> {}",
                self.max_depth,
                self.describe(),
                governing
            )));
        }
        self.links.push(governing.clone());
        Ok(())
    }

    /// 已经过的管理层数
    pub fn depth(&self) -> usize {
        self.links.len() - 1
    }

    fn describe(&self) -> String {
        self.links
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
