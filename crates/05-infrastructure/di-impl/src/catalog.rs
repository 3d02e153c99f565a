//! 默认 bean 目录实现

use dashmap::DashMap;
use di_abstractions::{Assignability, Bean, BeanCatalog, DefaultAssignability, Selector};
use std::sync::Arc;
use tracing::debug;

/// 默认 bean 目录
///
/// bean 集合在装配后不再变化，按选择器缓存匹配结果。
/// 缓存不设上限，假定应用使用的选择器是有限集合；运行时拼出任意名称限定符的调用方会让缓存持续增长。
pub struct DefaultBeanCatalog {
    beans: Vec<Bean>,
    assignability: Arc<dyn Assignability>,
    cache: DashMap<Selector, Arc<[Bean]>>,
}

impl DefaultBeanCatalog {
    /// 使用默认匹配判定创建目录
    pub fn new(beans: impl IntoIterator<Item = Bean>) -> Self {
        Self::with_assignability(beans, Arc::new(DefaultAssignability))
    }

    /// 使用指定匹配判定创建目录
    pub fn with_assignability(
        beans: impl IntoIterator<Item = Bean>,
        assignability: Arc<dyn Assignability>,
    ) -> Self {
        Self {
            beans: beans.into_iter().collect(),
            assignability,
            cache: DashMap::new(),
        }
    }

    /// 全部 bean
    pub fn all(&self) -> &[Bean] {
        &self.beans
    }

    /// bean 数量
    pub fn len(&self) -> usize {
        self.beans.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.beans.is_empty()
    }
}

impl BeanCatalog for DefaultBeanCatalog {
    fn beans(&self, selector: &Selector) -> Vec<Bean> {
        if let Some(cached) = self.cache.get(selector) {
            return cached.to_vec();
        }
        let matched: Arc<[Bean]> = self
            .beans
            .iter()
            .filter(|bean| self.assignability.selects(selector, bean.id()))
            .cloned()
            .collect();
        debug!("选择器 {} 匹配 {} 个 bean", selector, matched.len());
        let cached = self.cache.entry(selector.clone()).or_insert(matched);
        cached.to_vec()
    }

    fn selects(&self, selector: &Selector, bean: &Bean) -> bool {
        self.assignability.selects(selector, bean.id())
    }
}
