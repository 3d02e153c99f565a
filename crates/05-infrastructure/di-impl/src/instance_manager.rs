//! 默认实例管理器
//!
//! 沿作用域链向上找到自我管理的作用域解析器，再逐级向下取得目标实例。

use crate::catalog::DefaultBeanCatalog;
use crate::scopelet::{NoneScopelet, SingletonScopelet};
use di_abstractions::{
    ambiguous, as_scopelet, scopelet_selector, unsatisfied, Bean, BeanCatalog, Creation, Id,
    Instance, InstanceManager, ReferenceConfig, ResolutionStats, ScopeChain, ScopeletFactory,
    Scopelet, Selector,
};
use infrastructure_common::{ReferenceError, ReferenceResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// 默认实例管理器
pub struct DefaultInstanceManager {
    catalog: Arc<dyn BeanCatalog>,
    config: ReferenceConfig,
    /// 由本管理器创建、随其关闭的根作用域解析器
    owned_scopelets: Vec<Arc<dyn Scopelet>>,
    stats: Option<Mutex<ResolutionStats>>,
}

impl DefaultInstanceManager {
    /// 基于已有目录创建
    pub fn new(catalog: Arc<dyn BeanCatalog>, config: ReferenceConfig) -> Self {
        let stats = config.enable_performance_monitoring.then(|| {
            Mutex::new(ResolutionStats {
                since: Some(chrono::Utc::now()),
                ..ResolutionStats::default()
            })
        });
        Self {
            catalog,
            config,
            owned_scopelets: Vec::new(),
            stats,
        }
    }

    /// 以 bean 集合创建，并加入内置的单例与依赖作用域解析器
    pub fn with_beans(beans: impl IntoIterator<Item = Bean>, config: ReferenceConfig) -> Self {
        let singleton: Arc<dyn Scopelet> = Arc::new(SingletonScopelet::new());
        let none: Arc<dyn Scopelet> = Arc::new(NoneScopelet::new());

        let mut all: Vec<Bean> = beans.into_iter().collect();
        all.push(ScopeletFactory::bean(Arc::clone(&singleton)));
        all.push(ScopeletFactory::bean(none));
        debug!("实例管理器装配 {} 个 bean", all.len());

        let mut manager = Self::new(Arc::new(DefaultBeanCatalog::new(all)), config);
        manager.owned_scopelets.push(singleton);
        manager
    }

    /// 配置
    pub fn config(&self) -> &ReferenceConfig {
        &self.config
    }

    /// 统计信息快照，未启用性能监控时返回 `None`
    pub fn stats(&self) -> Option<ResolutionStats> {
        self.stats.as_ref().map(|stats| stats.lock().clone())
    }

    /// 关闭由本管理器创建的根作用域解析器
    pub fn close(&self) -> ReferenceResult<()> {
        let errors: Vec<ReferenceError> = self
            .owned_scopelets
            .iter()
            .rev()
            .filter_map(|scopelet| scopelet.close().err())
            .collect();
        match ReferenceError::aggregate(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn record(&self, update: impl FnOnce(&mut ResolutionStats)) {
        if let Some(stats) = &self.stats {
            update(&mut stats.lock());
        }
    }

    /// 沿作用域链解析 bean 的实例
    fn resolve(&self, bean: &Bean, creation: &dyn Creation) -> ReferenceResult<Instance> {
        if let Some(singleton) = bean.factory().singleton() {
            self.record(|s| s.singleton_short_circuits += 1);
            return Ok(singleton);
        }

        self.record(|s| s.scope_chain_walks += 1);
        let mut chain = ScopeChain::new(bean.id(), self.config.max_scope_chain_depth);
        // 等待各自管理者取得实例的 bean，越靠后离根越近
        let mut pending: Vec<Bean> = Vec::new();
        let mut current = bean.clone();

        let mut instance = loop {
            let governing = self.bean(&scopelet_selector(current.id().governing_scope_id()))?;
            if governing == current {
                debug!("自我管理的作用域解析器，直接创建: {}", current);
                break current.factory().create(creation)?;
            }
            chain.push(governing.id())?;
            pending.push(current);
            if let Some(singleton) = governing.factory().singleton() {
                break singleton;
            }
            current = governing;
        };

        while let Some(next) = pending.pop() {
            let scopelet = as_scopelet(&instance).ok_or_else(|| ReferenceError::TypeMismatch {
                expected: format!("管理 {} 的作用域解析器", next.id().governing_scope_id()),
            })?;
            debug!("作用域 {} 获取实例: {}", scopelet.scope_id(), next);
            instance = scopelet.instance(next.id(), next.factory(), creation)?;
        }
        Ok(instance)
    }
}

impl InstanceManager for DefaultInstanceManager {
    fn catalog(&self) -> &Arc<dyn BeanCatalog> {
        &self.catalog
    }

    fn bean(&self, selector: &Selector) -> ReferenceResult<Bean> {
        self.catalog
            .bean(selector, &disambiguate)?
            .ok_or_else(|| unsatisfied(selector))
    }

    fn instance(
        &self,
        selector: &Selector,
        bean: Option<&Bean>,
        creation: &dyn Creation,
    ) -> ReferenceResult<Instance> {
        self.record(|s| s.resolutions += 1);
        let result = match bean {
            None => self
                .bean(selector)
                .and_then(|bean| self.resolve(&bean, creation)),
            Some(bean) if !self.catalog.selects(selector, bean) => {
                Err(ReferenceError::invalid_argument(format!(
                    "bean {bean} 不满足选择器 {selector}"
                )))
            }
            Some(bean) => self.resolve(bean, creation),
        };
        if result.is_err() {
            self.record(|s| s.resolution_errors += 1);
        }
        result
    }

    fn remove(&self, id: &Id, creation: &dyn Creation) -> ReferenceResult<bool> {
        let instance = self.instance(&scopelet_selector(id.governing_scope_id()), None, creation)?;
        let scopelet = as_scopelet(&instance).ok_or_else(|| ReferenceError::TypeMismatch {
            expected: format!("管理 {} 的作用域解析器", id.governing_scope_id()),
        })?;
        scopelet.remove(id)
    }
}

/// 在多个候选中选出唯一的作用域解析器 bean
///
/// 只有管理同一作用域的作用域解析器 bean 可以参与消歧。两个都处于活动状态时报错；
/// 只有一个活动时保留活动的一个；都不活动时两者都丢弃并继续扫描。
pub fn disambiguate(selector: &Selector, beans: &[Bean]) -> ReferenceResult<Bean> {
    if beans.len() < 2 {
        return Err(ReferenceError::invalid_argument(format!(
            "消歧需要至少两个候选，实际 {} 个",
            beans.len()
        )));
    }

    let mut winner: Option<(&Bean, Arc<dyn Scopelet>)> = None;
    let mut candidates = beans.iter();
    while let Some(candidate) = candidates.next() {
        let Some(scopelet) = candidate.factory().scopelet() else {
            return Err(ambiguous(selector, beans));
        };
        let (kept, kept_scopelet) = match winner.take() {
            Some(kept) => kept,
            None => match candidates.next() {
                None => {
                    // 扫描到最后只剩一个候选
                    winner = Some((candidate, scopelet));
                    break;
                }
                Some(next) => match next.factory().scopelet() {
                    Some(next_scopelet) => (next, next_scopelet),
                    None => return Err(ambiguous(selector, beans)),
                },
            },
        };

        if kept_scopelet.scope_id() != scopelet.scope_id() {
            return Err(ambiguous(selector, beans));
        }
        winner = match (kept_scopelet.active(), scopelet.active()) {
            (true, true) => {
                return Err(ReferenceError::TooManyActiveScopelets {
                    scope_id: scopelet.scope_id().to_string(),
                    first: kept.to_string(),
                    second: candidate.to_string(),
                })
            }
            (true, false) => Some((kept, kept_scopelet)),
            (false, true) => Some((candidate, scopelet)),
            (false, false) => {
                warn!(
                    "作用域 {} 的两个候选解析器都未激活，全部丢弃: {}, {}",
                    scopelet.scope_id(),
                    kept,
                    candidate
                );
                None
            }
        };
    }

    winner
        .map(|(bean, _)| bean.clone())
        .ok_or_else(|| ambiguous(selector, beans))
}
