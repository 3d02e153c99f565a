//! 引用容器主入口

use crate::builder::ReferencesBuilder;
use di_abstractions::{
    BeanCatalog, ClientProxier, DestructorTree, InstanceManager, ReferenceConfig, ResolutionStats,
};
use di_impl::{DefaultClientProxier, DefaultDestructorTree, DefaultInstanceManager, Request};
use infrastructure_common::{InfrastructureError, ReferenceError, ReferenceResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// 引用容器
///
/// 持有实例管理器和客户端代理层，为每次顶层引用获取创建根请求
pub struct References {
    id: Uuid,
    instance_manager: Arc<DefaultInstanceManager>,
    proxier: Arc<DefaultClientProxier>,
    config: Arc<ReferenceConfig>,
    status: RwLock<ReferencesStatus>,
}

impl References {
    /// 创建引用容器构建器
    pub fn builder() -> ReferencesBuilder {
        ReferencesBuilder::new()
    }

    pub(crate) fn new(
        instance_manager: Arc<DefaultInstanceManager>,
        proxier: Arc<DefaultClientProxier>,
        config: Arc<ReferenceConfig>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance_manager,
            proxier,
            config,
            status: RwLock::new(ReferencesStatus::Running),
        }
    }

    /// 容器标识
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 创建根请求
    ///
    /// 每个根请求拥有独立的销毁器树，由调用方负责关闭。
    pub fn request(&self) -> ReferenceResult<Request> {
        if *self.status.read() != ReferencesStatus::Running {
            return Err(ReferenceError::Closed);
        }
        let tree: Arc<dyn DestructorTree> = Arc::new(DefaultDestructorTree::new());
        let instance_manager: Arc<dyn InstanceManager> = self.instance_manager.clone();
        let proxier: Arc<dyn ClientProxier> = self.proxier.clone();
        Ok(Request::new(
            instance_manager,
            proxier,
            tree,
            Arc::clone(&self.config),
        ))
    }

    /// 实例管理器
    pub fn instance_manager(&self) -> &Arc<DefaultInstanceManager> {
        &self.instance_manager
    }

    /// bean 目录
    pub fn catalog(&self) -> &Arc<dyn BeanCatalog> {
        self.instance_manager.catalog()
    }

    /// 客户端代理层
    pub fn proxier(&self) -> &Arc<DefaultClientProxier> {
        &self.proxier
    }

    /// 引用解析配置
    pub fn config(&self) -> &ReferenceConfig {
        &self.config
    }

    /// 运行状态
    pub fn status(&self) -> ReferencesStatus {
        *self.status.read()
    }

    /// 解析统计，未启用性能监控时返回 `None`
    pub fn stats(&self) -> Option<ResolutionStats> {
        self.instance_manager.stats().map(|mut stats| {
            stats.proxies_created = self.proxier.proxies_created();
            stats
        })
    }

    /// 关闭容器，销毁根作用域中保存的全部实例
    pub fn close(&self) -> Result<(), InfrastructureError> {
        {
            let mut status = self.status.write();
            if *status != ReferencesStatus::Running {
                return Ok(());
            }
            *status = ReferencesStatus::Closing;
        }
        info!("关闭引用容器: {}", self.id);

        let result = self.instance_manager.close();
        *self.status.write() = ReferencesStatus::Closed;
        result.map_err(|e| {
            error!("引用容器关闭失败: {}", e);
            InfrastructureError::ShutdownFailed {
                message: e.to_string(),
            }
        })?;

        info!("引用容器已关闭: {}", self.id);
        Ok(())
    }
}

/// 容器运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferencesStatus {
    /// 运行中
    Running,
    /// 关闭中
    Closing,
    /// 已关闭
    Closed,
}
