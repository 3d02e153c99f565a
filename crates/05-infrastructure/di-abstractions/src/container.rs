//! 引用解析配置与统计
//!
//! 提供引擎的可配置项和性能监控计数

use infrastructure_common::{ConfigError, ConfigResult, ConfigSection};
use serde::{Deserialize, Serialize};

/// 代理策略类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStrategyKind {
    /// 通用转发代理
    #[default]
    Forwarding,
    /// 按类型生成代理构造器
    Generating,
    /// 不支持代理
    Unsupported,
}

/// 引用解析配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// 作用域链的最大管理层数
    pub max_scope_chain_depth: usize,
    /// 是否启用循环依赖检测
    pub enable_circular_dependency_detection: bool,
    /// 代理策略
    pub proxy_strategy: ProxyStrategyKind,
    /// 是否启用性能监控
    pub enable_performance_monitoring: bool,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            max_scope_chain_depth: 32,
            enable_circular_dependency_detection: true,
            proxy_strategy: ProxyStrategyKind::Forwarding,
            enable_performance_monitoring: false,
        }
    }
}

impl ReferenceConfig {
    /// 从配置节绑定
    pub fn from_section(section: &ConfigSection) -> ConfigResult<Self> {
        let config: Self = section.bind()?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_scope_chain_depth == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_scope_chain_depth 必须大于 0".to_string(),
            });
        }
        Ok(())
    }
}

/// 解析统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    /// 实例解析次数
    pub resolutions: u64,
    /// 由工厂单例直接返回的次数
    pub singleton_short_circuits: u64,
    /// 作用域链遍历次数
    pub scope_chain_walks: u64,
    /// 创建的客户端代理数量
    pub proxies_created: u64,
    /// 解析错误数量
    pub resolution_errors: u64,
    /// 统计开始时间
    pub since: Option<chrono::DateTime<chrono::Utc>>,
}
