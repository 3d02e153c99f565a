//! 引用容器构建器

use crate::config_sources::{load_reference_config, DEFAULT_ENV_PREFIX};
use crate::references::References;
use di_abstractions::{
    Bean, ProxyClassGenerator, ProxyNamer, ReferenceConfig, Scope, Scopelet, ScopeletFactory,
    Scopes,
};
use di_impl::{proxy_strategy, DefaultClientProxier, DefaultInstanceManager};
use infrastructure_common::{InfrastructureError, InfrastructureResult};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// 引用容器构建器
///
/// 使用建造者模式收集 bean、作用域和配置，构建完整的 [`References`] 容器
pub struct ReferencesBuilder {
    /// 用户 bean，包括作用域解析器 bean
    beans: Vec<Bean>,
    /// 作用域表
    scopes: Scopes,
    /// 引用解析配置
    config: ReferenceConfig,
    /// 代理生成器
    proxy_generator: Option<Arc<dyn ProxyClassGenerator>>,
    /// 代理命名器
    proxy_namer: Option<Arc<dyn ProxyNamer>>,
    /// 是否启用日志初始化
    logging_enabled: bool,
    /// 日志配置
    logging_config: LoggingConfig,
}

impl ReferencesBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            beans: Vec::new(),
            scopes: Scopes::builtin(),
            config: ReferenceConfig::default(),
            proxy_generator: None,
            proxy_namer: None,
            logging_enabled: false, // 默认不启用日志初始化
            logging_config: LoggingConfig::default(),
        }
    }

    /// 添加 bean
    pub fn bean(mut self, bean: Bean) -> Self {
        debug!("添加 bean: {}", bean);
        self.beans.push(bean);
        self
    }

    /// 批量添加 bean
    pub fn beans(mut self, beans: impl IntoIterator<Item = Bean>) -> Self {
        self.beans.extend(beans);
        self
    }

    /// 声明作用域
    pub fn scope(mut self, scope: Scope) -> Self {
        info!("声明作用域: {} (常规: {})", scope.id(), scope.is_normal());
        self.scopes.register(scope);
        self
    }

    /// 添加作用域解析器，同时声明它管理的作用域
    pub fn scopelet(mut self, scopelet: Arc<dyn Scopelet>) -> Self {
        let scope = scopelet.scope().clone();
        info!("添加作用域解析器: {}", scope.id());
        self.scopes.register(scope);
        self.beans.push(ScopeletFactory::bean(scopelet));
        self
    }

    /// 设置引用解析配置
    pub fn config(mut self, config: ReferenceConfig) -> Self {
        self.config = config;
        self
    }

    /// 从配置文件加载引用解析配置
    pub fn with_config_file<P: AsRef<Path>>(self, path: P) -> InfrastructureResult<Self> {
        self.with_config_file_and_prefix(path, DEFAULT_ENV_PREFIX)
    }

    /// 从配置文件加载引用解析配置，使用指定的环境变量前缀
    pub fn with_config_file_and_prefix<P: AsRef<Path>>(
        mut self,
        path: P,
        env_prefix: &str,
    ) -> InfrastructureResult<Self> {
        self.config = load_reference_config(path.as_ref(), env_prefix)?;
        Ok(self)
    }

    /// 设置代理生成器，生成代理策略需要
    pub fn proxy_generator(mut self, generator: Arc<dyn ProxyClassGenerator>) -> Self {
        self.proxy_generator = Some(generator);
        self
    }

    /// 设置代理命名器
    pub fn proxy_namer(mut self, namer: Arc<dyn ProxyNamer>) -> Self {
        self.proxy_namer = Some(namer);
        self
    }

    /// 配置日志
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = config;
        self.logging_enabled = true;
        self
    }

    /// 构建引用容器
    pub fn build(self) -> InfrastructureResult<References> {
        // 只有在明确配置了日志时才初始化日志
        if self.logging_enabled {
            if let Err(e) = initialize_logging(&self.logging_config) {
                warn!("跳过日志初始化: {}", e);
            }
        }
        info!("开始构建引用容器");

        self.config.validate()?;
        let strategy = proxy_strategy(self.config.proxy_strategy, self.proxy_generator)?;
        let proxier = match self.proxy_namer {
            Some(namer) => DefaultClientProxier::with_namer(self.scopes, strategy, namer),
            None => DefaultClientProxier::new(self.scopes, strategy),
        };
        let instance_manager = DefaultInstanceManager::with_beans(self.beans, self.config.clone());

        let references = References::new(
            Arc::new(instance_manager),
            Arc::new(proxier),
            Arc::new(self.config),
        );
        info!("引用容器构建完成: {}", references.id());
        Ok(references)
    }
}

impl Default for ReferencesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 初始化日志系统
///
/// 全局订阅者已经存在时返回错误。`RUST_LOG` 优先于配置中的级别。
pub fn initialize_logging(config: &LoggingConfig) -> InfrastructureResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    if config.json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|e| InfrastructureError::BootstrapFailed {
        message: format!("日志初始化失败: {e}"),
    })?;

    info!("日志系统初始化完成");
    Ok(())
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: tracing::Level,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 开发环境：调试级别，显示线程与源码位置
    pub fn development() -> Self {
        Self {
            level: tracing::Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 生产环境：JSON 输出
    pub fn production() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }
}
