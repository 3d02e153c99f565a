//! 错误类型定义

use thiserror::Error;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置解析失败: {source}")]
    ParseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },

    #[error("配置序列化失败: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },
}

/// 上下文引用解析错误类型
///
/// 所有变体在引擎层面都不可恢复，直接传播给 `reference` / `instance` 的调用方。
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("未满足的解析: 选择器 {selector} 没有匹配的 bean")]
    Unsatisfied { selector: String },

    #[error("歧义解析: 选择器 {selector} 无法在候选 {candidates:?} 中确定唯一 bean")]
    Ambiguous {
        selector: String,
        candidates: Vec<String>,
    },

    #[error("作用域 {scope_id} 同时存在多个活动的作用域解析器: {first}, {second}")]
    TooManyActiveScopelets {
        scope_id: String,
        first: String,
        second: String,
    },

    #[error("非法参数: {message}")]
    InvalidArgument { message: String },

    #[error("当前代理策略不支持生成客户端代理: {type_name}")]
    ProxyUnsupported { type_name: String },

    #[error("实例化失败: {type_name}, 原因: {source}")]
    InstantiationFailed {
        type_name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("作用域链配置错误: {message}")]
    Configuration { message: String },

    #[error("循环依赖检测到: {dependency_chain}")]
    CircularDependency { dependency_chain: String },

    #[error("作用域未激活: {scope_id}")]
    InactiveScope { scope_id: String },

    #[error("类型转换失败: 期望 {expected}")]
    TypeMismatch { expected: String },

    #[error("销毁器树已关闭")]
    Closed,

    #[error("非法状态: {message}")]
    IllegalState { message: String },

    #[error("销毁失败: {primary} (另有 {} 个被抑制的错误)", .suppressed.len())]
    DestructionFailed {
        primary: Box<ReferenceError>,
        suppressed: Vec<ReferenceError>,
    },
}

impl ReferenceError {
    /// 创建非法参数错误
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// 创建作用域链配置错误
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// 创建非法状态错误
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// 包装底层构造错误
    pub fn instantiation_failed(
        type_name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::InstantiationFailed {
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// 将一组失败聚合为单个错误，第一个为主错误，其余为被抑制的错误
    ///
    /// 列表为空时返回 `None`。
    pub fn aggregate(mut errors: Vec<ReferenceError>) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        let primary = errors.remove(0);
        Some(Self::DestructionFailed {
            primary: Box::new(primary),
            suppressed: errors,
        })
    }

    /// 被抑制的错误，非聚合错误返回空切片
    pub fn suppressed(&self) -> &[ReferenceError] {
        match self {
            Self::DestructionFailed { suppressed, .. } => suppressed,
            _ => &[],
        }
    }
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("引用解析错误: {source}")]
    ReferenceError {
        #[from]
        source: ReferenceError,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },

    #[error("基础设施关闭失败: {message}")]
    ShutdownFailed { message: String },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type ReferenceResult<T> = Result<T, ReferenceError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;
