//! # 引用容器组合层
//!
//! 将 bean 目录、作用域解析器、实例管理器和客户端代理层组装成一个可用的引用容器。
//!
//! ## 主要功能
//!
//! - **容器构建器**: 使用构建者模式收集 bean、作用域和配置
//! - **配置源**: 从文件加载引用解析配置，支持环境变量覆盖
//! - **日志初始化**: 可选地安装 `tracing` 订阅者
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use di_abstractions::{Bean, Id, ScopeId, Selector, SingletonFactory};
//! use infrastructure_composition::{LoggingConfig, References};
//! use std::sync::Arc;
//!
//! struct Clock;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let references = References::builder()
//!         .bean(Bean::with_factory(
//!             Id::of::<Clock>(ScopeId::SINGLETON),
//!             SingletonFactory::new(Arc::new(Clock)),
//!         ))
//!         .with_logging(LoggingConfig::development())
//!         .build()?;
//!
//!     let request = references.request()?;
//!     let _clock = request.reference_as::<Clock>(&Selector::of::<Clock>())?;
//!     request.close()?;
//!
//!     references.close()?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config_sources;
pub mod references;

// 重新导出主要类型
pub use builder::{initialize_logging, LoggingConfig, ReferencesBuilder};
pub use config_sources::{load_reference_config, DEFAULT_ENV_PREFIX};
pub use references::{References, ReferencesStatus};

// 重新导出错误类型
pub use infrastructure_common::InfrastructureError;
