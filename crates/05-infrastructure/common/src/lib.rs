//! # Infrastructure Common
//!
//! 这个 crate 提供了 Lorn ADSP 平台基础设施层的公共类型。
//!
//! ## 核心内容
//!
//! - [`ReferenceError`] - 上下文引用解析的错误分类
//! - [`TypeInfo`] - bean 类型元数据
//! - [`ConfigSection`] - 可绑定到具体类型的配置节

pub mod configuration;
pub mod errors;
pub mod metadata;

pub use configuration::*;
pub use errors::*;
pub use metadata::*;
