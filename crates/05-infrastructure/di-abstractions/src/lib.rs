//! # Contextual Reference Abstractions
//!
//! 上下文引用解析抽象层，定义 bean、作用域、代理和销毁器的核心接口。
//!
//! ## 核心接口
//!
//! - [`BeanCatalog`] - bean 目录接口
//! - [`Assignability`] - 选择器与 bean 的匹配判定
//! - [`Factory`] - bean 实例工厂
//! - [`Scopelet`] - 作用域解析器
//! - [`InstanceManager`] - 沿作用域链获取实例
//! - [`ClientProxier`] - 客户端代理层
//! - [`DestructorTree`] - 分层销毁器注册表

pub mod container;
pub mod destructor;
pub mod factory;
pub mod proxy;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod selector;

pub use container::*;
pub use destructor::*;
pub use factory::*;
pub use proxy::*;
pub use registry::*;
pub use resolver::*;
pub use scope::*;
pub use selector::*;
