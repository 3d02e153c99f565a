//! # 上下文引用解析实现
//!
//! 提供 bean 目录、作用域解析器、实例管理器、客户端代理层、销毁器树和引用请求的具体实现。
//!
//! ## 解析流程
//!
//! 1. [`Request`] 通过实例管理器选出唯一 bean
//! 2. bean 的管理作用域是常规作用域时，由 [`DefaultClientProxier`] 交出客户端代理
//! 3. 否则 [`DefaultInstanceManager`] 沿作用域链找到管理该 bean 的作用域解析器并取得实例
//! 4. 每个依赖在销毁器树上拥有自己的子节点，请求关闭时逐层销毁

pub mod catalog;
pub mod destructor_tree;
pub mod instance_manager;
pub mod proxier;
pub mod request;
pub mod scopelet;

pub use catalog::DefaultBeanCatalog;
pub use destructor_tree::DefaultDestructorTree;
pub use instance_manager::{disambiguate, DefaultInstanceManager};
pub use proxier::{
    proxy_strategy, DefaultClientProxier, ForwardingClientProxy, ForwardingProxyStrategy,
    GeneratingProxyStrategy, UnsupportedProxyStrategy,
};
pub use request::{ReferenceIter, Request};
pub use scopelet::{ContextualScopelet, InstanceStore, NoneScopelet, SingletonScopelet};
