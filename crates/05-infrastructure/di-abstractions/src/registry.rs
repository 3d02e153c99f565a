//! bean 注册信息与 bean 目录抽象
//!
//! 提供 bean 标识、bean 定义以及按选择器查询 bean 的目录接口

use crate::factory::Factory;
use crate::scope::ScopeId;
use crate::selector::{Qualifier, Selector};
use infrastructure_common::{ReferenceError, ReferenceResult, TypeInfo};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// 实例
///
/// 解析得到的对象，以共享指针的形式在工厂、作用域解析器和调用方之间传递。
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 实例身份
///
/// 以共享分配的地址区分实例：相等但不同的两个实例拥有不同的身份。
/// 持有身份的一方必须同时持有实例，以免地址被复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceIdentity(usize);

impl InstanceIdentity {
    /// 获取共享分配的身份
    ///
    /// 同一分配无论以何种 trait 对象访问，身份都相同。
    pub fn of<T: ?Sized>(shared: &Arc<T>) -> Self {
        Self(Arc::as_ptr(shared).cast::<()>() as usize)
    }
}

impl fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// bean 标识
///
/// 类型、限定符和管理作用域标识的组合，作为精确匹配的键使用。
/// 每个 bean 都携带 `Any` 限定符，未声明限定符的 bean 还携带 `Default`。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id {
    types: Vec<TypeInfo>,
    qualifiers: BTreeSet<Qualifier>,
    governing_scope_id: ScopeId,
}

impl Id {
    /// 创建 bean 标识
    pub fn new(
        types: impl IntoIterator<Item = TypeInfo>,
        qualifiers: impl IntoIterator<Item = Qualifier>,
        governing_scope_id: ScopeId,
    ) -> Self {
        let mut qualifiers: BTreeSet<Qualifier> = qualifiers.into_iter().collect();
        if qualifiers.is_empty() {
            qualifiers.insert(Qualifier::Default);
        }
        qualifiers.insert(Qualifier::Any);
        Self {
            types: types.into_iter().collect(),
            qualifiers,
            governing_scope_id,
        }
    }

    /// 单一类型、默认限定的 bean 标识
    pub fn of<T: ?Sized + 'static>(governing_scope_id: ScopeId) -> Self {
        Self::new([TypeInfo::of::<T>()], std::iter::empty(), governing_scope_id)
    }

    /// bean 类型
    pub fn types(&self) -> &[TypeInfo] {
        &self.types
    }

    /// 限定符集合
    pub fn qualifiers(&self) -> &BTreeSet<Qualifier> {
        &self.qualifiers
    }

    /// 管理该 bean 生命周期的作用域标识
    pub fn governing_scope_id(&self) -> &ScopeId {
        &self.governing_scope_id
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<&str> = self.types.iter().map(TypeInfo::name).collect();
        write!(f, "{}@{}", types.join("+"), self.governing_scope_id)
    }
}

/// bean 定义
///
/// 两个 bean 相等当且仅当标识相等且工厂是同一个对象。
#[derive(Clone)]
pub struct Bean {
    id: Id,
    factory: Arc<dyn Factory>,
}

impl Bean {
    /// 创建 bean
    pub fn new(id: Id, factory: Arc<dyn Factory>) -> Self {
        Self { id, factory }
    }

    /// 以具体工厂创建 bean
    pub fn with_factory<F: Factory + 'static>(id: Id, factory: F) -> Self {
        Self::new(id, Arc::new(factory))
    }

    /// bean 标识
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// bean 工厂
    pub fn factory(&self) -> &Arc<dyn Factory> {
        &self.factory
    }
}

impl PartialEq for Bean {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && std::ptr::eq(
                Arc::as_ptr(&self.factory).cast::<()>(),
                Arc::as_ptr(&other.factory).cast::<()>(),
            )
    }
}

impl Eq for Bean {}

impl fmt::Debug for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bean")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

/// 消歧函数
///
/// 在目录为同一选择器返回两个以上候选时调用，返回唯一的胜出者或错误。
pub type Disambiguator = dyn Fn(&Selector, &[Bean]) -> ReferenceResult<Bean> + Send + Sync;

/// bean 目录
pub trait BeanCatalog: Send + Sync {
    /// 满足选择器的全部 bean
    fn beans(&self, selector: &Selector) -> Vec<Bean>;

    /// 满足选择器的唯一 bean
    ///
    /// 没有候选时返回 `None`，多个候选时交给 `disambiguator` 决定。
    fn bean(
        &self,
        selector: &Selector,
        disambiguator: &Disambiguator,
    ) -> ReferenceResult<Option<Bean>> {
        let mut beans = self.beans(selector);
        match beans.len() {
            0 => Ok(None),
            1 => Ok(beans.pop()),
            _ => disambiguator(selector, &beans).map(Some),
        }
    }

    /// bean 是否满足选择器
    fn selects(&self, selector: &Selector, bean: &Bean) -> bool;
}

/// 构造歧义错误
pub fn ambiguous(selector: &Selector, beans: &[Bean]) -> ReferenceError {
    ReferenceError::Ambiguous {
        selector: selector.to_string(),
        candidates: beans.iter().map(ToString::to_string).collect(),
    }
}

/// 构造未满足错误
pub fn unsatisfied(selector: &Selector) -> ReferenceError {
    ReferenceError::Unsatisfied {
        selector: selector.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::SingletonFactory;

    struct Widget;

    #[test]
    fn test_id_qualifier_normalization() {
        let plain = Id::of::<Widget>(ScopeId::SINGLETON);
        assert!(plain.qualifiers().contains(&Qualifier::Any));
        assert!(plain.qualifiers().contains(&Qualifier::Default));

        let named = Id::new([TypeInfo::of::<Widget>()], [Qualifier::named("x")], ScopeId::NONE);
        assert!(named.qualifiers().contains(&Qualifier::Any));
        assert!(!named.qualifiers().contains(&Qualifier::Default));
    }

    #[test]
    fn test_bean_equality_requires_same_factory() {
        let id = Id::of::<Widget>(ScopeId::SINGLETON);
        let factory: Arc<dyn Factory> = Arc::new(SingletonFactory::new(Arc::new(1_u32)));

        let a = Bean::new(id.clone(), factory.clone());
        let b = Bean::new(id.clone(), factory);
        let c = Bean::with_factory(id, SingletonFactory::new(Arc::new(1_u32)));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_instance_identity_is_per_allocation() {
        let a: Instance = Arc::new(7_u32);
        let b: Instance = Arc::new(7_u32);
        assert_eq!(InstanceIdentity::of(&a), InstanceIdentity::of(&a.clone()));
        assert_ne!(InstanceIdentity::of(&a), InstanceIdentity::of(&b));
    }
}
