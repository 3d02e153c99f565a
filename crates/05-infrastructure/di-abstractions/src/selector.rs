//! 选择器与匹配判定

use crate::registry::Id;
use crate::scope::ScopeId;
use infrastructure_common::TypeInfo;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

/// 限定符
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Qualifier {
    /// 每个 bean 都携带的限定符
    Any,
    /// 未声明限定符的 bean 携带的默认限定符
    Default,
    /// 命名限定符
    Named(Cow<'static, str>),
    /// 作用域解析器所管理的作用域
    Scope(ScopeId),
}

impl Qualifier {
    /// 创建命名限定符
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("@Any"),
            Self::Default => f.write_str("@Default"),
            Self::Named(name) => write!(f, "@Named({name})"),
            Self::Scope(id) => write!(f, "@Scope({id})"),
        }
    }
}

/// 选择器
///
/// 由请求的类型、限定符集合和通配标志组成的不可变值，按结构比较。
/// 限定符集合为空时等价于 `{Default}`。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    types: Vec<TypeInfo>,
    qualifiers: BTreeSet<Qualifier>,
    wildcard: bool,
}

impl Selector {
    /// 创建选择器
    pub fn new(
        types: impl IntoIterator<Item = TypeInfo>,
        qualifiers: impl IntoIterator<Item = Qualifier>,
        wildcard: bool,
    ) -> Self {
        let mut qualifiers: BTreeSet<Qualifier> = qualifiers.into_iter().collect();
        if qualifiers.is_empty() {
            qualifiers.insert(Qualifier::Default);
        }
        Self {
            types: types.into_iter().collect(),
            qualifiers,
            wildcard,
        }
    }

    /// 按类型选择默认限定的 bean
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new([TypeInfo::of::<T>()], std::iter::empty(), false)
    }

    /// 按类型和名称选择 bean
    pub fn named<T: ?Sized + 'static>(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new([TypeInfo::of::<T>()], [Qualifier::named(name)], false)
    }

    /// 按类型选择任意限定的 bean
    pub fn any<T: ?Sized + 'static>() -> Self {
        Self::new([TypeInfo::of::<T>()], [Qualifier::Any], false)
    }

    /// 替换限定符集合
    pub fn with_qualifiers(self, qualifiers: impl IntoIterator<Item = Qualifier>) -> Self {
        Self::new(self.types, qualifiers, self.wildcard)
    }

    /// 改为按擦除后的类型名匹配
    pub fn wildcard(mut self) -> Self {
        self.wildcard = true;
        self
    }

    /// 请求的类型
    pub fn types(&self) -> &[TypeInfo] {
        &self.types
    }

    /// 限定符集合
    pub fn qualifiers(&self) -> &BTreeSet<Qualifier> {
        &self.qualifiers
    }

    /// 是否为通配匹配
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<&str> = self.types.iter().map(TypeInfo::name).collect();
        let qualifiers: Vec<String> = self.qualifiers.iter().map(ToString::to_string).collect();
        write!(f, "[{}] {}", types.join(", "), qualifiers.join(" "))?;
        if self.wildcard {
            f.write_str(" (wildcard)")?;
        }
        Ok(())
    }
}

/// 匹配判定
///
/// 判断一个 bean 标识是否满足选择器，引擎将其视为不透明的谓词。
pub trait Assignability: Send + Sync {
    /// 标识是否满足选择器
    fn selects(&self, selector: &Selector, id: &Id) -> bool;
}

/// 默认匹配判定
///
/// 选择器的每个类型都必须出现在标识中：精确匹配，或在通配模式下按擦除后的名称匹配。
/// 选择器的限定符必须是标识限定符的子集。
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAssignability;

impl Assignability for DefaultAssignability {
    fn selects(&self, selector: &Selector, id: &Id) -> bool {
        let types_match = selector.types().iter().all(|wanted| {
            id.types().iter().any(|candidate| {
                if selector.is_wildcard() {
                    candidate.erased_name() == wanted.erased_name()
                } else {
                    candidate == wanted
                }
            })
        });
        types_match && selector.qualifiers().is_subset(id.qualifiers())
    }
}
