//! 元数据定义
//!
//! 提供 bean 类型的元数据信息

use std::borrow::Cow;
use std::fmt;

/// 类型信息
///
/// 以完整类型名标识一个 bean 类型，泛型实参作为名称的一部分参与比较。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeInfo {
    /// 完整类型名称（包含模块路径和泛型实参）
    name: Cow<'static, str>,
}

impl TypeInfo {
    /// 从类型名称创建类型信息
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
        }
    }

    /// 从运行时构造的名称创建类型信息
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
        }
    }

    /// 从类型获取类型信息
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(std::any::type_name::<T>())
    }

    /// 完整类型名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 擦除泛型实参后的名称，例如 `Scopelet<Foo>` 擦除为 `Scopelet`
    pub fn erased_name(&self) -> &str {
        match self.name.find('<') {
            Some(index) => &self.name[..index],
            None => &self.name,
        }
    }

    /// 获取简短的类型名称（不包含模块路径和泛型实参）
    pub fn short_name(&self) -> &str {
        let erased = self.erased_name();
        erased.rsplit("::").next().unwrap_or(erased)
    }

    /// 是否带有泛型实参
    pub fn is_parameterized(&self) -> bool {
        self.name.contains('<')
    }

    /// 以当前类型为原始类型，构造带单个泛型实参的类型信息
    pub fn parameterized(&self, argument: &str) -> Self {
        Self::named(format!("{}<{}>", self.erased_name(), argument))
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
