//! 脊柱模块
//!
//! 阅读顺序（脊柱）、EPUB2导引（guide）以及 `bindings` 的结构定义。

/// 脊柱项信息(阅读顺序)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineEntry {
    /// 引用的清单项ID
    pub idref: String,
    /// 脊柱项上的线性覆盖，与条目自身的设置共同决定实际线性
    pub linear: bool,
}

impl SpineEntry {
    /// 创建新的脊柱项
    pub fn new(idref: impl Into<String>) -> Self {
        Self {
            idref: idref.into(),
            linear: true,
        }
    }

    /// 创建指定线性属性的脊柱项
    pub fn with_linear(idref: impl Into<String>, linear: bool) -> Self {
        Self {
            idref: idref.into(),
            linear,
        }
    }

    /// 实际线性：条目默认值与脊柱覆盖取与
    pub fn effective_linear(&self, item_linear: bool) -> bool {
        item_linear && self.linear
    }
}

impl From<&str> for SpineEntry {
    fn from(idref: &str) -> Self {
        SpineEntry::new(idref)
    }
}

/// EPUB2导引中的一条引用
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuideEntry {
    /// 引用类型，如 `cover`、`toc`、`text`
    pub kind: String,
    pub title: String,
    pub href: String,
    /// 引用的条目ID；设置后href与标题取自该条目
    pub item: Option<String>,
}

impl GuideEntry {
    pub fn new(kind: impl Into<String>, title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            href: href.into(),
            item: None,
        }
    }

    /// 从条目派生href与标题
    pub fn for_item(kind: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            item: Some(item_id.into()),
            ..Self::default()
        }
    }
}

/// `<bindings>` 中的一条 `mediaType`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub media_type: String,
    pub handler: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_linear() {
        assert!(SpineEntry::new("c1").effective_linear(true));
        assert!(!SpineEntry::new("cover").effective_linear(false));
        assert!(!SpineEntry::with_linear("c1", false).effective_linear(true));
        assert!(!SpineEntry::with_linear("c1", false).effective_linear(false));
    }
}
