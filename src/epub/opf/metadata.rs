//! 元数据处理模块
//!
//! 按命名空间组织的多值元数据存储：命名空间 → 名称 → 有序的（值, 属性）列表。
//! 命名空间既可以是完整URI，也可以是 `DC`、`OPF` 等内置别名。

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;

use crate::epub::error::{EpubError, Result};

pub const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";
pub const NS_EPUB: &str = "http://www.idpf.org/2007/ops";
pub const NS_DAISY: &str = "http://www.daisy.org/z3986/2005/ncx/";
pub const NS_OPF: &str = "http://www.idpf.org/2007/opf";
pub const NS_CONTAINER: &str = "urn:oasis:names:tc:opendocument:xmlns:container";
pub const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
pub const NS_XHTML: &str = "http://www.w3.org/1999/xhtml";

/// 命名空间别名表
static NAMESPACE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("XML", NS_XML),
        ("EPUB", NS_EPUB),
        ("DAISY", NS_DAISY),
        ("OPF", NS_OPF),
        ("CONTAINERNS", NS_CONTAINER),
        ("DC", NS_DC),
        ("XHTML", NS_XHTML),
    ])
});

/// 将别名解析为命名空间URI，非别名原样返回
pub fn resolve_namespace(namespace: Option<&str>) -> Option<String> {
    namespace.map(|ns| NAMESPACE_ALIASES.get(ns).copied().unwrap_or(ns).to_string())
}

/// 单条元数据
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataEntry {
    /// 元素文本
    pub value: String,
    /// 元素属性（带命名空间的属性名使用 `{uri}local` 形式）
    pub attributes: BTreeMap<String, String>,
}

impl MetadataEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
struct NamespaceBlock {
    namespace: Option<String>,
    names: Vec<(String, Vec<MetadataEntry>)>,
}

/// 创建者信息(作者、编辑者等)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    /// 创建者姓名
    pub name: String,
    /// 元素ID（用于关联refines元数据）
    pub id: Option<String>,
    /// 角色(如aut、edt等)
    pub role: Option<String>,
    /// 排序用名称
    pub file_as: Option<String>,
}

/// OPF文件中的元数据信息
///
/// 命名空间和名称都保持插入顺序，写出OPF时按同样的顺序输出。
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    blocks: Vec<NamespaceBlock>,
}

impl Metadata {
    /// 创建空的元数据存储
    pub fn new() -> Self {
        Self::default()
    }

    fn block_mut(&mut self, namespace: Option<String>) -> &mut NamespaceBlock {
        let index = match self.blocks.iter().position(|b| b.namespace == namespace) {
            Some(index) => index,
            None => {
                self.blocks.push(NamespaceBlock {
                    namespace,
                    names: Vec::new(),
                });
                self.blocks.len() - 1
            }
        };
        &mut self.blocks[index]
    }

    fn slot_mut(&mut self, namespace: Option<&str>, name: &str) -> &mut Vec<MetadataEntry> {
        let block = self.block_mut(resolve_namespace(namespace));
        let index = match block.names.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                block.names.push((name.to_string(), Vec::new()));
                block.names.len() - 1
            }
        };
        &mut block.names[index].1
    }

    /// 追加一条元数据
    ///
    /// # 参数
    /// * `namespace` - 命名空间URI或别名，`None` 表示无命名空间
    /// * `name` - 元素名称
    /// * `entry` - 值与属性
    pub fn add(&mut self, namespace: Option<&str>, name: &str, entry: MetadataEntry) {
        self.slot_mut(namespace, name).push(entry);
    }

    /// 用单条元数据替换该键下的全部条目
    pub fn set_unique(&mut self, namespace: Option<&str>, name: &str, entry: MetadataEntry) {
        let slot = self.slot_mut(namespace, name);
        slot.clear();
        slot.push(entry);
    }

    /// 获取某个键下的全部条目
    ///
    /// # 返回值
    /// * `Result<&[MetadataEntry]>` - 键不存在或没有条目时返回 `NotFound`
    pub fn get(&self, namespace: Option<&str>, name: &str) -> Result<&[MetadataEntry]> {
        let entries = self.entries(namespace, name);
        if entries.is_empty() {
            let ns = resolve_namespace(namespace).unwrap_or_default();
            return Err(EpubError::NotFound(format!("元数据 {{{}}}{}", ns, name)));
        }
        Ok(entries)
    }

    /// 获取某个键下的全部条目，不存在时返回空切片
    pub fn entries(&self, namespace: Option<&str>, name: &str) -> &[MetadataEntry] {
        let namespace = resolve_namespace(namespace);
        self.blocks
            .iter()
            .find(|b| b.namespace == namespace)
            .and_then(|b| b.names.iter().find(|(n, _)| n == name))
            .map(|(_, entries)| entries.as_slice())
            .unwrap_or(&[])
    }

    /// 第一条的值
    pub fn first_value(&self, namespace: Option<&str>, name: &str) -> Option<&str> {
        self.entries(namespace, name).first().map(|e| e.value.as_str())
    }

    /// 删除某个键，返回被删除的条目
    pub fn remove(&mut self, namespace: Option<&str>, name: &str) -> Vec<MetadataEntry> {
        let namespace = resolve_namespace(namespace);
        let Some(block) = self.blocks.iter_mut().find(|b| b.namespace == namespace) else {
            return Vec::new();
        };
        match block.names.iter().position(|(n, _)| n == name) {
            Some(index) => block.names.remove(index).1,
            None => Vec::new(),
        }
    }

    /// 按插入顺序遍历全部 (命名空间, 名称, 条目)
    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &str, &[MetadataEntry])> {
        self.blocks.iter().flat_map(|block| {
            block
                .names
                .iter()
                .map(move |(name, entries)| (block.namespace.as_deref(), name.as_str(), entries.as_slice()))
        })
    }

    /// 出现过的命名空间
    pub fn namespaces(&self) -> impl Iterator<Item = Option<&str>> {
        self.blocks.iter().map(|b| b.namespace.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, _, entries)| entries.is_empty())
    }

    /// 条目总数
    pub fn len(&self) -> usize {
        self.iter().map(|(_, _, entries)| entries.len()).sum()
    }

    /// 获取标题
    pub fn title(&self) -> Option<&str> {
        self.first_value(Some("DC"), "title")
    }

    /// 获取语言
    pub fn language(&self) -> Option<&str> {
        self.first_value(Some("DC"), "language")
    }

    /// 获取所有创建者，并关联 `refines` 指向它们的 `role` 与 `file-as`
    pub fn creators(&self) -> Vec<Creator> {
        self.entries(Some("DC"), "creator")
            .iter()
            .map(|entry| {
                let id = entry.attr("id").map(str::to_string);
                let refined = |property: &str| {
                    id.as_deref().and_then(|id| self.refinement(id, property))
                };
                Creator {
                    name: entry.value.clone(),
                    role: refined("role").or_else(|| {
                        entry.attr(&format!("{{{}}}role", NS_OPF)).map(str::to_string)
                    }),
                    file_as: refined("file-as").or_else(|| {
                        entry.attr(&format!("{{{}}}file-as", NS_OPF)).map(str::to_string)
                    }),
                    id,
                }
            })
            .collect()
    }

    /// 查找 `<meta refines="#id" property="...">` 的值
    pub fn refinement(&self, id: &str, property: &str) -> Option<String> {
        let target = format!("#{}", id);
        self.iter()
            .filter(|(ns, _, _)| ns.is_none() || *ns == Some(NS_OPF))
            .flat_map(|(_, _, entries)| entries.iter())
            .find(|e| e.attr("refines") == Some(target.as_str()) && e.attr("property") == Some(property))
            .map(|e| e.value.clone())
    }

    /// 获取 `<meta name="..." content="..."/>` 形式的值
    pub fn meta_content(&self, name: &str) -> Option<&str> {
        self.iter()
            .filter(|(ns, _, _)| ns.is_none() || *ns == Some(NS_OPF))
            .flat_map(|(_, _, entries)| entries.iter())
            .find(|e| e.attr("name") == Some(name))
            .and_then(|e| e.attr("content"))
    }
}
