//! 目录树（Table of Contents Tree）模块
//!
//! [`TocEntry`] 是书籍模型中的目录结构；[`TocTree`] 是它的展示视图，
//! 用于在终端中以树状或缩进风格打印目录。

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::epub::book::Book;

/// 带标题的链接
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub title: String,
    /// NCX中navPoint的id
    pub uid: Option<String>,
}

impl Link {
    pub fn new(href: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            title: title.into(),
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }
}

/// 分节标题，href可以缺省
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub href: Option<String>,
}

impl Section {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: None,
        }
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        let href = href.into();
        self.href = if href.is_empty() { None } else { Some(href) };
        self
    }
}

/// 分节的标题部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TocHeading {
    Section(Section),
    Link(Link),
    /// 引用书中的文档条目ID
    Page(String),
}

/// 带子项的分节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocSection {
    pub heading: TocHeading,
    pub children: Vec<TocEntry>,
}

/// 目录中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TocEntry {
    Link(Link),
    /// 引用书中的文档条目ID
    Page(String),
    Section(TocSection),
}

impl TocEntry {
    pub fn link(href: impl Into<String>, title: impl Into<String>) -> Self {
        TocEntry::Link(Link::new(href, title))
    }

    pub fn page(item_id: impl Into<String>) -> Self {
        TocEntry::Page(item_id.into())
    }

    pub fn section(heading: TocHeading, children: Vec<TocEntry>) -> Self {
        TocEntry::Section(TocSection { heading, children })
    }

    /// 以 [`Section`] 为标题的分节
    pub fn titled_section(title: impl Into<String>, href: Option<&str>, children: Vec<TocEntry>) -> Self {
        let mut section = Section::new(title);
        if let Some(href) = href {
            section = section.with_href(href);
        }
        Self::section(TocHeading::Section(section), children)
    }
}

/// 目录树显示样式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TocTreeStyle {
    /// 使用树状符号（├── └──）
    TreeSymbols,
    /// 使用缩进和符号（• ）
    Indented,
}

/// 目录树节点
#[derive(Debug, Clone)]
pub struct TocTreeNode {
    /// 文档顺序中的序号，从1开始
    pub order: u32,
    pub title: String,
    /// 目标路径，没有时为空
    pub href: String,
    pub children: Vec<TocTreeNode>,
    pub depth: u32,
}

impl TocTreeNode {
    /// 获取节点的最大深度
    pub fn get_max_depth(&self) -> u32 {
        self.children
            .iter()
            .map(TocTreeNode::get_max_depth)
            .fold(self.depth, u32::max)
    }

    /// 获取节点及其所有子节点的数量
    pub fn get_total_nodes(&self) -> usize {
        1 + self.children.iter().map(TocTreeNode::get_total_nodes).sum::<usize>()
    }

    /// 叶子节点数量
    pub fn get_leaf_count(&self) -> usize {
        if self.children.is_empty() {
            1
        } else {
            self.children.iter().map(TocTreeNode::get_leaf_count).sum()
        }
    }

    /// 根据路径查找节点
    pub fn find_by_href(&self, href: &str) -> Option<&TocTreeNode> {
        if self.href == href {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_by_href(href))
    }
}

/// 目录树
#[derive(Debug, Clone)]
pub struct TocTree {
    pub title: Option<String>,
    pub roots: Vec<TocTreeNode>,
    pub style: TocTreeStyle,
    pub show_paths: bool,
    pub max_depth: Option<u32>,
}

impl TocTree {
    pub fn new() -> Self {
        Self {
            title: None,
            roots: Vec::new(),
            style: TocTreeStyle::TreeSymbols,
            show_paths: false,
            max_depth: None,
        }
    }

    /// 从书籍的目录构建展示树；引用了不存在条目的项被跳过
    pub fn from_book(book: &Book) -> Self {
        let mut tree = Self::new();
        tree.title = if book.title.is_empty() {
            None
        } else {
            Some(book.title.clone())
        };

        let mut order = 0;
        tree.roots = convert_entries(book, &book.toc, 0, &mut order);
        tree
    }

    pub fn with_style(mut self, style: TocTreeStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_show_paths(mut self, show_paths: bool) -> Self {
        self.show_paths = show_paths;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<u32>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 统计信息
    pub fn get_statistics(&self) -> TocStatistics {
        TocStatistics {
            total_nodes: self.roots.iter().map(TocTreeNode::get_total_nodes).sum(),
            max_depth: self
                .roots
                .iter()
                .map(TocTreeNode::get_max_depth)
                .max()
                .map(|d| d + 1)
                .unwrap_or(0),
            leaf_count: self.roots.iter().map(TocTreeNode::get_leaf_count).sum(),
            root_count: self.roots.len(),
        }
    }

    pub fn find_by_href(&self, href: &str) -> Option<&TocTreeNode> {
        self.roots.iter().find_map(|root| root.find_by_href(href))
    }

    fn render_node(&self, node: &TocTreeNode, is_last: bool, prefix: &str, result: &mut String) {
        if let Some(max_depth) = self.max_depth {
            if node.depth >= max_depth {
                return;
            }
        }

        let content = if self.show_paths && !node.href.is_empty() {
            format!("[{}] {} → {}", node.order, node.title, node.href)
        } else {
            format!("[{}] {}", node.order, node.title)
        };

        let child_prefix = match self.style {
            TocTreeStyle::TreeSymbols => {
                let marker = if is_last { "└── " } else { "├── " };
                result.push_str(&format!("{}{}{}\n", prefix, marker, content));
                format!("{}{}", prefix, if is_last { "    " } else { "│   " })
            }
            TocTreeStyle::Indented => {
                let indent = "  ".repeat(node.depth as usize);
                result.push_str(&format!("{}• {}\n", indent, content));
                String::new()
            }
        };

        for (index, child) in node.children.iter().enumerate() {
            self.render_node(child, index == node.children.len() - 1, &child_prefix, result);
        }
    }
}

impl Default for TocTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TocTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut result = String::new();

        if let Some(ref title) = self.title {
            let depth_info = match self.max_depth {
                Some(max_depth) => format!(" (深度限制: {})", max_depth),
                None => String::new(),
            };
            result.push_str(&format!("📖 {}{}\n", title, depth_info));
            result.push_str("═══════════════════════════════════════\n\n");
        }

        for (index, root) in self.roots.iter().enumerate() {
            self.render_node(root, index == self.roots.len() - 1, "", &mut result);
        }

        write!(f, "{}", result)
    }
}

/// 目录树统计信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocStatistics {
    pub total_nodes: usize,
    pub max_depth: u32,
    pub leaf_count: usize,
    pub root_count: usize,
}

impl Display for TocStatistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "目录统计: {} 个条目, {} 个根节点, {} 个叶子节点, 最大深度: {}",
            self.total_nodes, self.root_count, self.leaf_count, self.max_depth
        )
    }
}

fn convert_entries(book: &Book, entries: &[TocEntry], depth: u32, order: &mut u32) -> Vec<TocTreeNode> {
    let leaf: &[TocEntry] = &[];
    let mut nodes = Vec::new();

    for entry in entries {
        let (title, href, children) = match entry {
            TocEntry::Link(link) => (link.title.clone(), link.href.clone(), leaf),
            TocEntry::Page(id) => match book.get_item_with_id(id) {
                Some(item) => (item.title().to_string(), item.file_name.clone(), leaf),
                None => continue,
            },
            TocEntry::Section(section) => {
                let (title, href) = match &section.heading {
                    TocHeading::Section(s) => (s.title.clone(), s.href.clone().unwrap_or_default()),
                    TocHeading::Link(link) => (link.title.clone(), link.href.clone()),
                    TocHeading::Page(id) => match book.get_item_with_id(id) {
                        Some(item) => (item.title().to_string(), item.file_name.clone()),
                        None => continue,
                    },
                };
                (title, href, section.children.as_slice())
            }
        };

        *order += 1;
        let mut node = TocTreeNode {
            order: *order,
            title,
            href,
            children: Vec::new(),
            depth,
        };
        node.children = convert_entries(book, children, depth + 1, order);
        nodes.push(node);
    }

    nodes
}
