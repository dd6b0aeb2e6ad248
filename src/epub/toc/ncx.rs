//! NCX导航控制文件的生成与解析

use tracing::warn;

use crate::epub::book::Book;
use crate::epub::error::Result;
use crate::epub::path::{join, normpath};
use crate::epub::toc::tree::{Link, Section, TocEntry, TocHeading, TocSection};
use crate::epub::xml::{Element, Node, WriteStyle, XmlDocument};

/// 生成 `toc.ncx` 的内容
///
/// # 参数
/// * `book` - 提供标识符、标题和目录
///
/// # 返回值
/// * `Result<Vec<u8>>` - 序列化后的NCX文档
pub fn render_ncx(book: &Book) -> Result<Vec<u8>> {
    let mut document = XmlDocument::parse(book.get_template("ncx").unwrap_or_default().as_bytes())?;

    let meta = |name: &str, content: &str| {
        Element::new("meta")
            .with_attr("content", content)
            .with_attr("name", name)
    };
    let head = Element::new("head")
        .with_child(meta("dtb:uid", &book.identifier))
        .with_child(meta("dtb:depth", "0"))
        .with_child(meta("dtb:totalPageCount", "0"))
        .with_child(meta("dtb:maxPageNumber", "0"));
    document.root.push(head);

    document
        .root
        .push(Element::new("docTitle").with_child(Element::new("text").with_text(book.title.as_str())));

    let mut builder = NavPointBuilder {
        book,
        section_counter: 0,
        link_counter: 0,
    };
    let (points, _) = builder.build(&book.toc);

    let nav_map = document.root.push(Element::new("navMap"));
    nav_map.children = points.into_iter().map(Node::Element).collect();

    document.to_bytes(WriteStyle {
        indent: true,
        html: false,
    })
}

struct NavPointBuilder<'a> {
    book: &'a Book,
    /// 无id的分节使用 `sep_<n>`
    section_counter: usize,
    /// 无uid的链接使用 `navpoint_<n>`
    link_counter: usize,
}

impl NavPointBuilder<'_> {
    /// 生成同一层的navPoint
    ///
    /// 第二个返回值是该层第一个叶子项的href，调用方用它补全自身为空的 `content/@src`。
    fn build(&mut self, entries: &[TocEntry]) -> (Vec<Element>, Option<String>) {
        let mut points = Vec::new();
        let mut first_leaf: Option<String> = None;

        for entry in entries {
            match entry {
                TocEntry::Section(section) => points.push(self.section_point(section)),
                TocEntry::Link(link) => {
                    let id = match &link.uid {
                        Some(uid) if !uid.is_empty() => uid.clone(),
                        _ => {
                            let id = format!("navpoint_{}", self.link_counter);
                            self.link_counter += 1;
                            id
                        }
                    };
                    first_leaf.get_or_insert_with(|| link.href.clone());
                    points.push(nav_point(&id, &link.title, &link.href));
                }
                TocEntry::Page(item_id) => match self.book.get_item_with_id(item_id) {
                    Some(item) => {
                        first_leaf.get_or_insert_with(|| item.file_name.clone());
                        points.push(nav_point(&item.id, item.title(), &item.file_name));
                    }
                    None => warn!(id = %item_id, "目录引用了不存在的条目，已跳过"),
                },
            }
        }

        (points, first_leaf)
    }

    fn section_point(&mut self, section: &TocSection) -> Element {
        let sep_id = format!("sep_{}", self.section_counter);
        self.section_counter += 1;

        let (id, title, href) = match &section.heading {
            TocHeading::Page(item_id) => match self.book.get_item_with_id(item_id) {
                Some(item) => (item.id.clone(), item.title().to_string(), item.file_name.clone()),
                None => {
                    warn!(id = %item_id, "目录分节引用了不存在的条目");
                    (sep_id, String::new(), String::new())
                }
            },
            TocHeading::Section(Section { title, href }) => {
                (sep_id, title.clone(), href.clone().unwrap_or_default())
            }
            TocHeading::Link(Link { href, title, .. }) => (sep_id, title.clone(), href.clone()),
        };

        let (children, first_leaf) = self.build(&section.children);
        let src = match first_leaf {
            Some(leaf) if href.is_empty() => leaf,
            _ => href,
        };

        let mut point = nav_point(&id, &title, &src);
        point.children.extend(children.into_iter().map(Node::Element));
        point
    }
}

fn nav_point(id: &str, title: &str, src: &str) -> Element {
    Element::new("navPoint")
        .with_attr("id", id)
        .with_child(Element::new("navLabel").with_child(Element::new("text").with_text(title)))
        .with_child(Element::new("content").with_attr("src", src))
}

/// 解析NCX中的navMap
///
/// 有子项的navPoint成为分节，其余成为链接。`base_dir` 为NCX文件所在目录
/// （相对于包目录），非空时href会据此解析。
pub fn parse_ncx(content: &[u8], base_dir: &str) -> Result<Vec<TocEntry>> {
    let document = XmlDocument::parse(content)?;
    let Some(nav_map) = document.root.child("navMap") else {
        warn!("NCX中没有navMap");
        return Ok(Vec::new());
    };
    Ok(parse_points(nav_map, base_dir))
}

fn parse_points(parent: &Element, base_dir: &str) -> Vec<TocEntry> {
    parent
        .children_named("navPoint")
        .map(|point| {
            let label = point
                .child("navLabel")
                .and_then(|label| label.elements().next())
                .map(|text| text.text())
                .unwrap_or_default();
            let src = point
                .child("content")
                .and_then(|content| content.attr("src"))
                .map(|src| resolve(base_dir, src))
                .unwrap_or_default();
            let children = parse_points(point, base_dir);

            if children.is_empty() {
                let mut link = Link::new(src, label);
                link.uid = point.attr("id").filter(|id| !id.is_empty()).map(str::to_string);
                TocEntry::Link(link)
            } else {
                TocEntry::section(TocHeading::Section(Section::new(label).with_href(src)), children)
            }
        })
        .collect()
}

fn resolve(base_dir: &str, src: &str) -> String {
    if base_dir.is_empty() || src.is_empty() {
        src.to_string()
    } else {
        normpath(&join(base_dir, src))
    }
}
