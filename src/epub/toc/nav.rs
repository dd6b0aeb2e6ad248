//! EPUB3导航文档的生成与解析

use std::str;

use scraper::{ElementRef, Html};
use tracing::warn;

use crate::epub::book::Book;
use crate::epub::config::WriteOptions;
use crate::epub::error::Result;
use crate::epub::opf::manifest::Item;
use crate::epub::path::{dirname, join, normpath, relpath};
use crate::epub::toc::tree::{Link, Section, TocEntry, TocHeading, TocSection};
use crate::epub::xml::{Element, WriteStyle, XmlDocument};

/// landmarks中 `epub:type` 与guide类型不同的项
fn landmark_type(kind: &str) -> &str {
    match kind {
        "notes" => "rearnotes",
        "text" => "bodymatter",
        other => other,
    }
}

/// 生成导航文档
///
/// # 参数
/// * `book` - 提供语言、标题、目录与guide
/// * `nav_item` - 导航文档条目，链接相对于它所在的目录计算
/// * `options` - 是否生成landmarks及其标题
///
/// # 返回值
/// * `Result<Vec<u8>>` - 缩进格式的XHTML
pub fn render_nav(book: &Book, nav_item: &Item, options: &WriteOptions) -> Result<Vec<u8>> {
    let mut document = XmlDocument::parse(book.get_template("nav").unwrap_or_default().as_bytes())?;
    document.root.set_attr("lang", book.language.as_str());
    document.root.set_attr("xml:lang", book.language.as_str());

    let nav_dir = dirname(&nav_item.file_name);
    let relative = |href: &str| relpath(href, nav_dir);

    let mut head = Element::new("head").with_child(Element::new("title").with_text(book.title.as_str()));
    if let Some(doc) = nav_item.document_info() {
        for link in doc.links.iter().filter(|link| !link.is_script()) {
            head.push(
                Element::new("link")
                    .with_attr("href", link.href.as_str())
                    .with_attr("rel", "stylesheet")
                    .with_attr("type", "text/css"),
            );
        }
    }

    let mut body = Element::new("body");
    let nav = body.push(
        Element::new("nav")
            .with_attr("epub:type", "toc")
            .with_attr("id", "id")
            .with_attr("role", "doc-toc"),
    );
    nav.push(Element::new("h2").with_text(book.title.as_str()));
    nav.push(build_list(book, &book.toc, &relative));

    if !book.guide.is_empty() && options.epub3_landmark {
        let landmarks = body.push(Element::new("nav").with_attr("epub:type", "landmarks"));
        landmarks.push(Element::new("h2").with_text(options.landmark_title.as_str()));
        let list = landmarks.push(Element::new("ol"));

        for entry in &book.guide {
            let (href, title) = match &entry.item {
                Some(item_id) => match book.get_item_with_id(item_id) {
                    Some(item) => (item.file_name.clone(), item.title().to_string()),
                    None => {
                        warn!(id = %item_id, "guide引用了不存在的条目，landmarks中跳过");
                        continue;
                    }
                },
                None => (entry.href.clone(), entry.title.clone()),
            };
            list.push(
                Element::new("li").with_child(
                    Element::new("a")
                        .with_attr("epub:type", landmark_type(&entry.kind))
                        .with_attr("href", relative(&href))
                        .with_text(title),
                ),
            );
        }
    }

    document.root.push(head);
    document.root.push(body);

    document.to_bytes(WriteStyle {
        indent: true,
        html: true,
    })
}

fn build_list(book: &Book, entries: &[TocEntry], relative: &dyn Fn(&str) -> String) -> Element {
    let mut list = Element::new("ol");

    for entry in entries {
        match entry {
            TocEntry::Section(section) => {
                list.push(section_item(book, section, relative));
            }
            TocEntry::Link(link) => {
                list.push(Element::new("li").with_child(anchor(&relative(&link.href), &link.title)));
            }
            TocEntry::Page(item_id) => match book.get_item_with_id(item_id) {
                Some(item) => {
                    list.push(Element::new("li").with_child(anchor(&relative(&item.file_name), item.title())));
                }
                None => warn!(id = %item_id, "目录引用了不存在的条目，已跳过"),
            },
        }
    }

    list
}

/// 分节标题引用的条目不存在时写出空的 `span`，子项照常保留
fn section_item(book: &Book, section: &TocSection, relative: &dyn Fn(&str) -> String) -> Element {
    let heading = match &section.heading {
        TocHeading::Page(item_id) => match book.get_item_with_id(item_id) {
            Some(item) => anchor(&relative(&item.file_name), item.title()),
            None => {
                warn!(id = %item_id, "目录分节引用了不存在的条目");
                Element::new("span")
            }
        },
        TocHeading::Link(link) => anchor(&relative(&link.href), &link.title),
        TocHeading::Section(Section { title, href: Some(href) }) => anchor(&relative(href), title),
        TocHeading::Section(Section { title, href: None }) => Element::new("span").with_text(title.as_str()),
    };

    Element::new("li")
        .with_child(heading)
        .with_child(build_list(book, &section.children, relative))
}

fn anchor(href: &str, title: &str) -> Element {
    Element::new("a").with_attr("href", href).with_text(title)
}

/// 解析导航文档中的 `toc` 导航
///
/// 链接相对于 `nav_file` 所在目录解析为包内路径。找不到目录导航时返回空目录。
pub fn parse_nav(content: &[u8], nav_file: &str) -> Vec<TocEntry> {
    let Ok(text) = str::from_utf8(content) else {
        warn!(file = %nav_file, "导航文档不是UTF-8");
        return Vec::new();
    };
    let document = Html::parse_document(text);
    let base = dirname(nav_file);

    let toc_nav = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "nav")
        .find(|el| el.value().attrs().any(|(_, value)| value == "toc"));

    let Some(nav) = toc_nav else {
        warn!(file = %nav_file, "导航文档中没有toc导航");
        return Vec::new();
    };

    match first_child_named(nav, "ol") {
        Some(list) => parse_list(list, base),
        None => Vec::new(),
    }
}

fn child_elements<'a>(parent: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    parent.children().filter_map(ElementRef::wrap)
}

fn first_child_named<'a>(parent: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    child_elements(parent).find(|el| el.value().name() == name)
}

fn parse_list(list: ElementRef, base: &str) -> Vec<TocEntry> {
    let mut entries = Vec::new();

    for li in child_elements(list).filter(|el| el.value().name() == "li") {
        let sublist = first_child_named(li, "ol");
        let link = first_child_named(li, "a");
        let resolve = |href: &str| normpath(&join(base, href));

        match (sublist, link) {
            (Some(sublist), link) => {
                let title = child_elements(li)
                    .next()
                    .map(element_text)
                    .unwrap_or_default();
                let mut section = Section::new(title);
                if let Some(href) = link.and_then(|a| a.value().attr("href")) {
                    section = section.with_href(resolve(href));
                }
                entries.push(TocEntry::section(
                    TocHeading::Section(section),
                    parse_list(sublist, base),
                ));
            }
            (None, Some(a)) => {
                let href = a.value().attr("href").map(resolve).unwrap_or_default();
                entries.push(TocEntry::Link(Link::new(href, element_text(a))));
            }
            (None, None) => {}
        }
    }

    entries
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}
