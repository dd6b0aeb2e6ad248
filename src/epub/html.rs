//! XHTML文档内容生成
//!
//! 文档条目保存的是原始标记；写出时以 `chapter` 模板为骨架，补上语言、标题、
//! 样式表链接，再把原始内容 `<body>` 中的节点搬进来。原始内容使用scraper
//! 按HTML宽松解析，因此不完整的片段也能处理。

use std::str;

use scraper::{ElementRef, Html};
use tracing::warn;

use crate::epub::book::Book;
use crate::epub::error::Result;
use crate::epub::opf::manifest::{Item, ItemKind};
use crate::epub::xml::{fragment_to_bytes, Element, Node, WriteStyle, XmlDocument};

const HTML_STYLE: WriteStyle = WriteStyle {
    indent: false,
    html: true,
};

/// 解析原始内容并取出 `<body>` 的子节点
///
/// # 返回值
/// * `Option<Vec<Node>>` - 内容为空或不是UTF-8时返回 `None`
pub fn body_nodes(content: &[u8]) -> Option<Vec<Node>> {
    if content.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    let text = str::from_utf8(content).ok()?;
    let document = Html::parse_document(text);

    let body = document
        .root_element()
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "body")?;

    let mut nodes = convert_children(body);
    trim_trailing_whitespace(&mut nodes);
    Some(nodes)
}

/// 去掉正文末尾的空白；`</html>` 之后的换行会被宽松解析归入 `<body>`
fn trim_trailing_whitespace(nodes: &mut Vec<Node>) {
    while let Some(Node::Text(text)) = nodes.last_mut() {
        let trimmed = text.trim_end().len();
        if trimmed > 0 {
            text.truncate(trimmed);
            break;
        }
        nodes.pop();
    }
}

fn convert_children(parent: ElementRef) -> Vec<Node> {
    parent
        .children()
        .filter_map(|child| match child.value() {
            scraper::node::Node::Text(text) => {
                let text: &str = text;
                Some(Node::Text(text.to_string()))
            }
            scraper::node::Node::Element(_) => ElementRef::wrap(child).map(|el| Node::Element(convert_element(el))),
            _ => None,
        })
        .collect()
}

fn convert_element(source: ElementRef) -> Element {
    let mut element = Element::new(source.value().name());
    // SVG/MathML中的 `xlink:href`、`xml:lang`、`xmlns:*` 需要保留前缀
    for (name, value) in source.value().attrs.iter() {
        let key = match &name.prefix {
            Some(prefix) => format!("{}:{}", prefix, name.local),
            None => name.local.to_string(),
        };
        element.attributes.push((key, value.to_string()));
    }
    element.children = convert_children(source);
    element
}

/// `<body>` 内部的标记，无法解析时为空
pub fn body_content(content: &[u8]) -> Result<Vec<u8>> {
    match body_nodes(content) {
        Some(nodes) => fragment_to_bytes(&nodes, HTML_STYLE),
        None => Ok(Vec::new()),
    }
}

/// 生成文档条目写入压缩包的完整内容
///
/// 非文档条目原样返回其内容。原始内容无法解析时返回空内容并记录警告。
///
/// # 参数
/// * `book` - 提供语言、模板等全书信息
/// * `item` - 要生成的条目
pub fn render_document(book: &Book, item: &Item) -> Result<Vec<u8>> {
    let (document, source, cover_image) = match &item.kind {
        ItemKind::Document(doc) | ItemKind::Nav(doc) => (doc, item.content.as_slice(), None),
        ItemKind::CoverPage { document, image_name } => (
            document,
            book.get_template("cover").unwrap_or_default().as_bytes(),
            Some(image_name.as_str()),
        ),
        _ => return Ok(item.content.clone()),
    };

    let Some(nodes) = body_nodes(source) else {
        warn!(id = %item.id, file = %item.file_name, "文档内容为空或无法解析，写出空内容");
        return Ok(Vec::new());
    };

    let mut page = XmlDocument::parse(book.get_template("chapter").unwrap_or_default().as_bytes())?;
    let lang = document.lang.as_deref().unwrap_or(&book.language).to_string();
    page.root.set_attr("lang", lang.as_str());
    page.root.set_attr("xml:lang", lang.as_str());

    let mut head = Element::new("head");
    if !document.title.is_empty() {
        head.push(Element::new("title").with_text(document.title.as_str()));
    }
    for link in &document.links {
        if link.is_script() {
            head.push(
                Element::new("script")
                    .with_attr("src", link.href.as_str())
                    .with_attr("type", "text/javascript"),
            );
        } else {
            let mut el = Element::new("link").with_attr("href", link.href.as_str());
            if let Some(rel) = &link.rel {
                el.set_attr("rel", rel.as_str());
            }
            if let Some(media_type) = &link.media_type {
                el.set_attr("type", media_type.as_str());
            }
            head.push(el);
        }
    }

    let mut body = Element::new("body");
    if let Some(direction) = &document.direction {
        body.set_attr("dir", direction.as_str());
    }
    body.children = nodes;

    page.root.push(head);
    page.root.push(body);

    if let Some(image_name) = cover_image {
        if let Some(img) = page.root.find_descendant_mut("img") {
            img.set_attr("src", image_name);
            img.set_attr("alt", document.title.as_str());
        }
    }

    page.to_bytes(HTML_STYLE)
}

/// `<head><title>` 的文本
pub fn document_title(content: &[u8]) -> Option<String> {
    let text = str::from_utf8(content).ok()?;
    let document = Html::parse_document(text);
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "title")
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// 找到内容中第一张图片的 `src`
pub fn first_image_src(content: &[u8]) -> Option<String> {
    let text = str::from_utf8(content).ok()?;
    let document = Html::parse_document(text);
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "img")
        .and_then(|el| el.value().attr("src"))
        .map(str::to_string)
}
