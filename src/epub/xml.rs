//! 轻量级XML元素树
//!
//! 基于quick-xml的事件流构建一棵可修改的元素树，供容器描述文件、OPF、NCX
//! 以及导航文档的读写共用。元素名和属性名保留文档中的限定名（如 `dc:title`），
//! 命名空间通过 [`NsScope`] 按需解析。

use std::collections::BTreeMap;
use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::epub::error::{EpubError, Result};

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// HTML中不允许有结束标签的元素
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// 元素树中的节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// XML元素
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// 限定名，例如 `navPoint` 或 `dc:title`
    pub name: String,
    /// 按文档顺序排列的属性，包含 `xmlns` 声明
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.children.push(Node::Text(text));
        }
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// 追加子元素并返回其可变引用
    pub fn push(&mut self, child: Element) -> &mut Element {
        self.children.push(Node::Element(child));
        match self.children.last_mut() {
            Some(Node::Element(el)) => el,
            _ => unreachable!("刚刚压入的节点必定是元素"),
        }
    }

    /// 设置属性，已存在时原位替换
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// 按本地名查找属性，忽略前缀
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| !k.starts_with("xmlns") && local_part(k) == local)
            .map(|(_, v)| v.as_str())
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(p, _)| p)
    }

    /// 子元素迭代器
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// 第一个指定本地名的子元素
    pub fn child(&self, local: &str) -> Option<&Element> {
        self.elements().find(|el| el.local_name() == local)
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |el| el.local_name() == local)
    }

    /// 直接文本子节点拼接后的内容
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// 深度优先查找第一个指定本地名的后代元素
    pub fn find_descendant(&self, local: &str) -> Option<&Element> {
        for el in self.elements() {
            if el.local_name() == local {
                return Some(el);
            }
            if let Some(found) = el.find_descendant(local) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_descendant_mut(&mut self, local: &str) -> Option<&mut Element> {
        for node in self.children.iter_mut() {
            if let Node::Element(el) = node {
                if el.local_name() == local {
                    return Some(el);
                }
                if let Some(found) = el.find_descendant_mut(local) {
                    return Some(found);
                }
            }
        }
        None
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

/// 命名空间作用域：前缀到URI的映射，空字符串表示默认命名空间
#[derive(Debug, Clone, Default)]
pub struct NsScope {
    bindings: BTreeMap<String, String>,
}

impl NsScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进入一个元素，返回叠加了该元素命名空间声明的新作用域
    pub fn enter(&self, element: &Element) -> Self {
        let mut scope = self.clone();
        for (key, value) in &element.attributes {
            if key == "xmlns" {
                scope.bindings.insert(String::new(), value.clone());
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.bindings.insert(prefix.to_string(), value.clone());
            }
        }
        scope
    }

    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        match prefix {
            Some("xml") => Some(XML_NS),
            Some(p) => self.bindings.get(p).map(String::as_str),
            None => self.bindings.get("").map(String::as_str),
        }
    }

    pub fn element_namespace(&self, element: &Element) -> Option<&str> {
        self.resolve(element.prefix())
    }

    /// 查找绑定到指定URI的前缀（不含默认命名空间）
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        if uri == XML_NS {
            return Some("xml");
        }
        self.bindings
            .iter()
            .find(|(p, u)| !p.is_empty() && u.as_str() == uri)
            .map(|(p, _)| p.as_str())
    }

    /// 该作用域内声明的带前缀的命名空间
    pub fn prefixed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .filter(|(p, _)| !p.is_empty())
            .map(|(p, u)| (p.as_str(), u.as_str()))
    }

    /// 带前缀的属性名转换为 `{uri}local` 形式
    pub fn clark_attribute(&self, name: &str) -> String {
        match name.split_once(':') {
            Some(("xmlns", _)) => name.to_string(),
            Some((prefix, local)) => match self.resolve(Some(prefix)) {
                Some(uri) => format!("{{{}}}{}", uri, local),
                None => name.to_string(),
            },
            None => name.to_string(),
        }
    }

    /// `{uri}local` 形式的属性名转换回限定名；URI未绑定时返回 `None`
    pub fn qualify_attribute(&self, name: &str) -> Option<String> {
        match name.strip_prefix('{').and_then(|rest| rest.split_once('}')) {
            Some((uri, local)) => self
                .prefix_for(uri)
                .map(|prefix| format!("{}:{}", prefix, local)),
            None => Some(name.to_string()),
        }
    }
}

/// 解析后的XML文档
#[derive(Debug, Clone)]
pub struct XmlDocument {
    /// `<!DOCTYPE ...>` 中的内容，例如 `html`
    pub doctype: Option<String>,
    pub root: Element,
}

/// 输出选项
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteStyle {
    /// 缩进输出，只用于不含混合内容的文档
    pub indent: bool,
    /// 非空元素总是写出结束标签
    pub html: bool,
}

impl XmlDocument {
    pub fn new(root: Element) -> Self {
        Self { doctype: None, root }
    }

    /// 解析XML字节流
    ///
    /// # 参数
    /// * `bytes` - 原始内容，允许带UTF-8 BOM
    ///
    /// # 返回值
    /// * `Result<XmlDocument>` - 解析得到的文档
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let text = String::from_utf8_lossy(bytes);

        let mut reader = Reader::from_str(&text);
        reader.config_mut().trim_text(true);
        reader.config_mut().expand_empty_elements = true;

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut doctype = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) => {
                    stack.push(element_from_start(e)?);
                }
                Event::Empty(ref e) => {
                    let element = element_from_start(e)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| EpubError::format("XML结束标签没有对应的开始标签"))?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(ref e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = e.unescape()?;
                        if !text.is_empty() {
                            parent.children.push(Node::Text(text.into_owned()));
                        }
                    }
                }
                Event::CData(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        parent.children.push(Node::Text(text));
                    }
                }
                Event::DocType(e) => {
                    doctype = Some(String::from_utf8_lossy(&e.into_inner()).trim().to_string());
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let root = root.ok_or_else(|| EpubError::format("XML文档没有根元素"))?;
        Ok(Self { doctype, root })
    }

    /// 序列化为带XML声明的UTF-8字节
    pub fn to_bytes(&self, style: WriteStyle) -> Result<Vec<u8>> {
        let mut writer = if style.indent {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        if !style.indent {
            writer.get_mut().write_all(b"\n")?;
        }
        if let Some(doctype) = &self.doctype {
            writer.write_event(Event::DocType(BytesText::from_escaped(doctype.as_str())))?;
            if !style.indent {
                writer.get_mut().write_all(b"\n")?;
            }
        }
        write_element(&mut writer, &self.root, style)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn element_from_start(e: &BytesStart) -> Result<Element> {
    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());

    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|err| EpubError::XmlError(quick_xml::Error::InvalidAttr(err)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }

    Ok(element)
}

/// 将单个元素（及其子树）写入quick-xml写出器
pub fn write_element<W: Write>(writer: &mut Writer<W>, element: &Element, style: WriteStyle) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    let self_closing = element.children.is_empty()
        && (!style.html || VOID_ELEMENTS.contains(&element.local_name()));

    if self_closing {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(el) => write_element(writer, el, style)?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;

    Ok(())
}

/// 将若干节点序列化为片段，不带声明
pub fn fragment_to_bytes(nodes: &[Node], style: WriteStyle) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    for node in nodes {
        match node {
            Node::Element(el) => write_element(&mut writer, el, style)?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        }
    }
    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_bom_and_doctype() {
        let xml = b"\xEF\xBB\xBF<?xml version=\"1.0\"?><!DOCTYPE html><html xmlns=\"http://www.w3.org/1999/xhtml\"><body><p>a &amp; b</p></body></html>";
        let doc = XmlDocument::parse(xml).unwrap();
        assert_eq!(doc.doctype.as_deref(), Some("html"));
        assert_eq!(doc.root.local_name(), "html");
        let p = doc.root.find_descendant("p").unwrap();
        assert_eq!(p.text(), "a & b");
    }

    #[test]
    fn test_namespace_scope() {
        let xml = br#"<package xmlns="http://www.idpf.org/2007/opf"><metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf"><dc:title opf:file-as="T">T</dc:title></metadata></package>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let scope = NsScope::new().enter(&doc.root);
        let metadata = doc.root.child("metadata").unwrap();
        let scope = scope.enter(metadata);
        let title = metadata.child("title").unwrap();

        assert_eq!(scope.element_namespace(title), Some("http://purl.org/dc/elements/1.1/"));
        assert_eq!(
            scope.clark_attribute("opf:file-as"),
            "{http://www.idpf.org/2007/opf}file-as"
        );
        assert_eq!(
            scope.qualify_attribute("{http://www.idpf.org/2007/opf}file-as").as_deref(),
            Some("opf:file-as")
        );
        assert_eq!(scope.clark_attribute("xml:lang"), format!("{{{}}}lang", XML_NS));
    }

    #[test]
    fn test_serialize_escapes_and_html_mode() {
        let root = Element::new("html")
            .with_child(Element::new("script").with_attr("src", "a.js"))
            .with_child(Element::new("br"))
            .with_child(Element::new("p").with_text("1 < 2"));
        let doc = XmlDocument::new(root);

        let html = String::from_utf8(doc.to_bytes(WriteStyle { indent: false, html: true }).unwrap()).unwrap();
        assert!(html.contains("<script src=\"a.js\"></script>"));
        assert!(html.contains("<br/>"));
        assert!(html.contains("<p>1 &lt; 2</p>"));

        let xml = String::from_utf8(doc.to_bytes(WriteStyle::default()).unwrap()).unwrap();
        assert!(xml.contains("<script src=\"a.js\"/>"));
    }

    #[test]
    fn test_parse_rejects_mismatched_tags() {
        assert!(XmlDocument::parse(b"<a><b></a>").is_err());
    }
}
