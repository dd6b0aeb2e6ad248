//! 包文档（content.opf）生成

use chrono::Utc;
use tracing::{debug, warn};

use crate::epub::book::Book;
use crate::epub::config::WriteOptions;
use crate::epub::error::Result;
use crate::epub::opf::manifest::{Item, ItemKind, ItemVariant};
use crate::epub::opf::metadata::{MetadataEntry, NS_DC, NS_OPF};
use crate::epub::xml::{Element, NsScope, WriteStyle, XmlDocument};

/// 总是写入 `<package prefix>` 的渲染词汇表前缀
pub const RENDITION_PREFIX: &str = "rendition: http://www.idpf.org/vocab/rendition/#";

const MODIFIED_PROPERTY: &str = "dcterms:modified";

/// 生成包文档
///
/// # 参数
/// * `book` - 要写出的书籍
/// * `options` - 方向、guide开关与修改时间
///
/// # 返回值
/// * `Result<Vec<u8>>` - 缩进格式的XML
pub fn render_package(book: &Book, options: &WriteOptions) -> Result<Vec<u8>> {
    let mut package = Element::new("package")
        .with_attr("xmlns", NS_OPF)
        .with_attr("unique-identifier", book.identifier_id.as_str())
        .with_attr("version", "3.0");
    if let Some(direction) = book.direction.as_deref().filter(|_| options.package_direction) {
        package.set_attr("dir", direction);
    }

    let prefixes: Vec<&str> = std::iter::once(RENDITION_PREFIX)
        .chain(book.prefixes.iter().map(String::as_str))
        .collect();
    package.set_attr("prefix", prefixes.join(" "));

    package.push(build_metadata(book, options));
    package.push(build_manifest(book));
    package.push(build_spine(book, options));

    if !book.guide.is_empty() && options.epub2_guide {
        package.push(build_guide(book));
    }

    if !book.bindings.is_empty() {
        let bindings = package.push(Element::new("bindings"));
        for binding in &book.bindings {
            bindings.push(
                Element::new("mediaType")
                    .with_attr("media-type", binding.media_type.as_str())
                    .with_attr("handler", binding.handler.as_str()),
            );
        }
    }

    XmlDocument::new(package).to_bytes(WriteStyle {
        indent: true,
        html: false,
    })
}

/// 元数据块的命名空间前缀分配
///
/// `dc`、`opf` 以及书籍声明的命名空间写在 `<metadata>` 上；其余URI在用到的元素上
/// 临时声明为 `ns<n>`。
struct PrefixAllocator {
    scope: NsScope,
    generated: usize,
}

impl PrefixAllocator {
    fn new(metadata: &Element) -> Self {
        Self {
            scope: NsScope::new().enter(metadata),
            generated: 0,
        }
    }

    /// 返回URI对应的前缀，未声明时在 `element` 上声明一个新前缀
    fn prefix(&mut self, uri: &str, element: &mut Element) -> String {
        if let Some(prefix) = self.scope.prefix_for(uri) {
            return prefix.to_string();
        }
        if let Some((prefix, _)) = element
            .attributes
            .iter()
            .filter_map(|(key, value)| key.strip_prefix("xmlns:").map(|p| (p, value)))
            .find(|(_, value)| value.as_str() == uri)
        {
            return prefix.to_string();
        }

        let prefix = format!("ns{}", self.generated);
        self.generated += 1;
        element.set_attr(format!("xmlns:{}", prefix), uri);
        prefix
    }

    fn apply_attributes(&mut self, element: &mut Element, entry: &MetadataEntry) {
        for (key, value) in &entry.attributes {
            let name = match key.strip_prefix('{').and_then(|rest| rest.split_once('}')) {
                Some((uri, local)) => format!("{}:{}", self.prefix(uri, element), local),
                None => key.clone(),
            };
            element.set_attr(name, value.as_str());
        }
    }
}

fn build_metadata(book: &Book, options: &WriteOptions) -> Element {
    let mut metadata = Element::new("metadata")
        .with_attr("xmlns:dc", NS_DC)
        .with_attr("xmlns:opf", NS_OPF);
    for (prefix, uri) in &book.namespaces {
        metadata.set_attr(format!("xmlns:{}", prefix), uri.as_str());
    }

    let mtime = options.mtime.unwrap_or_else(Utc::now);
    metadata.push(
        Element::new("meta")
            .with_attr("property", MODIFIED_PROPERTY)
            .with_text(mtime.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
    );

    let mut prefixes = PrefixAllocator::new(&metadata);
    let mut elements = Vec::new();

    for (namespace, name, entries) in book.metadata.iter() {
        for entry in entries {
            let as_meta = namespace == Some(NS_OPF)
                || is_prefixed_meta(name, entry)
                || (namespace.is_none() && name == "meta");
            if as_meta && entry.attr("property") == Some(MODIFIED_PROPERTY) {
                debug!("跳过重复的dcterms:modified");
                continue;
            }

            let mut element = Element::new("meta");
            prefixes.apply_attributes(&mut element, entry);

            if !as_meta {
                let qualified = match namespace {
                    Some(uri) => format!("{}:{}", prefixes.prefix(uri, &mut element), name),
                    None => name.to_string(),
                };
                element.name = qualified;
            }

            if !entry.value.is_empty() {
                element = element.with_text(entry.value.as_str());
            }
            elements.push(element);
        }
    }

    for element in elements {
        metadata.push(element);
    }
    metadata
}

/// `<meta name="prefix:local">` 读入后按前缀命名空间存放，写出时仍还原为 `meta`
fn is_prefixed_meta(name: &str, entry: &MetadataEntry) -> bool {
    entry
        .attr("name")
        .and_then(|n| n.split_once(':'))
        .is_some_and(|(_, local)| local == name)
}

fn manifest_properties(item: &Item) -> Vec<String> {
    let declared = item.document_info().map(|doc| doc.properties.clone()).unwrap_or_default();
    match &item.kind {
        ItemKind::Nav(_) => std::iter::once("nav".to_string())
            .chain(declared.into_iter().filter(|p| p != "nav"))
            .collect(),
        ItemKind::CoverImage => vec!["cover-image".to_string()],
        _ => declared,
    }
}

fn build_manifest(book: &Book) -> Element {
    let mut manifest = Element::new("manifest");

    for item in book.items().iter().filter(|item| item.manifest) {
        let mut element = Element::new("item")
            .with_attr("href", item.file_name.as_str())
            .with_attr("id", item.id.as_str())
            .with_attr("media-type", item.media_type.as_str());

        let properties = manifest_properties(item);
        if !properties.is_empty() {
            element.set_attr("properties", properties.join(" "));
        }
        manifest.push(element);
    }

    manifest
}

fn build_spine(book: &Book, options: &WriteOptions) -> Element {
    let mut spine = Element::new("spine");
    if let Some(ncx) = book.items_of_variant(ItemVariant::Ncx).next() {
        spine.set_attr("toc", ncx.id.as_str());
    }
    if let Some(direction) = book.direction.as_deref().filter(|_| options.spine_direction) {
        spine.set_attr("page-progression-direction", direction);
    }

    for entry in &book.spine {
        let linear = match book.get_item_with_id(&entry.idref) {
            Some(item) => entry.effective_linear(item.is_linear()),
            None => {
                warn!(idref = %entry.idref, "脊柱引用了不存在的条目");
                entry.linear
            }
        };

        let mut itemref = Element::new("itemref").with_attr("idref", entry.idref.as_str());
        if !linear {
            itemref.set_attr("linear", "no");
        }
        spine.push(itemref);
    }

    spine
}

fn build_guide(book: &Book) -> Element {
    let mut guide = Element::new("guide");

    for entry in &book.guide {
        let (href, title) = match &entry.item {
            Some(item_id) => match book.get_item_with_id(item_id) {
                Some(item) => (item.file_name.clone(), item.title().to_string()),
                None => {
                    warn!(id = %item_id, "guide引用了不存在的条目，已跳过");
                    continue;
                }
            },
            None => (entry.href.clone(), entry.title.clone()),
        };

        guide.push(
            Element::new("reference")
                .with_attr("type", entry.kind.as_str())
                .with_attr("title", title)
                .with_attr("href", href),
        );
    }

    guide
}
