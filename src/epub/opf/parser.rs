//! OPF解析器模块
//!
//! 将包文档解析为 [`Opf`]，不涉及压缩包内容；条目内容由读取器按清单加载。

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::epub::error::{EpubError, Result};
use crate::epub::opf::manifest::{classify, normalize_media_type, ItemVariant};
use crate::epub::opf::metadata::{Metadata, MetadataEntry, NS_DC, NS_OPF};
use crate::epub::opf::spine::{Binding, GuideEntry, SpineEntry};
use crate::epub::path::unquote;
use crate::epub::xml::{Element, NsScope, XmlDocument};

/// 清单中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// 已解码的路径，相对于包文档所在目录
    pub href: String,
    /// 已修正的媒体类型
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestItem {
    pub fn variant(&self) -> ItemVariant {
        classify(&self.media_type, &self.properties)
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }
}

/// OPF文件解析结果
#[derive(Debug, Clone, Default)]
pub struct Opf {
    /// EPUB版本
    pub version: Option<String>,
    /// `<package unique-identifier>`
    pub unique_identifier: Option<String>,
    /// `<package prefix>` 中除rendition外的声明，形如 `name: uri`
    pub prefixes: Vec<String>,
    /// `<metadata>` 上除 `dc`、`opf` 外声明的命名空间
    pub namespaces: BTreeMap<String, String>,
    /// 元数据
    pub metadata: Metadata,
    /// 没有 `unique-identifier` 时由带id的 `dc:identifier` 提供
    pub identifier_id_hint: Option<String>,
    /// 清单项，保持文档顺序
    pub manifest: Vec<ManifestItem>,
    /// 脊柱的目录引用
    pub spine_toc: Option<String>,
    pub page_progression_direction: Option<String>,
    /// 脊柱(阅读顺序)
    pub spine: Vec<SpineEntry>,
    pub guide: Vec<GuideEntry>,
    pub bindings: Vec<Binding>,
}

impl Opf {
    /// 解析OPF文件内容
    ///
    /// # 参数
    /// * `content` - OPF文件的原始字节
    ///
    /// # 返回值
    /// * `Result<Opf, EpubError>` - 根元素不是 `package` 或清单项缺少id/href时返回格式错误
    pub fn parse_xml(content: &[u8]) -> Result<Opf> {
        let document = XmlDocument::parse(content)?;
        let package = &document.root;
        if package.local_name() != "package" {
            return Err(EpubError::format(format!("包文档的根元素不是package: {}", package.name)));
        }

        let scope = NsScope::new().enter(package);
        let mut opf = Opf {
            version: package.attr("version").map(str::to_string),
            unique_identifier: package
                .attr("unique-identifier")
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            prefixes: package.attr("prefix").map(parse_prefixes).unwrap_or_default(),
            ..Opf::default()
        };

        if let Some(metadata) = package.child("metadata") {
            opf.parse_metadata(metadata, &scope);
        }
        if let Some(manifest) = package.child("manifest") {
            opf.parse_manifest(manifest)?;
        }
        if let Some(spine) = package.child("spine") {
            opf.parse_spine(spine);
        }
        if let Some(guide) = package.child("guide") {
            opf.guide = guide
                .children_named("reference")
                .map(|reference| GuideEntry {
                    kind: reference.attr("type").unwrap_or_default().to_string(),
                    title: reference.attr("title").unwrap_or_default().to_string(),
                    href: reference.attr("href").unwrap_or_default().to_string(),
                    item: None,
                })
                .collect();
        }
        if let Some(bindings) = package.child("bindings") {
            opf.bindings = bindings
                .children_named("mediaType")
                .map(|binding| Binding {
                    media_type: binding.attr("media-type").unwrap_or_default().to_string(),
                    handler: binding.attr("handler").unwrap_or_default().to_string(),
                })
                .collect();
        }

        debug!(
            version = ?opf.version,
            manifest = opf.manifest.len(),
            spine = opf.spine.len(),
            "包文档解析完成"
        );
        Ok(opf)
    }

    /// 主标识符使用的id：`unique-identifier` 优先
    pub fn identifier_id(&self) -> Option<&str> {
        self.unique_identifier
            .as_deref()
            .or(self.identifier_id_hint.as_deref())
    }

    /// 主标识符的值：id匹配的 `dc:identifier`，否则为第一个
    pub fn identifier(&self) -> Option<&str> {
        let identifiers = self.metadata.entries(Some(NS_DC), "identifier");
        let wanted = self.identifier_id();
        identifiers
            .iter()
            .find(|entry| wanted.is_some() && entry.attr("id") == wanted)
            .or_else(|| identifiers.first())
            .map(|entry| entry.value.as_str())
    }

    /// 按id查找清单项
    pub fn manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    fn parse_metadata(&mut self, metadata: &Element, package_scope: &NsScope) {
        let scope = package_scope.enter(metadata);
        let default_ns = scope.resolve(None).unwrap_or(NS_OPF).to_string();

        for (prefix, uri) in metadata
            .attributes
            .iter()
            .filter_map(|(key, value)| key.strip_prefix("xmlns:").map(|p| (p, value)))
        {
            if prefix != "dc" && prefix != "opf" {
                self.namespaces.insert(prefix.to_string(), uri.clone());
            }
        }

        for element in metadata.elements() {
            let element_scope = scope.enter(element);
            let namespace = element_scope
                .element_namespace(element)
                .map(str::to_string)
                .or_else(|| element.prefix().map(str::to_string));

            let mut entry = MetadataEntry::new(element.text());
            for (key, value) in &element.attributes {
                if key == "xmlns" || key.starts_with("xmlns:") {
                    continue;
                }
                entry
                    .attributes
                    .insert(element_scope.clark_attribute(key), value.clone());
            }

            let is_meta = element.local_name() == "meta"
                && matches!(namespace.as_deref(), Some(ns) if ns == default_ns || ns == NS_OPF);

            if is_meta {
                let (namespace, name) = match element.attr("name") {
                    Some(name) if name.contains(':') => {
                        let (prefix, local) = name.split_once(':').unwrap_or((name, ""));
                        let namespace = element_scope.resolve(Some(prefix)).unwrap_or(prefix).to_string();
                        (namespace, local.to_string())
                    }
                    Some(name) => (default_ns.clone(), name.to_string()),
                    None => (default_ns.clone(), "meta".to_string()),
                };
                self.metadata.add(Some(namespace.as_str()), &name, entry);
                continue;
            }

            let name = element.local_name().to_string();
            if namespace.as_deref() == Some(NS_DC) && name == "identifier" {
                if let Some(id) = element.attr("id").filter(|id| !id.is_empty()) {
                    self.identifier_id_hint = Some(id.to_string());
                }
            }
            self.metadata.add(namespace.as_deref(), &name, entry);
        }
    }

    fn parse_manifest(&mut self, manifest: &Element) -> Result<()> {
        for item in manifest.children_named("item") {
            let id = item
                .attr("id")
                .ok_or_else(|| EpubError::format("清单项缺少id"))?;
            let href = item
                .attr("href")
                .ok_or_else(|| EpubError::format(format!("清单项 {} 缺少href", id)))?;

            let properties = item
                .attr("properties")
                .map(|p| p.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();

            self.manifest.push(ManifestItem {
                id: id.to_string(),
                href: unquote(href),
                media_type: normalize_media_type(item.attr("media-type").unwrap_or_default()).to_string(),
                properties,
            });
        }
        Ok(())
    }

    fn parse_spine(&mut self, spine: &Element) {
        self.spine_toc = spine.attr("toc").filter(|toc| !toc.is_empty()).map(str::to_string);
        self.page_progression_direction = spine
            .attr("page-progression-direction")
            .filter(|dir| !dir.is_empty())
            .map(str::to_string);

        for itemref in spine.children_named("itemref") {
            match itemref.attr("idref") {
                Some(idref) => self
                    .spine
                    .push(SpineEntry::with_linear(idref, itemref.attr("linear") != Some("no"))),
                None => warn!("脊柱项缺少idref，已跳过"),
            }
        }
    }
}

/// 拆分 `prefix` 属性，跳过总会重新写出的rendition声明
fn parse_prefixes(value: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut tokens = value.split_whitespace();

    while let Some(token) = tokens.next() {
        let Some(name) = token.strip_suffix(':') else {
            continue;
        };
        let Some(uri) = tokens.next() else {
            break;
        };
        if name != "rendition" {
            prefixes.push(format!("{}: {}", name, uri));
        }
    }

    prefixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::xml::XML_NS;

    const PACKAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="pub-id"
         prefix="rendition: http://www.idpf.org/vocab/rendition/# bkterms: http://booktype.org/">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf"
            xmlns:calibre="http://calibre.kovidgoyal.net/2009/metadata">
    <dc:identifier id="isbn">urn:isbn:999</dc:identifier>
    <dc:identifier id="pub-id">urn:uuid:abc</dc:identifier>
    <dc:title>Parsed Title</dc:title>
    <dc:language>fr</dc:language>
    <dc:description xml:lang="fr">Résumé</dc:description>
    <dc:creator id="c1" opf:role="aut">Author</dc:creator>
    <meta property="dcterms:modified">2023-01-01T00:00:00Z</meta>
    <meta name="cover" content="cover-img"/>
    <meta name="calibre:series" content="Saga"/>
  </metadata>
  <manifest>
    <item id="ch%201" href="text/chapter%201.xhtml" media-type="application/xhtml+xml" properties="scripted svg"/>
    <item id="img" href="images/a.jpg" media-type="image/jpg"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  </manifest>
  <spine toc="ncx" page-progression-direction="rtl">
    <itemref idref="ch%201"/>
    <itemref idref="img" linear="no"/>
    <itemref idref="ncx" linear="yes"/>
  </spine>
  <guide>
    <reference type="text" title="Start" href="text/chapter%201.xhtml"/>
  </guide>
  <bindings>
    <mediaType media-type="application/x-demo" handler="impl"/>
  </bindings>
</package>"#;

    #[test]
    fn test_package_level() {
        let opf = Opf::parse_xml(PACKAGE.as_bytes()).unwrap();
        assert_eq!(opf.version.as_deref(), Some("3.0"));
        assert_eq!(opf.identifier_id(), Some("pub-id"));
        assert_eq!(opf.identifier(), Some("urn:uuid:abc"));
        assert_eq!(opf.prefixes, vec!["bkterms: http://booktype.org/".to_string()]);
        assert_eq!(
            opf.namespaces.get("calibre").map(String::as_str),
            Some("http://calibre.kovidgoyal.net/2009/metadata")
        );
    }

    #[test]
    fn test_metadata_entries() {
        let opf = Opf::parse_xml(PACKAGE.as_bytes()).unwrap();
        let metadata = &opf.metadata;

        assert_eq!(metadata.first_value(Some("DC"), "title"), Some("Parsed Title"));
        assert_eq!(metadata.entries(Some("DC"), "identifier").len(), 2);

        let description = &metadata.entries(Some("DC"), "description")[0];
        assert_eq!(description.attr(&format!("{{{}}}lang", XML_NS)), Some("fr"));

        let creator = &metadata.entries(Some("DC"), "creator")[0];
        assert_eq!(creator.attr(&format!("{{{}}}role", NS_OPF)), Some("aut"));
        assert_eq!(creator.attr("id"), Some("c1"));

        let modified = &metadata.entries(Some("OPF"), "meta")[0];
        assert_eq!(modified.attr("property"), Some("dcterms:modified"));
        assert_eq!(modified.value, "2023-01-01T00:00:00Z");

        let cover = &metadata.entries(Some("OPF"), "cover")[0];
        assert_eq!(cover.attr("content"), Some("cover-img"));

        let series = &metadata.entries(Some("http://calibre.kovidgoyal.net/2009/metadata"), "series")[0];
        assert_eq!(series.attr("content"), Some("Saga"));
    }

    #[test]
    fn test_manifest_spine_guide() {
        let opf = Opf::parse_xml(PACKAGE.as_bytes()).unwrap();

        let chapter = opf.manifest_item("ch%201").unwrap();
        assert_eq!(chapter.href, "text/chapter 1.xhtml");
        assert_eq!(chapter.properties, vec!["scripted", "svg"]);
        assert_eq!(chapter.variant(), ItemVariant::Document);

        let image = opf.manifest_item("img").unwrap();
        assert_eq!(image.media_type, "image/jpeg");
        assert_eq!(image.variant(), ItemVariant::Image);
        assert_eq!(opf.manifest_item("ncx").unwrap().variant(), ItemVariant::Ncx);

        assert_eq!(opf.spine_toc.as_deref(), Some("ncx"));
        assert_eq!(opf.page_progression_direction.as_deref(), Some("rtl"));
        let linear: Vec<_> = opf.spine.iter().map(|s| s.linear).collect();
        assert_eq!(linear, vec![true, false, true]);

        assert_eq!(opf.guide.len(), 1);
        assert_eq!(opf.guide[0].kind, "text");
        assert_eq!(opf.guide[0].title, "Start");
        assert_eq!(opf.bindings[0].handler, "impl");
    }

    #[test]
    fn test_identifier_hint_without_unique_identifier() {
        let xml = br#"<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="BookId">urn:x</dc:identifier>
  </metadata>
</package>"#;
        let opf = Opf::parse_xml(xml).unwrap();
        assert_eq!(opf.unique_identifier, None);
        assert_eq!(opf.identifier_id(), Some("BookId"));
        assert_eq!(opf.identifier(), Some("urn:x"));
        assert!(opf.manifest.is_empty());
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            Opf::parse_xml(b"<container/>"),
            Err(EpubError::Format(_))
        ));

        let missing_href = br#"<package xmlns="http://www.idpf.org/2007/opf"><manifest><item id="a"/></manifest></package>"#;
        assert!(matches!(Opf::parse_xml(missing_href), Err(EpubError::Format(_))));
    }

    #[test]
    fn test_parse_prefixes() {
        assert_eq!(
            parse_prefixes("rendition: http://a/#  foo: http://foo/ bar: http://bar/"),
            vec!["foo: http://foo/".to_string(), "bar: http://bar/".to_string()]
        );
        assert!(parse_prefixes("").is_empty());
    }
}
