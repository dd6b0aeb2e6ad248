//! 书籍模型
//!
//! [`Book`] 聚合元数据、条目、脊柱、导引、目录以及生成文档时使用的模板。
//! 写出与读取都围绕这个模型进行。

use std::collections::BTreeMap;

use tracing::warn;
use uuid::Uuid;

use crate::epub::error::{EpubError, Result};
use crate::epub::html;
use crate::epub::opf::manifest::{guess_type, Item, ItemKind, ItemType, ItemVariant};
use crate::epub::opf::metadata::{Metadata, MetadataEntry};
use crate::epub::opf::spine::{Binding, GuideEntry, SpineEntry};
use crate::epub::toc::TocEntry;

/// 主标识符 `dc:identifier` 的默认id
pub const DEFAULT_IDENTIFIER_ID: &str = "id";
/// 包文件所在的默认目录
pub const DEFAULT_FOLDER_NAME: &str = "EPUB";

pub const NCX_TEMPLATE: &str = r#"<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1"/>"#;

pub const NAV_TEMPLATE: &str = r#"<?xml version="1.0" encoding="utf-8"?><!DOCTYPE html><html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"/>"#;

pub const CHAPTER_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?><!DOCTYPE html><html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" epub:prefix="z3998: http://www.daisy.org/z3998/2012/vocab/structure/#"></html>"#;

pub const COVER_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en" xml:lang="en">
 <head>
  <style>
    body { margin: 0em; padding: 0em; }
    img { max-width: 100%; max-height: 100%; }
  </style>
 </head>
 <body>
   <img src="" alt="" />
 </body>
</html>"#;

fn default_templates() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("ncx".to_string(), NCX_TEMPLATE.to_string()),
        ("nav".to_string(), NAV_TEMPLATE.to_string()),
        ("chapter".to_string(), CHAPTER_TEMPLATE.to_string()),
        ("cover".to_string(), COVER_TEMPLATE.to_string()),
    ])
}

/// 一本EPUB书籍
#[derive(Debug, Clone)]
pub struct Book {
    /// 主标识符的值
    pub identifier: String,
    pub title: String,
    pub language: String,
    /// 全书文字方向（`ltr` / `rtl`）
    pub direction: Option<String>,
    /// 读取时得到的包版本
    pub version: Option<String>,
    /// `<package unique-identifier>` 指向的id
    pub identifier_id: String,
    /// 包文件所在目录
    pub folder_name: String,
    pub metadata: Metadata,
    pub spine: Vec<SpineEntry>,
    pub guide: Vec<GuideEntry>,
    pub toc: Vec<TocEntry>,
    pub bindings: Vec<Binding>,
    /// 追加到 `<package prefix>` 的前缀声明
    pub prefixes: Vec<String>,
    /// 在 `<metadata>` 上声明的额外命名空间（前缀 → URI）
    pub namespaces: BTreeMap<String, String>,
    items: Vec<Item>,
    templates: BTreeMap<String, String>,
    chapter_counter: usize,
    static_counter: usize,
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

impl Book {
    /// 创建新书：随机UUID标识符，并登记生成器信息
    pub fn new() -> Self {
        let mut book = Self::empty();
        book.metadata.add(
            Some("OPF"),
            "generator",
            MetadataEntry::new("")
                .with_attr("name", "generator")
                .with_attr("content", format!("epubforge {}", env!("CARGO_PKG_VERSION"))),
        );
        book.set_identifier(Uuid::new_v4().to_string());
        book
    }

    /// 不含任何元数据的空书，读取时使用
    pub fn empty() -> Self {
        Self {
            identifier: String::new(),
            title: String::new(),
            language: "en".to_string(),
            direction: None,
            version: None,
            identifier_id: DEFAULT_IDENTIFIER_ID.to_string(),
            folder_name: DEFAULT_FOLDER_NAME.to_string(),
            metadata: Metadata::new(),
            spine: Vec::new(),
            guide: Vec::new(),
            toc: Vec::new(),
            bindings: Vec::new(),
            prefixes: Vec::new(),
            namespaces: BTreeMap::new(),
            items: Vec::new(),
            templates: default_templates(),
            chapter_counter: 0,
            static_counter: 0,
        }
    }

    /// 设置主标识符
    pub fn set_identifier(&mut self, uid: impl Into<String>) {
        self.identifier = uid.into();
        let entry = MetadataEntry::new(self.identifier.as_str()).with_attr("id", self.identifier_id.as_str());
        self.metadata.set_unique(Some("DC"), "identifier", entry);
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.metadata
            .set_unique(Some("DC"), "title", MetadataEntry::new(self.title.as_str()));
    }

    pub fn set_language(&mut self, lang: impl Into<String>) {
        self.language = lang.into();
        self.metadata
            .set_unique(Some("DC"), "language", MetadataEntry::new(self.language.as_str()));
    }

    pub fn set_direction(&mut self, direction: Option<String>) {
        self.direction = direction;
    }

    /// 添加作者，`file_as` 与 `role` 以 `refines` 元数据的形式关联
    ///
    /// # 参数
    /// * `name` - 作者姓名
    /// * `file_as` - 排序用名称
    /// * `role` - MARC角色代码，如 `aut`
    /// * `uid` - `dc:creator` 的id
    pub fn add_author(&mut self, name: &str, file_as: Option<&str>, role: Option<&str>, uid: &str) {
        self.metadata
            .add(Some("DC"), "creator", MetadataEntry::new(name).with_attr("id", uid));

        let refines = format!("#{}", uid);
        for (property, value) in [("file-as", file_as), ("role", role)] {
            if let Some(value) = value {
                self.metadata.add(
                    None,
                    "meta",
                    MetadataEntry::new(value)
                        .with_attr("refines", refines.as_str())
                        .with_attr("property", property)
                        .with_attr("scheme", "marc:relators"),
                );
            }
        }
    }

    pub fn add_metadata(&mut self, namespace: Option<&str>, name: &str, entry: MetadataEntry) {
        self.metadata.add(namespace, name, entry);
    }

    pub fn set_unique_metadata(&mut self, namespace: Option<&str>, name: &str, entry: MetadataEntry) {
        self.metadata.set_unique(namespace, name, entry);
    }

    /// 获取元数据，不存在时返回 `NotFound`
    pub fn get_metadata(&self, namespace: Option<&str>, name: &str) -> Result<&[MetadataEntry]> {
        self.metadata.get(namespace, name)
    }

    /// 设置封面图片，并按需生成封面页
    ///
    /// # 参数
    /// * `file_name` - 图片在包内的路径
    /// * `content` - 图片数据
    /// * `create_page` - 是否同时生成 `cover.xhtml`
    pub fn set_cover(&mut self, file_name: &str, content: Vec<u8>, create_page: bool) -> Result<()> {
        self.add_item(Item::cover_image(file_name, content))?;
        if create_page {
            self.add_item(Item::cover_page(file_name))?;
        }
        self.metadata.add(
            None,
            "meta",
            MetadataEntry::new("")
                .with_attr("name", "cover")
                .with_attr("content", "cover-img"),
        );
        Ok(())
    }

    /// 添加条目
    ///
    /// 媒体类型为空时按扩展名推断；id为空时按类别分配：
    /// 文档使用 `chapter_<n>`，图片使用 `image_<n>`，其余使用 `static_<n>`，
    /// 图片与其余条目共用一个计数器。
    ///
    /// # 返回值
    /// * `Result<&mut Item>` - 加入后的条目；id与已有条目重复时返回格式错误
    pub fn add_item(&mut self, mut item: Item) -> Result<&mut Item> {
        if item.id.is_empty() {
            item.id = self.next_id(&item.kind);
        } else if self.get_item_with_id(&item.id).is_some() {
            return Err(EpubError::format(format!("条目id重复: {}", item.id)));
        }

        if item.media_type.is_empty() {
            let (media_type, known) = guess_type(&item.file_name.to_lowercase());
            if !known {
                warn!(id = %item.id, file = %item.file_name, "无法根据扩展名推断媒体类型，使用 {}", media_type);
            }
            item.media_type = media_type.to_string();
        }

        self.items.push(item);
        let index = self.items.len() - 1;
        Ok(&mut self.items[index])
    }

    fn next_id(&mut self, kind: &ItemKind) -> String {
        loop {
            let id = match kind {
                ItemKind::Document(_) | ItemKind::CoverPage { .. } | ItemKind::Nav(_) => {
                    let id = format!("chapter_{}", self.chapter_counter);
                    self.chapter_counter += 1;
                    id
                }
                ItemKind::Image => {
                    let id = format!("image_{}", self.static_counter);
                    self.static_counter += 1;
                    id
                }
                _ => {
                    let id = format!("static_{}", self.static_counter);
                    self.static_counter += 1;
                    id
                }
            };
            if self.get_item_with_id(&id).is_none() {
                return id;
            }
        }
    }

    /// 全部条目，按加入顺序
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.items.iter_mut()
    }

    /// 按id获取条目，不存在时返回 `NotFound`
    pub fn item(&self, id: &str) -> Result<&Item> {
        self.get_item_with_id(id)
            .ok_or_else(|| EpubError::NotFound(format!("条目 {}", id)))
    }

    pub fn get_item_with_id(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn get_item_with_id_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    pub fn get_item_with_href(&self, href: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.file_name == href)
    }

    pub fn items_of_media_type<'a>(&'a self, media_type: &'a str) -> impl Iterator<Item = &'a Item> + 'a {
        self.items.iter().filter(move |item| item.media_type == media_type)
    }

    pub fn items_of_type(&self, item_type: ItemType) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(move |item| item.item_type() == item_type)
    }

    pub fn items_of_variant(&self, variant: ItemVariant) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(move |item| item.variant() == variant)
    }

    /// 删除条目并返回它
    pub fn remove_item(&mut self, id: &str) -> Option<Item> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    /// 追加脊柱项
    pub fn add_spine(&mut self, entry: impl Into<SpineEntry>) {
        self.spine.push(entry.into());
    }

    pub fn add_guide(&mut self, entry: GuideEntry) {
        self.guide.push(entry);
    }

    pub fn add_binding(&mut self, media_type: impl Into<String>, handler: impl Into<String>) {
        self.bindings.push(Binding {
            media_type: media_type.into(),
            handler: handler.into(),
        });
    }

    /// 追加 `<package prefix>` 声明，例如 `add_prefix("bkterms", "http://booktype.org/")`
    pub fn add_prefix(&mut self, name: &str, uri: &str) {
        self.prefixes.push(format!("{}: {}", name, uri));
    }

    /// 在 `<metadata>` 上声明额外的命名空间
    pub fn add_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.insert(prefix.to_string(), uri.to_string());
    }

    /// 替换模板，可用名称为 `ncx`、`nav`、`chapter`、`cover`
    pub fn set_template(&mut self, name: &str, value: impl Into<String>) {
        self.templates.insert(name.to_string(), value.into());
    }

    pub fn get_template(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// 条目写入压缩包时的内容；文档类条目由模板生成
    pub fn item_content(&self, id: &str) -> Result<Vec<u8>> {
        html::render_document(self, self.item(id)?)
    }

    /// 文档条目 `<body>` 内部的原始标记
    pub fn body_content(&self, id: &str) -> Result<Vec<u8>> {
        html::body_content(&self.item(id)?.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::opf::manifest::MEDIA_TYPE_OCTET_STREAM;
    use proptest::prelude::*;

    #[test]
    fn test_new_book_defaults() {
        let book = Book::new();
        assert_eq!(book.language, "en");
        assert_eq!(book.folder_name, "EPUB");
        assert_eq!(book.identifier_id, "id");
        assert!(Uuid::parse_str(&book.identifier).is_ok());

        let ids = book.get_metadata(Some("DC"), "identifier").unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].attr("id"), Some("id"));
        assert!(book.get_metadata(Some("OPF"), "generator").is_ok());
        assert!(Book::empty().metadata.is_empty());
    }

    #[test]
    fn test_setters_write_through() {
        let mut book = Book::new();
        book.set_title("First");
        book.set_title("Second");
        book.set_language("ja");
        book.set_identifier("urn:isbn:123");

        assert_eq!(book.title, "Second");
        let titles = book.get_metadata(Some("DC"), "title").unwrap();
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].value, "Second");
        assert_eq!(book.metadata.language(), Some("ja"));
        assert_eq!(book.get_metadata(Some("DC"), "identifier").unwrap()[0].value, "urn:isbn:123");
    }

    #[test]
    fn test_add_item_assigns_ids_and_types() {
        let mut book = Book::new();
        let c0 = book.add_item(Item::document("a.xhtml", "A", "<p/>")).unwrap().id.clone();
        let i0 = book.add_item(Item::image("a.png", vec![1])).unwrap().id.clone();
        let s1 = book
            .add_item(Item::new("", "style.css", "", b"p{}".to_vec()))
            .unwrap()
            .id
            .clone();
        let c1 = book.add_item(Item::document("b.xhtml", "B", "<p/>")).unwrap().id.clone();
        let i2 = book.add_item(Item::image("b.png", vec![2])).unwrap().id.clone();

        assert_eq!(c0, "chapter_0");
        assert_eq!(i0, "image_0");
        assert_eq!(s1, "static_1");
        assert_eq!(c1, "chapter_1");
        assert_eq!(i2, "image_2");

        assert_eq!(book.item("image_0").unwrap().media_type, "image/png");
        assert_eq!(book.item("static_1").unwrap().media_type, "text/css");
        assert_eq!(book.items_of_type(ItemType::Style).count(), 1);
        assert_eq!(book.items_of_variant(ItemVariant::Document).count(), 2);
        assert_eq!(book.items_of_media_type("image/png").count(), 2);

        assert_eq!(guess_type("blob"), (MEDIA_TYPE_OCTET_STREAM, false));
        let unknown = book.add_item(Item::new("", "blob", "", Vec::new())).unwrap();
        assert_eq!(unknown.media_type, MEDIA_TYPE_OCTET_STREAM);
        assert_eq!(unknown.id, "static_3");
    }

    #[test]
    fn test_duplicate_explicit_id_rejected() {
        let mut book = Book::new();
        book.add_item(Item::ncx()).unwrap();
        assert!(matches!(book.add_item(Item::ncx()), Err(EpubError::Format(_))));
        assert!(matches!(book.item("nope"), Err(EpubError::NotFound(_))));
        assert!(book.get_item_with_id("nope").is_none());
    }

    #[test]
    fn test_generated_id_skips_taken_id() {
        let mut book = Book::new();
        book.add_item(Item::new("chapter_0", "x.xhtml", "", Vec::new())).unwrap();
        let id = book.add_item(Item::document("a.xhtml", "A", "")).unwrap().id.clone();
        assert_eq!(id, "chapter_1");
    }

    #[test]
    fn test_set_cover() {
        let mut book = Book::new();
        book.set_cover("images/cover.jpg", vec![0xff, 0xd8], true).unwrap();

        let image = book.item("cover-img").unwrap();
        assert_eq!(image.media_type, "image/jpeg");
        assert_eq!(image.variant(), ItemVariant::CoverImage);

        let page = book.item("cover").unwrap();
        assert_eq!(page.file_name, "cover.xhtml");
        assert!(!page.is_linear());
        assert!(matches!(&page.kind, ItemKind::CoverPage { image_name, .. } if image_name == "images/cover.jpg"));
        assert_eq!(book.metadata.meta_content("cover"), Some("cover-img"));
    }

    #[test]
    fn test_add_author() {
        let mut book = Book::new();
        book.add_author("Jane Doe", Some("Doe, Jane"), Some("aut"), "creator");
        book.add_author("John Roe", None, None, "creator2");

        let creators = book.metadata.creators();
        assert_eq!(creators.len(), 2);
        assert_eq!(creators[0].file_as.as_deref(), Some("Doe, Jane"));
        assert_eq!(creators[0].role.as_deref(), Some("aut"));
        assert_eq!(creators[1].role, None);

        let metas = book.get_metadata(None, "meta").unwrap();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].attr("scheme"), Some("marc:relators"));
    }

    #[test]
    fn test_prefixes_namespaces_templates() {
        let mut book = Book::new();
        book.add_prefix("bkterms", "http://booktype.org/");
        book.add_namespace("calibre", "http://calibre.kovidgoyal.net/2009/metadata");
        book.set_template("chapter", "<html/>");

        assert_eq!(book.prefixes, vec!["bkterms: http://booktype.org/".to_string()]);
        assert!(book.namespaces.contains_key("calibre"));
        assert_eq!(book.get_template("chapter"), Some("<html/>"));
        assert!(book.get_template("ncx").unwrap().contains("2005-1"));
        assert!(book.get_template("missing").is_none());
    }

    #[test]
    fn test_body_content_lookup() {
        let mut book = Book::new();
        book.add_item(Item::document("a.xhtml", "A", "<body><p>x</p></body>")).unwrap();
        assert_eq!(book.body_content("chapter_0").unwrap(), b"<p>x</p>".to_vec());
        assert!(book.body_content("missing").is_err());
    }

    fn make_item(kind: u8, index: usize) -> Item {
        match kind % 3 {
            0 => Item::document(format!("text/{}.xhtml", index), "", ""),
            1 => Item::image(format!("img/{}.png", index), Vec::new()),
            _ => Item::new("", format!("misc/{}.css", index), "", Vec::new()),
        }
    }

    proptest! {
        #[test]
        fn prop_generated_ids_unique_and_monotonic(
            plan in proptest::collection::vec((0u8..3, proptest::option::of(0usize..6)), 0..40)
        ) {
            let mut book = Book::empty();
            let mut last_chapter: Option<usize> = None;
            let mut last_static: Option<usize> = None;

            for (index, (kind, explicit)) in plan.into_iter().enumerate() {
                let mut item = make_item(kind, index);
                if let Some(n) = explicit {
                    item.id = format!("chapter_{}", n);
                }
                let explicit_id = !item.id.is_empty();

                let Ok(added) = book.add_item(item) else {
                    prop_assert!(explicit_id);
                    continue;
                };
                if explicit_id {
                    continue;
                }

                let id = added.id.clone();
                let (prefix, number) = id.rsplit_once('_').unwrap();
                let number: usize = number.parse().unwrap();
                match prefix {
                    "chapter" => {
                        prop_assert!(last_chapter.map_or(true, |last| number > last));
                        last_chapter = Some(number);
                    }
                    "image" | "static" => {
                        prop_assert!(last_static.map_or(true, |last| number > last));
                        last_static = Some(number);
                    }
                    other => prop_assert!(false, "unexpected prefix {}", other),
                }
            }

            let mut ids: Vec<&str> = book.items().iter().map(|item| item.id.as_str()).collect();
            let total = ids.len();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), total);
        }
    }
}
