//! EPUB读取
//!
//! 读取顺序：容器描述 → 包文档（元数据、清单、脊柱、guide）→ 目录 → 插件。
//! 压缩包与格式层面的错误直接返回给调用方。

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::epub::book::{Book, DEFAULT_IDENTIFIER_ID};
use crate::epub::config::ReadOptions;
use crate::epub::container::{Container, CONTAINER_PATH};
use crate::epub::error::{EpubError, Result};
use crate::epub::html;
use crate::epub::opf::manifest::{Document, Item, ItemKind, ItemVariant};
use crate::epub::opf::parser::{ManifestItem, Opf};
use crate::epub::path::{dirname, join};
use crate::epub::plugin;
use crate::epub::toc::{parse_nav, parse_ncx};
use crate::epub::writer::EPUB_MIMETYPE;

/// 从可定位的输入读取EPUB
pub struct EpubReader<'a, R: Read + Seek> {
    archive: ZipArchive<R>,
    options: &'a ReadOptions,
}

impl<'a, R: Read + Seek> EpubReader<'a, R> {
    /// 打开压缩包
    ///
    /// # 返回值
    /// * `Result<EpubReader>` - 不是有效Zip时返回 `Archive` 错误
    pub fn new(reader: R, options: &'a ReadOptions) -> Result<Self> {
        let archive = ZipArchive::new(reader).map_err(EpubError::from_archive_open)?;
        Ok(Self { archive, options })
    }

    /// 读取整本书
    pub fn load(mut self) -> Result<Book> {
        self.check_mimetype();

        let opf_path = self.get_opf_path()?;
        let mut book = self.load_package(&opf_path)?;

        plugin::run_after_read(&self.options.plugins, &mut book)?;

        info!(
            title = %book.title,
            items = book.items().len(),
            spine = book.spine.len(),
            "EPUB读取完成"
        );
        Ok(book)
    }

    /// 提取指定文件的二进制内容
    ///
    /// # 参数
    /// * `filename` - 压缩包内的路径
    ///
    /// # 返回值
    /// * `Result<Vec<u8>, EpubError>` - 文件不存在时返回格式错误
    pub fn extract_binary_file(&mut self, filename: &str) -> Result<Vec<u8>> {
        let mut file = match self.archive.by_name(filename) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => {
                return Err(EpubError::format(format!("压缩包中缺少文件: {}", filename)));
            }
            Err(err) => return Err(err.into()),
        };
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// 列出压缩包中的所有条目
    pub fn list_files(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// `mimetype` 缺失或内容不符时只记录警告
    fn check_mimetype(&mut self) {
        match self.extract_binary_file("mimetype") {
            Ok(content) if String::from_utf8_lossy(&content).trim() == EPUB_MIMETYPE => {}
            Ok(content) => warn!(found = %String::from_utf8_lossy(&content).trim(), "mimetype内容不正确"),
            Err(_) => warn!("缺少mimetype文件"),
        }
    }

    /// 解析container.xml文件
    pub fn parse_container(&mut self) -> Result<Container> {
        let content = self.extract_binary_file(CONTAINER_PATH)?;
        Container::parse_xml(&String::from_utf8_lossy(&content))
    }

    /// 获取包文档路径
    pub fn get_opf_path(&mut self) -> Result<String> {
        let container = self.parse_container()?;
        let path = container.opf_path()?.to_string();
        debug!(opf = %path, "找到包文档");
        Ok(path)
    }

    fn load_package(&mut self, opf_path: &str) -> Result<Book> {
        let content = self.extract_binary_file(opf_path)?;
        let opf = Opf::parse_xml(&content)?;
        let opf_dir = dirname(opf_path).to_string();

        let mut book = Book::empty();
        book.version = opf.version.clone();
        book.identifier_id = opf.identifier_id().unwrap_or(DEFAULT_IDENTIFIER_ID).to_string();
        book.identifier = opf.identifier().unwrap_or_default().to_string();
        book.prefixes = opf.prefixes.clone();
        book.namespaces = opf.namespaces.clone();
        book.metadata = opf.metadata.clone();
        if let Some(title) = book.metadata.title() {
            book.title = title.to_string();
        }
        if let Some(language) = book.metadata.language() {
            book.language = language.to_string();
        }

        for entry in &opf.manifest {
            let content = self.extract_binary_file(&join(&opf_dir, &entry.href))?;
            book.add_item(build_item(entry, content))?;
        }
        debug!(items = book.items().len(), "清单加载完成");

        book.spine = opf.spine.clone();
        book.set_direction(opf.page_progression_direction.clone());
        book.guide = opf.guide.clone();
        book.bindings = opf.bindings.clone();

        if let Some(toc_id) = &opf.spine_toc {
            let ncx = book
                .get_item_with_id(toc_id)
                .ok_or_else(|| EpubError::format(format!("缺少导航文件: {}", toc_id)))?;
            let toc = parse_ncx(&ncx.content, dirname(&ncx.file_name))?;
            book.toc = toc;
            debug!(entries = book.toc.len(), "NCX目录加载完成");
        }

        if book.toc.is_empty() {
            let toc = book
                .items_of_variant(ItemVariant::Nav)
                .next()
                .map(|nav| parse_nav(&nav.content, &nav.file_name));
            if let Some(toc) = toc {
                debug!(entries = toc.len(), "导航文档目录加载完成");
                book.toc = toc;
            }
        }

        Ok(book)
    }
}

/// 按清单项的媒体类型与属性构造条目
fn build_item(entry: &ManifestItem, content: Vec<u8>) -> Item {
    let document = || Document {
        title: html::document_title(&content).unwrap_or_default(),
        properties: entry.properties.clone(),
        ..Document::default()
    };

    let kind = match entry.variant() {
        ItemVariant::Ncx => ItemKind::Ncx,
        ItemVariant::Nav => {
            let mut nav = document();
            nav.properties.retain(|p| p != "nav");
            ItemKind::Nav(nav)
        }
        ItemVariant::CoverPage => ItemKind::CoverPage {
            document: document(),
            image_name: html::first_image_src(&content).unwrap_or_default(),
        },
        ItemVariant::Document => ItemKind::Document(document()),
        ItemVariant::CoverImage => ItemKind::CoverImage,
        ItemVariant::Image => ItemKind::Image,
        ItemVariant::Generic => ItemKind::Generic,
    };

    Item {
        kind,
        ..Item::new(entry.id.as_str(), entry.href.as_str(), entry.media_type.as_str(), content)
    }
}

/// 读取EPUB文件
///
/// # 参数
/// * `path` - epub文件的路径
/// * `options` - 读取选项（插件）
///
/// # 返回值
/// * `Result<Book, EpubError>` - 读取得到的书籍
pub fn read_epub<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Book> {
    let file = File::open(path.as_ref())?;
    EpubReader::new(file, options)?.load()
}

/// 从内存中的EPUB字节读取书籍
pub fn read_epub_from_bytes(bytes: &[u8], options: &ReadOptions) -> Result<Book> {
    EpubReader::new(Cursor::new(bytes), options)?.load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::config::WriteOptions;
    use crate::epub::error::ArchiveError;
    use crate::epub::opf::spine::SpineEntry;
    use crate::epub::toc::{Link, TocEntry, TocHeading};
    use crate::epub::writer::write_epub_to_vec;
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_book(book: &mut Book) -> Vec<u8> {
        write_epub_to_vec(book, &WriteOptions::default()).unwrap()
    }

    fn read_bytes(bytes: Vec<u8>) -> Result<Book> {
        read_epub_from_bytes(&bytes, &ReadOptions::default())
    }

    /// 用给定的成员构造压缩包
    fn build_zip(members: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    #[test]
    fn test_cover_and_chapter_round_trip() {
        let mut book = Book::new();
        book.set_title("T");
        book.add_item(Item::document("chap1.xhtml", "Chapter 1", "<p>Body</p>")).unwrap();
        book.set_cover("cover.jpg", vec![0xff, 0xd8, 0xff], true).unwrap();
        book.add_item(Item::ncx()).unwrap();
        book.add_spine("cover");
        book.add_spine("chapter_0");
        book.toc = vec![TocEntry::link("chap1.xhtml", "Chapter 1")];

        let read = read_bytes(write_book(&mut book)).unwrap();

        assert_eq!(read.title, "T");
        assert_eq!(read.identifier, book.identifier);
        assert_eq!(
            read.spine,
            vec![SpineEntry::with_linear("cover", false), SpineEntry::new("chapter_0")]
        );
        assert_eq!(read.toc.len(), 1);
        match &read.toc[0] {
            TocEntry::Link(link) => {
                assert_eq!(link.href, "chap1.xhtml");
                assert_eq!(link.title, "Chapter 1");
            }
            other => panic!("unexpected toc entry {:?}", other),
        }

        let cover = read.item("cover-img").unwrap();
        assert_eq!(cover.variant(), ItemVariant::CoverImage);
        assert_eq!(cover.content, vec![0xff, 0xd8, 0xff]);
        assert_eq!(read.item("chapter_0").unwrap().title(), "Chapter 1");
        assert_eq!(
            String::from_utf8(read.body_content("chapter_0").unwrap()).unwrap(),
            "<p>Body</p>"
        );
    }

    #[test]
    fn test_body_unchanged_after_repeated_repack() {
        let mut book = Book::new();
        book.add_item(Item::document("chap1.xhtml", "Chapter 1", "<p>Body</p>")).unwrap();
        book.add_item(Item::ncx()).unwrap();
        book.add_spine("chapter_0");
        book.toc = vec![TocEntry::link("chap1.xhtml", "Chapter 1")];

        for _ in 0..2 {
            book = read_bytes(write_book(&mut book)).unwrap();
            assert_eq!(
                String::from_utf8(book.body_content("chapter_0").unwrap()).unwrap(),
                "<p>Body</p>"
            );
        }
    }

    #[test]
    fn test_deep_toc_round_trip_through_ncx() {
        let mut book = Book::new();
        book.add_item(Item::document("a.xhtml", "A", "<p/>")).unwrap();
        book.add_item(Item::ncx()).unwrap();
        book.add_spine("chapter_0");
        book.toc = vec![TocEntry::titled_section(
            "Level 1",
            Some("a.xhtml"),
            vec![TocEntry::titled_section(
                "Level 2",
                Some("a.xhtml#2"),
                vec![TocEntry::Link(Link::new("a.xhtml#3", "Level 3").with_uid("deep"))],
            )],
        )];

        let read = read_bytes(write_book(&mut book)).unwrap();
        assert_eq!(read.toc, book.toc);
    }

    #[test]
    fn test_nav_fallback_when_no_ncx() {
        let mut book = Book::new();
        book.add_item(Item::document("text/a.xhtml", "A", "<p/>")).unwrap();
        let mut nav = Item::nav();
        nav.file_name = "nav/nav.xhtml".to_string();
        book.add_item(nav).unwrap();
        book.add_spine("chapter_0");
        book.toc = vec![TocEntry::titled_section(
            "Part",
            None,
            vec![TocEntry::link("text/a.xhtml", "A")],
        )];

        let read = read_bytes(write_book(&mut book)).unwrap();
        assert!(read.items_of_variant(ItemVariant::Ncx).next().is_none());
        assert_eq!(read.toc, book.toc);
        assert_eq!(read.item("nav").unwrap().variant(), ItemVariant::Nav);
    }

    #[test]
    fn test_metadata_round_trip() {
        let mut book = Book::new();
        book.set_title("Meta");
        book.set_language("ja");
        book.set_direction(Some("rtl".to_string()));
        book.add_author("Author", Some("Author, A"), Some("aut"), "creator");
        book.add_prefix("bkterms", "http://booktype.org/");
        book.add_namespace("calibre", "http://calibre.kovidgoyal.net/2009/metadata");
        book.add_binding("application/x-demo", "impl.xhtml");

        let read = read_bytes(write_book(&mut book)).unwrap();
        assert_eq!(read.version.as_deref(), Some("3.0"));
        assert_eq!(read.language, "ja");
        assert_eq!(read.direction.as_deref(), Some("rtl"));
        assert_eq!(read.identifier_id, "id");
        assert_eq!(read.prefixes, vec!["bkterms: http://booktype.org/".to_string()]);
        assert_eq!(
            read.namespaces.get("calibre").map(String::as_str),
            Some("http://calibre.kovidgoyal.net/2009/metadata")
        );
        assert_eq!(read.bindings, book.bindings);

        let creators = read.metadata.creators();
        assert_eq!(creators.len(), 1);
        assert_eq!(creators[0].name, "Author");
        assert_eq!(creators[0].role.as_deref(), Some("aut"));
        assert_eq!(creators[0].file_as.as_deref(), Some("Author, A"));
        assert!(read.metadata.meta_content("generator").is_some());
    }

    #[test]
    fn test_not_a_zip() {
        let result = read_bytes(vec![b'x'; 1024]);
        assert!(matches!(result, Err(EpubError::Archive(ArchiveError::BadZip(_)))));
    }

    #[test]
    fn test_missing_container() {
        let bytes = build_zip(&[("mimetype", "application/epub+zip")]);
        assert!(matches!(read_bytes(bytes), Err(EpubError::Format(_))));
    }

    #[test]
    fn test_missing_package_document() {
        let bytes = build_zip(&[("mimetype", "application/epub+zip"), (CONTAINER_PATH, CONTAINER)]);
        assert!(matches!(read_bytes(bytes), Err(EpubError::Format(_))));
    }

    #[test]
    fn test_missing_navigation_file() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>X</dc:title></metadata>
  <manifest><item id="a" href="a.xhtml" media-type="application/xhtml+xml"/></manifest>
  <spine toc="ncx"><itemref idref="a"/></spine>
</package>"#;
        let bytes = build_zip(&[
            ("mimetype", "application/epub+zip"),
            (CONTAINER_PATH, CONTAINER),
            ("OEBPS/content.opf", opf),
            ("OEBPS/a.xhtml", "<html><body><p>a</p></body></html>"),
        ]);
        match read_bytes(bytes) {
            Err(EpubError::Format(msg)) => assert!(msg.contains("ncx")),
            other => panic!("expected format error, got {:?}", other.map(|b| b.title)),
        }
    }

    #[test]
    fn test_missing_manifest_member() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata/>
  <manifest><item id="a" href="missing.xhtml" media-type="application/xhtml+xml"/></manifest>
</package>"#;
        let bytes = build_zip(&[(CONTAINER_PATH, CONTAINER), ("OEBPS/content.opf", opf)]);
        assert!(matches!(read_bytes(bytes), Err(EpubError::Format(_))));
    }

    #[test]
    fn test_lenient_mimetype_and_encoded_href() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:identifier id="uid">u-1</dc:identifier></metadata>
  <manifest>
    <item id="a" href="text/chapter%20one.xhtml" media-type="application/xhtml+xml"/>
    <item id="cp" href="cover.xhtml" media-type="application/xhtml+xml" properties="cover"/>
  </manifest>
  <spine><itemref idref="a"/></spine>
</package>"#;
        let bytes = build_zip(&[
            ("mimetype", "application/zip"),
            (CONTAINER_PATH, CONTAINER),
            ("OEBPS/content.opf", opf),
            ("OEBPS/text/chapter one.xhtml", "<html><body><p>1</p></body></html>"),
            ("OEBPS/cover.xhtml", "<html><body><img src=\"images/c.png\"/></body></html>"),
        ]);
        let book = read_bytes(bytes).unwrap();
        assert_eq!(book.identifier_id, "uid");
        assert_eq!(book.identifier, "u-1");
        assert_eq!(book.item("a").unwrap().file_name, "text/chapter one.xhtml");
        assert!(book.toc.is_empty());
        match &book.item("cp").unwrap().kind {
            ItemKind::CoverPage { image_name, .. } => assert_eq!(image_name, "images/c.png"),
            other => panic!("expected cover page, got {:?}", other),
        }
    }

    struct Recorder {
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl plugin::Plugin for Recorder {
        fn after_read(&self, book: &mut Book) -> Result<()> {
            self.calls.borrow_mut().push(format!("book:{}", book.title));
            Ok(())
        }

        fn html_after_read(&self, _book: &mut Book, item_id: &str) -> Result<()> {
            self.calls.borrow_mut().push(format!("html:{}", item_id));
            Ok(())
        }
    }

    #[test]
    fn test_plugins_after_read() {
        let mut book = Book::new();
        book.set_title("Hooks");
        book.add_item(Item::document("a.xhtml", "A", "<p/>")).unwrap();
        book.add_item(Item::image("i.png", vec![1])).unwrap();
        book.add_item(Item::document("b.xhtml", "B", "<p/>")).unwrap();
        let bytes = write_book(&mut book);

        let calls = Rc::new(RefCell::new(Vec::new()));
        let options = ReadOptions::default().with_plugin(Recorder { calls: calls.clone() });
        EpubReader::new(Cursor::new(bytes), &options).unwrap().load().unwrap();

        assert_eq!(
            *calls.borrow(),
            vec!["book:Hooks".to_string(), "html:chapter_0".to_string(), "html:chapter_1".to_string()]
        );
    }

    #[test]
    fn test_read_epub_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut book = Book::new();
        book.set_title("On Disk");
        crate::epub::writer::write_epub(file.path(), &mut book, &WriteOptions::default()).unwrap();

        let read = read_epub(file.path(), &ReadOptions::default()).unwrap();
        assert_eq!(read.title, "On Disk");
        assert!(matches!(
            read_epub(file.path().with_extension("missing"), &ReadOptions::default()),
            Err(EpubError::Io(_))
        ));
    }

    #[test]
    fn test_list_files() {
        let bytes = build_zip(&[("mimetype", "application/epub+zip"), (CONTAINER_PATH, CONTAINER)]);
        let options = ReadOptions::default();
        let reader = EpubReader::new(Cursor::new(bytes), &options).unwrap();
        let mut files = reader.list_files();
        files.sort();
        assert_eq!(files, vec![CONTAINER_PATH.to_string(), "mimetype".to_string()]);
    }

    #[test]
    fn test_ncx_section_href_backfilled() {
        let mut book = Book::new();
        book.add_item(Item::ncx()).unwrap();
        book.toc = vec![TocEntry::section(
            TocHeading::Section(crate::epub::toc::Section::new("Only Heading")),
            vec![TocEntry::link("x.xhtml", "X")],
        )];
        let read = read_bytes(write_book(&mut book)).unwrap();
        match &read.toc[0] {
            TocEntry::Section(section) => {
                assert_eq!(
                    section.heading,
                    TocHeading::Section(crate::epub::toc::Section::new("Only Heading").with_href("x.xhtml"))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
