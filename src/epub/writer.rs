//! EPUB写出
//!
//! 写出按固定顺序进行：插件处理、`mimetype`、容器描述、包文档、各条目，最后关闭压缩包。
//! 任何一步失败都会中止整个写出，已经写入的部分不会被修复。

use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::Path;

use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::epub::book::Book;
use crate::epub::config::WriteOptions;
use crate::epub::container::{Container, CONTAINER_PATH};
use crate::epub::error::Result;
use crate::epub::html;
use crate::epub::opf::manifest::{Item, ItemKind};
use crate::epub::opf::writer::render_package;
use crate::epub::path::join;
use crate::epub::plugin;
use crate::epub::toc::{render_nav, render_ncx};

/// `mimetype` 文件的内容
pub const EPUB_MIMETYPE: &str = "application/epub+zip";

/// 超过这个大小的条目需要ZIP64
const LARGE_FILE_THRESHOLD: usize = 0xFFFF_FFFF;

/// 将书籍写入任意可定位的输出
pub struct EpubWriter<'a, W: Write + Seek> {
    book: &'a mut Book,
    options: &'a WriteOptions,
    zip: ZipWriter<W>,
}

impl<'a, W: Write + Seek> EpubWriter<'a, W> {
    pub fn new(book: &'a mut Book, options: &'a WriteOptions, writer: W) -> Self {
        Self {
            book,
            options,
            zip: ZipWriter::new(writer),
        }
    }

    /// 执行全部写出步骤
    ///
    /// # 返回值
    /// * `Result<W>` - 写完并关闭压缩包后的底层输出
    pub fn write(mut self) -> Result<W> {
        self.process()?;
        self.write_mimetype()?;
        self.write_container()?;
        self.write_package()?;
        self.write_items()?;
        self.close()
    }

    fn process(&mut self) -> Result<()> {
        plugin::run_before_write(&self.options.plugins, self.book)
    }

    fn write_mimetype(&mut self) -> Result<()> {
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        self.zip.start_file("mimetype", stored)?;
        self.zip.write_all(EPUB_MIMETYPE.as_bytes())?;
        Ok(())
    }

    fn write_container(&mut self) -> Result<()> {
        let container = Container::for_folder(&self.book.folder_name);
        self.write_entry(CONTAINER_PATH, container.to_xml().as_bytes())
    }

    fn write_package(&mut self) -> Result<()> {
        let package = render_package(self.book, self.options)?;
        let path = join(&self.book.folder_name, "content.opf");
        self.write_entry(&path, &package)
    }

    fn write_items(&mut self) -> Result<()> {
        let book: &Book = self.book;
        let mut entries = Vec::with_capacity(book.items().len());

        for item in book.items() {
            let content = match &item.kind {
                ItemKind::Ncx => render_ncx(book)?,
                ItemKind::Nav(_) => render_nav(book, item, self.options)?,
                _ => html::render_document(book, item)?,
            };
            entries.push((archive_path(book, item), content));
        }

        for (path, content) in entries {
            debug!(path = %path, size = content.len(), "写入条目");
            self.write_entry(&path, &content)?;
        }
        Ok(())
    }

    fn write_entry(&mut self, path: &str, content: &[u8]) -> Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(content.len() >= LARGE_FILE_THRESHOLD);
        self.zip.start_file(path, options)?;
        self.zip.write_all(content)?;
        Ok(())
    }

    fn close(self) -> Result<W> {
        let writer = self.zip.finish()?;
        info!(title = %self.book.title, items = self.book.items().len(), "EPUB写出完成");
        Ok(writer)
    }
}

/// 条目在压缩包中的路径：清单条目与导航文件位于包目录下，其余条目按原路径写出
fn archive_path(book: &Book, item: &Item) -> String {
    if item.manifest || matches!(item.kind, ItemKind::Ncx) {
        join(&book.folder_name, &item.file_name)
    } else {
        item.file_name.clone()
    }
}

/// 将书籍写入文件
///
/// # 参数
/// * `path` - 目标文件路径，已存在时覆盖
/// * `book` - 要写出的书籍，写出前插件可能修改它
/// * `options` - 写出选项
pub fn write_epub<P: AsRef<Path>>(path: P, book: &mut Book, options: &WriteOptions) -> Result<()> {
    let file = File::create(path.as_ref())?;
    EpubWriter::new(book, options, file).write()?;
    Ok(())
}

/// 将书籍写入内存，返回完整的EPUB字节
pub fn write_epub_to_vec(book: &mut Book, options: &WriteOptions) -> Result<Vec<u8>> {
    let cursor = EpubWriter::new(book, options, Cursor::new(Vec::new())).write()?;
    Ok(cursor.into_inner())
}
