pub mod epub;

// === 核心API重新导出 ===

/// 书籍模型（主要接口）
pub use epub::Book;

/// 读取与写出
pub use epub::{read_epub, read_epub_from_bytes, write_epub, write_epub_to_vec, EpubReader, EpubWriter};

/// 读写选项与插件
pub use epub::{Plugin, ReadOptions, WriteOptions};

/// 错误处理
pub use epub::{ArchiveError, EpubError, Result};

// === 数据结构 ===

/// 条目
pub use epub::{Document, Item, ItemKind, ItemType, ItemVariant, ResourceLink};

/// 元数据
pub use epub::{Creator, Metadata, MetadataEntry};

/// 脊柱、导引与绑定
pub use epub::{Binding, GuideEntry, SpineEntry};

/// 目录
pub use epub::{Link, Section, TocEntry, TocHeading, TocSection};

// === 底层组件（高级用法） ===

/// 容器组件
pub use epub::{Container, RootFile};

/// OPF组件
pub use epub::{ManifestItem, Opf};

/// 目录树展示
pub use epub::{TocStatistics, TocTree, TocTreeNode, TocTreeStyle};

// === 库信息 ===

/// EpubForge库的版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// EpubForge库的描述
pub const DESCRIPTION: &str = "EPUB电子书的读取与生成库";

// === 便捷函数 ===

/// 使用默认选项读取EPUB文件
///
/// 这是 [`read_epub`] 的便捷包装函数。
///
/// # 参数
/// * `path` - EPUB文件路径
///
/// # 返回值
/// * `Result<Book>` - 读取得到的书籍
///
/// # 示例
///
/// ```no_run
/// let book = epubforge::open("book.epub")?;
/// println!("书名: {}", book.title);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Book> {
    read_epub(path, &ReadOptions::default())
}

/// 使用默认选项写出EPUB文件
///
/// # 示例
///
/// ```no_run
/// let mut book = epubforge::Book::new();
/// book.set_title("Example");
/// epubforge::save("example.epub", &mut book)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn save<P: AsRef<std::path::Path>>(path: P, book: &mut Book) -> Result<()> {
    write_epub(path, book, &WriteOptions::default())
}
