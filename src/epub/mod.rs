pub mod book;
pub mod config;
pub mod container;
pub mod error;
pub mod html;
pub mod opf;
pub mod path;
pub mod plugin;
pub mod reader;
pub mod toc;
pub mod writer;
pub mod xml;

// 重新导出错误处理
pub use error::{ArchiveError, EpubError, Result};

// 重新导出书籍模型与选项
pub use book::Book;
pub use config::{ReadOptions, WriteOptions};
pub use plugin::Plugin;

// 重新导出容器相关
pub use container::{Container, RootFile};

// 重新导出读写入口
pub use reader::{read_epub, read_epub_from_bytes, EpubReader};
pub use writer::{write_epub, write_epub_to_vec, EpubWriter, EPUB_MIMETYPE};

// 重新导出OPF相关
pub use opf::{
    Binding,
    Creator,
    Document,
    GuideEntry,
    Item,
    ItemKind,
    ItemType,
    ItemVariant,
    ManifestItem,
    Metadata,
    MetadataEntry,
    Opf,
    ResourceLink,
    SpineEntry,
};

// 重新导出目录相关
pub use toc::{
    Link,
    Section,
    TocEntry,
    TocHeading,
    TocSection,
    TocStatistics,
    TocTree,
    TocTreeNode,
    TocTreeStyle,
};
