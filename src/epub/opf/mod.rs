//! OPF（Open Packaging Format）包文档模块
//!
//! 元数据、清单、脊柱的数据结构，以及包文档的解析与生成。

pub mod manifest;
pub mod metadata;
pub mod parser;
pub mod spine;
pub mod writer;

pub use manifest::{Document, Item, ItemKind, ItemType, ItemVariant, ResourceLink};
pub use metadata::{Creator, Metadata, MetadataEntry};
pub use parser::{ManifestItem, Opf};
pub use spine::{Binding, GuideEntry, SpineEntry};
pub use writer::render_package;
