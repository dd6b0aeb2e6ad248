//! 清单模块
//!
//! 定义EPUB包中的各类条目（清单项）以及它们的分类规则。

use std::fmt;

pub const MEDIA_TYPE_XHTML: &str = "application/xhtml+xml";
pub const MEDIA_TYPE_NCX: &str = "application/x-dtbncx+xml";
pub const MEDIA_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// 读取时识别为图片的媒体类型
pub const IMAGE_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/svg+xml", "image/gif"];

/// 扩展名与媒体类型对照表
const MEDIA_TYPES: &[(&str, &str)] = &[
    ("xhtml", MEDIA_TYPE_XHTML),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("webp", "image/webp"),
    ("ncx", MEDIA_TYPE_NCX),
    ("opf", "application/oebps-package+xml"),
    ("xml", "application/xml"),
    ("smil", "application/smil+xml"),
    ("otf", "font/otf"),
    ("ttf", "font/ttf"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("txt", "text/plain"),
];

/// 根据文件名猜测媒体类型
///
/// # 返回值
/// * `(&str, bool)` - 媒体类型，以及是否成功猜出；失败时类型为 `application/octet-stream`
pub fn guess_type(file_name: &str) -> (&'static str, bool) {
    let ext = extension(file_name);
    MEDIA_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, media_type)| (*media_type, true))
        .unwrap_or((MEDIA_TYPE_OCTET_STREAM, false))
}

fn extension(file_name: &str) -> String {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// 按扩展名划分的条目类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    Unknown,
    Image,
    Style,
    Script,
    Navigation,
    Vector,
    Font,
    Video,
    Audio,
    Document,
}

impl ItemType {
    /// 根据文件扩展名判断类别
    pub fn from_file_name(file_name: &str) -> Self {
        match extension(file_name).as_str() {
            "jpg" | "jpeg" | "gif" | "tiff" | "tif" | "png" => ItemType::Image,
            "css" => ItemType::Style,
            "js" => ItemType::Script,
            "ncx" => ItemType::Navigation,
            "svg" => ItemType::Vector,
            "otf" | "woff" | "ttf" => ItemType::Font,
            "mov" | "mp4" | "avi" => ItemType::Video,
            "mp3" | "ogg" => ItemType::Audio,
            _ => ItemType::Unknown,
        }
    }
}

/// 文档中 `<link>` 或 `<script>` 引用的外部资源
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLink {
    pub href: String,
    pub rel: Option<String>,
    pub media_type: Option<String>,
}

impl ResourceLink {
    pub fn stylesheet(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            rel: Some("stylesheet".to_string()),
            media_type: Some("text/css".to_string()),
        }
    }

    pub fn script(src: impl Into<String>) -> Self {
        Self {
            href: src.into(),
            rel: None,
            media_type: Some("text/javascript".to_string()),
        }
    }

    pub fn is_script(&self) -> bool {
        self.media_type.as_deref() == Some("text/javascript")
    }
}

/// XHTML文档的附加信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    /// 覆盖全书语言
    pub lang: Option<String>,
    /// 覆盖全书文字方向
    pub direction: Option<String>,
    pub links: Vec<ResourceLink>,
    /// 清单中的 `properties`
    pub properties: Vec<String>,
    /// 是否参与线性阅读顺序
    pub linear: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            title: String::new(),
            lang: None,
            direction: None,
            links: Vec::new(),
            properties: Vec::new(),
            linear: true,
        }
    }
}

impl Document {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn add_link(&mut self, link: ResourceLink) {
        self.links.push(link);
    }

    /// 指定媒体类型的链接
    pub fn links_of_type<'a>(&'a self, media_type: &'a str) -> impl Iterator<Item = &'a ResourceLink> + 'a {
        self.links
            .iter()
            .filter(move |link| link.media_type.as_deref() == Some(media_type))
    }

    /// 添加属性，已存在时忽略
    pub fn add_property(&mut self, property: impl Into<String>) {
        let property = property.into();
        if !self.properties.contains(&property) {
            self.properties.push(property);
        }
    }
}

/// 条目的具体变体
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    /// 任意内容
    Generic,
    Image,
    /// 封面图片，清单中带 `cover-image` 属性
    CoverImage,
    Document(Document),
    /// 封面页，`image_name` 为封面图片的路径
    CoverPage { document: Document, image_name: String },
    /// EPUB3导航文档
    Nav(Document),
    /// EPUB2导航控制文件
    Ncx,
}

/// 不带数据的条目变体标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemVariant {
    Generic,
    Image,
    CoverImage,
    Document,
    CoverPage,
    Nav,
    Ncx,
}

impl ItemKind {
    pub fn variant(&self) -> ItemVariant {
        match self {
            ItemKind::Generic => ItemVariant::Generic,
            ItemKind::Image => ItemVariant::Image,
            ItemKind::CoverImage => ItemVariant::CoverImage,
            ItemKind::Document(_) => ItemVariant::Document,
            ItemKind::CoverPage { .. } => ItemVariant::CoverPage,
            ItemKind::Nav(_) => ItemVariant::Nav,
            ItemKind::Ncx => ItemVariant::Ncx,
        }
    }
}

/// 书中的一个条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// 为空时在加入书籍时自动分配
    pub id: String,
    /// 相对于包目录的路径
    pub file_name: String,
    /// 为空时在加入书籍时按扩展名推断
    pub media_type: String,
    pub content: Vec<u8>,
    /// 是否写入清单
    pub manifest: bool,
    pub kind: ItemKind,
}

impl Item {
    /// 创建通用条目
    pub fn new(id: impl Into<String>, file_name: impl Into<String>, media_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            media_type: media_type.into(),
            content,
            manifest: true,
            kind: ItemKind::Generic,
        }
    }

    /// 创建图片条目
    pub fn image(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            kind: ItemKind::Image,
            ..Self::new("", file_name, "", content)
        }
    }

    /// 创建XHTML文档条目
    pub fn document(file_name: impl Into<String>, title: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: ItemKind::Document(Document::titled(title)),
            ..Self::new("", file_name, MEDIA_TYPE_XHTML, content.into())
        }
    }

    /// 创建默认的EPUB3导航文档 (`nav` / `nav.xhtml`)
    pub fn nav() -> Self {
        Self {
            kind: ItemKind::Nav(Document::default()),
            ..Self::new("nav", "nav.xhtml", MEDIA_TYPE_XHTML, Vec::new())
        }
    }

    /// 创建默认的NCX文件 (`ncx` / `toc.ncx`)
    pub fn ncx() -> Self {
        Self {
            kind: ItemKind::Ncx,
            ..Self::new("ncx", "toc.ncx", MEDIA_TYPE_NCX, Vec::new())
        }
    }

    /// 创建封面图片 (`cover-img`)
    pub fn cover_image(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            kind: ItemKind::CoverImage,
            ..Self::new("cover-img", file_name, "", content)
        }
    }

    /// 创建封面页 (`cover` / `cover.xhtml`)，默认不参与线性阅读
    pub fn cover_page(image_name: impl Into<String>) -> Self {
        let document = Document {
            linear: false,
            ..Document::titled("Cover")
        };
        Self {
            kind: ItemKind::CoverPage {
                document,
                image_name: image_name.into(),
            },
            ..Self::new("cover", "cover.xhtml", MEDIA_TYPE_XHTML, Vec::new())
        }
    }

    pub fn variant(&self) -> ItemVariant {
        self.kind.variant()
    }

    /// 文档类条目（普通文档、封面页、导航文档）的文档信息
    pub fn document_info(&self) -> Option<&Document> {
        match &self.kind {
            ItemKind::Document(doc) | ItemKind::Nav(doc) => Some(doc),
            ItemKind::CoverPage { document, .. } => Some(document),
            _ => None,
        }
    }

    pub fn document_info_mut(&mut self) -> Option<&mut Document> {
        match &mut self.kind {
            ItemKind::Document(doc) | ItemKind::Nav(doc) => Some(doc),
            ItemKind::CoverPage { document, .. } => Some(document),
            _ => None,
        }
    }

    pub fn is_document(&self) -> bool {
        self.document_info().is_some()
    }

    /// 标题，非文档条目为空
    pub fn title(&self) -> &str {
        self.document_info().map(|d| d.title.as_str()).unwrap_or("")
    }

    /// 条目自身是否参与线性阅读
    pub fn is_linear(&self) -> bool {
        self.document_info().map(|d| d.linear).unwrap_or(true)
    }

    /// 条目类别
    pub fn item_type(&self) -> ItemType {
        match &self.kind {
            ItemKind::Document(_) | ItemKind::CoverPage { .. } | ItemKind::Nav(_) => ItemType::Document,
            ItemKind::Ncx => ItemType::Navigation,
            ItemKind::Image | ItemKind::CoverImage => ItemType::Image,
            ItemKind::Generic => ItemType::from_file_name(&self.file_name),
        }
    }

    /// 为文档添加对另一条目的引用：样式表生成 `<link>`，脚本生成 `<script>`
    pub fn add_item_link(&mut self, other: &Item) {
        let link = match other.item_type() {
            ItemType::Style => ResourceLink::stylesheet(&other.file_name),
            ItemType::Script => ResourceLink::script(&other.file_name),
            _ => return,
        };
        if let Some(doc) = self.document_info_mut() {
            doc.add_link(link);
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:?}:{}:{}>", self.variant(), self.id, self.file_name)
    }
}

/// 根据媒体类型和清单属性决定条目变体
///
/// 这是一个纯函数，读取时的分类只依赖这两个输入。
pub fn classify(media_type: &str, properties: &[String]) -> ItemVariant {
    let has = |p: &str| properties.iter().any(|prop| prop == p);

    if media_type == MEDIA_TYPE_NCX {
        ItemVariant::Ncx
    } else if media_type == MEDIA_TYPE_XHTML {
        if has("nav") {
            ItemVariant::Nav
        } else if has("cover") {
            ItemVariant::CoverPage
        } else {
            ItemVariant::Document
        }
    } else if IMAGE_MEDIA_TYPES.contains(&media_type) {
        if has("cover-image") {
            ItemVariant::CoverImage
        } else {
            ItemVariant::Image
        }
    } else {
        ItemVariant::Generic
    }
}

/// 常见的错误媒体类型修正
pub fn normalize_media_type(media_type: &str) -> &str {
    match media_type {
        "image/jpg" => "image/jpeg",
        other => other,
    }
}
