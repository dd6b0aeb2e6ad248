use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EpubError>;

/// 压缩包层面的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("不是有效的Zip文件: {0}")]
    BadZip(String),

    #[error("Zip文件过大或使用了不支持的布局: {0}")]
    LargeZip(String),
}

/// Epub相关的错误类型
#[derive(Error, Debug)]
pub enum EpubError {
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("Zip文件错误: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("压缩包错误: {0}")]
    Archive(#[from] ArchiveError),

    #[error("XML解析错误: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("EPUB格式错误: {0}")]
    Format(String),

    #[error("未找到: {0}")]
    NotFound(String),

    #[error("配置文件错误: {0}")]
    ConfigError(String),
}

impl EpubError {
    /// 打开压缩包时的错误映射
    ///
    /// 不支持的压缩包布局（例如超出限制的中央目录）视为 `LargeZip`，
    /// 其余一律视为 `BadZip`。
    pub(crate) fn from_archive_open(err: zip::result::ZipError) -> Self {
        use zip::result::ZipError;

        match err {
            ZipError::Io(e) => EpubError::Io(e),
            ZipError::UnsupportedArchive(msg) => {
                EpubError::Archive(ArchiveError::LargeZip(msg.to_string()))
            }
            other => EpubError::Archive(ArchiveError::BadZip(other.to_string())),
        }
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        EpubError::Format(msg.into())
    }
}
