//! 读写选项
//!
//! 选项可以直接构造，也可以从YAML文件加载。插件不属于YAML配置，只能在代码中挂载。

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::epub::error::{EpubError, Result};
use crate::epub::plugin::Plugin;

/// 写出选项
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// 生成EPUB2的 `<guide>`
    pub epub2_guide: bool,
    /// 在导航文档中生成landmarks
    pub epub3_landmark: bool,
    /// landmarks的标题
    pub landmark_title: String,
    /// 在 `<spine>` 上写出 `page-progression-direction`
    pub spine_direction: bool,
    /// 在 `<package>` 上写出 `dir`
    pub package_direction: bool,
    /// `dcterms:modified` 使用的时间，缺省为当前时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub plugins: Vec<Box<dyn Plugin>>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            epub2_guide: true,
            epub3_landmark: true,
            landmark_title: "Guide".to_string(),
            spine_direction: true,
            package_direction: false,
            mtime: None,
            plugins: Vec::new(),
        }
    }
}

impl fmt::Debug for WriteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteOptions")
            .field("epub2_guide", &self.epub2_guide)
            .field("epub3_landmark", &self.epub3_landmark)
            .field("landmark_title", &self.landmark_title)
            .field("spine_direction", &self.spine_direction)
            .field("package_direction", &self.package_direction)
            .field("mtime", &self.mtime)
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

impl WriteOptions {
    /// 从YAML文本解析，未给出的字段取默认值
    ///
    /// # 参数
    /// * `content` - YAML文本
    ///
    /// # 返回值
    /// * `Result<Self>` - 格式错误时返回 `ConfigError`
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yml::from_str(content)
            .map_err(|e| EpubError::ConfigError(format!("配置文件格式错误: {}", e)))
    }

    /// 从YAML文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| EpubError::ConfigError(format!("无法读取配置文件: {}", e)))?;
        Self::from_yaml_str(&content)
    }

    /// 序列化为YAML（不含插件）
    pub fn to_yaml(&self) -> Result<String> {
        serde_yml::to_string(self)
            .map_err(|e| EpubError::ConfigError(format!("序列化配置失败: {}", e)))
    }

    /// 挂载插件
    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn with_mtime(mut self, mtime: DateTime<Utc>) -> Self {
        self.mtime = Some(mtime);
        self
    }
}

/// 读取选项
#[derive(Default)]
pub struct ReadOptions {
    pub plugins: Vec<Box<dyn Plugin>>,
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

impl ReadOptions {
    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }
}
