use crate::epub::error::{EpubError, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// `META-INF/container.xml` 在压缩包中的路径
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// 包文件的媒体类型
pub const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Container.xml中的rootfile信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootFile {
    pub full_path: String,
    pub media_type: String,
}

/// Container.xml的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub rootfiles: Vec<RootFile>,
}

impl Container {
    /// 指向 `<folder>/content.opf` 的容器
    pub fn for_folder(folder_name: &str) -> Self {
        Self {
            rootfiles: vec![RootFile {
                full_path: format!("{}/content.opf", folder_name),
                media_type: PACKAGE_MEDIA_TYPE.to_string(),
            }],
        }
    }

    /// 生成container.xml内容
    pub fn to_xml(&self) -> String {
        let mut xml = String::from(
            "<?xml version='1.0' encoding='utf-8'?>\n\
             <container xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\" version=\"1.0\">\n  <rootfiles>\n",
        );
        for rootfile in &self.rootfiles {
            xml.push_str(&format!(
                "    <rootfile full-path=\"{}\" media-type=\"{}\"/>\n",
                quick_xml::escape::escape(rootfile.full_path.as_str()),
                quick_xml::escape::escape(rootfile.media_type.as_str()),
            ));
        }
        xml.push_str("  </rootfiles>\n</container>\n");
        xml
    }

    /// 解析container.xml内容
    ///
    /// # 参数
    /// * `xml_content` - container.xml的文件内容
    ///
    /// # 返回值
    /// * `Result<Container, EpubError>` - 解析后的Container信息
    pub fn parse_xml(xml_content: &str) -> Result<Container> {
        let mut reader = Reader::from_str(xml_content);
        reader.config_mut().trim_text(true);
        reader.config_mut().expand_empty_elements = true;

        let mut rootfiles = Vec::new();
        let mut buf = Vec::new();
        let mut in_rootfiles = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let local_name = e.local_name();
                    match local_name.as_ref() {
                        b"rootfiles" => {
                            in_rootfiles = true;
                        }
                        b"rootfile" if in_rootfiles => {
                            let mut full_path = String::new();
                            let mut media_type = String::new();

                            for attr_result in e.attributes() {
                                let attr = attr_result.map_err(|e| EpubError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
                                match attr.key.local_name().as_ref() {
                                    b"full-path" => full_path = attr.unescape_value()?.into_owned(),
                                    b"media-type" => media_type = attr.unescape_value()?.into_owned(),
                                    _ => {}
                                }
                            }

                            if !full_path.is_empty() {
                                rootfiles.push(RootFile { full_path, media_type });
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) => {
                    if e.local_name().as_ref() == b"rootfiles" {
                        in_rootfiles = false;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(Container { rootfiles })
    }

    /// 获取包文件路径
    ///
    /// # 返回值
    /// * `Result<&str>` - 第一个媒体类型为包文件的rootfile；没有时返回格式错误
    pub fn opf_path(&self) -> Result<&str> {
        self.rootfiles
            .iter()
            .find(|rootfile| rootfile.media_type == PACKAGE_MEDIA_TYPE)
            .map(|rootfile| rootfile.full_path.as_str())
            .ok_or_else(|| EpubError::format("container.xml中没有包文件"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_container_xml() {
        let container_xml = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles>
        <rootfile full-path="OEBPS/toc.ncx" media-type="application/x-dtbncx+xml"/>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
    </rootfiles>
</container>"#;

        let container = Container::parse_xml(container_xml).unwrap();
        assert_eq!(container.rootfiles.len(), 2);
        assert_eq!(container.opf_path().unwrap(), "OEBPS/content.opf");
    }

    #[test]
    fn test_missing_package_rootfile() {
        let container_xml = r#"<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles><rootfile full-path="toc.ncx" media-type="application/x-dtbncx+xml"/></rootfiles>
</container>"#;
        let container = Container::parse_xml(container_xml).unwrap();
        assert!(matches!(container.opf_path(), Err(EpubError::Format(_))));

        let empty = Container::parse_xml("<container/>").unwrap();
        assert!(empty.rootfiles.is_empty());
        assert!(empty.opf_path().is_err());
    }

    #[test]
    fn test_generated_container_parses_back() {
        let container = Container::for_folder("EPUB");
        let xml = container.to_xml();
        assert!(xml.contains("full-path=\"EPUB/content.opf\""));
        assert_eq!(Container::parse_xml(&xml).unwrap(), container);
    }
}
