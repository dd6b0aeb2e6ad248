//! 读写钩子
//!
//! 插件按注册顺序调用。每个钩子都有空的默认实现，插件只需实现关心的部分。

use crate::epub::book::Book;
use crate::epub::error::Result;

/// 读写过程中的扩展点
pub trait Plugin {
    /// 用于日志的名称
    fn name(&self) -> &str {
        "plugin"
    }

    /// 写出前，对整本书调用一次
    fn before_write(&self, _book: &mut Book) -> Result<()> {
        Ok(())
    }

    /// 写出前，对每个文档类条目调用一次
    fn html_before_write(&self, _book: &mut Book, _item_id: &str) -> Result<()> {
        Ok(())
    }

    /// 读取完成后，对整本书调用一次
    fn after_read(&self, _book: &mut Book) -> Result<()> {
        Ok(())
    }

    /// 读取完成后，对每个文档类条目调用一次
    fn html_after_read(&self, _book: &mut Book, _item_id: &str) -> Result<()> {
        Ok(())
    }
}

/// 依次执行写出前的钩子
pub(crate) fn run_before_write(plugins: &[Box<dyn Plugin>], book: &mut Book) -> Result<()> {
    if plugins.is_empty() {
        return Ok(());
    }

    for plugin in plugins {
        tracing::debug!(plugin = plugin.name(), "before_write");
        plugin.before_write(book)?;
    }

    for id in document_ids(book) {
        for plugin in plugins {
            plugin.html_before_write(book, &id)?;
        }
    }
    Ok(())
}

/// 依次执行读取后的钩子
pub(crate) fn run_after_read(plugins: &[Box<dyn Plugin>], book: &mut Book) -> Result<()> {
    if plugins.is_empty() {
        return Ok(());
    }

    for plugin in plugins {
        tracing::debug!(plugin = plugin.name(), "after_read");
        plugin.after_read(book)?;
    }

    for id in document_ids(book) {
        for plugin in plugins {
            plugin.html_after_read(book, &id)?;
        }
    }
    Ok(())
}

fn document_ids(book: &Book) -> Vec<String> {
    book.items()
        .iter()
        .filter(|item| item.is_document())
        .map(|item| item.id.clone())
        .collect()
}
