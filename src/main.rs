use clap::Parser;
use epubforge::{read_epub, write_epub, Book, ReadOptions, Result, TocTree, TocTreeStyle, WriteOptions};
use tracing_subscriber::EnvFilter;

/// 📚 EpubForge - EPUB文件处理工具
#[derive(Parser)]
#[command(name = "epubforge")]
#[command(about = "读取、检查并重新打包EPUB文件")]
#[command(version)]
struct Args {
    /// EPUB文件路径
    #[arg(help = "要处理的EPUB文件路径")]
    epub_file: String,

    /// 详细输出模式
    #[arg(short, long, help = "显示详细信息并输出调试日志")]
    verbose: bool,

    /// 显示元数据信息
    #[arg(short, long, help = "显示EPUB元数据信息")]
    metadata: bool,

    /// 显示清单
    #[arg(short = 'f', long, help = "显示清单中的条目")]
    manifest: bool,

    /// 显示目录树
    #[arg(short, long, help = "显示EPUB目录树结构")]
    toc: bool,

    /// 显示指定章节内容
    #[arg(short, long, help = "显示脊柱中指定章节的正文（从1开始）")]
    chapter: Option<usize>,

    /// 章节内容最大显示长度
    #[arg(long, default_value = "2000", help = "章节内容最大显示字符数（0表示不限制）")]
    max_length: usize,

    /// 重新打包输出路径
    #[arg(short, long, help = "读取后重新写出到指定路径")]
    repack: Option<String>,

    /// 写出选项配置文件
    #[arg(long, help = "重新打包时使用的YAML写出选项")]
    config: Option<String>,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    println!("📚 EpubForge - EPUB处理工具");

    if args.verbose {
        println!("🔍 详细模式已启用");
    }

    println!("正在读取EPUB文件: {}", args.epub_file);

    match process_epub(&args) {
        Ok(_) => println!("🎉 EPUB文件处理完成！"),
        Err(e) => {
            eprintln!("❌ 错误: {}", e);
            std::process::exit(1);
        }
    }
}

/// 初始化日志；`RUST_LOG` 优先于命令行开关
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn process_epub(args: &Args) -> Result<()> {
    let mut book = read_epub(&args.epub_file, &ReadOptions::default())?;

    println!("\n📖 {}", if book.title.is_empty() { "(无标题)" } else { book.title.as_str() });
    println!("  共 {} 个条目，脊柱 {} 项", book.items().len(), book.spine.len());

    if args.metadata {
        display_metadata(&book);
    }

    if args.manifest {
        display_manifest(&book, args.verbose);
    }

    if args.toc {
        display_table_of_contents(&book, args.verbose);
    }

    if let Some(index) = args.chapter {
        display_chapter_content(&book, index, args.max_length)?;
    }

    if let Some(output) = &args.repack {
        let options = match &args.config {
            Some(path) => WriteOptions::from_file(path)?,
            None => WriteOptions::default(),
        };
        write_epub(output, &mut book, &options)?;
        println!("\n📦 已重新打包到: {}", output);
    }

    Ok(())
}

/// 显示EPUB元数据信息
fn display_metadata(book: &Book) {
    println!("\n📊 EPUB元数据信息:");

    if let Some(version) = &book.version {
        println!("  📖 EPUB版本: {}", version);
    }

    println!("\n  📚 基本信息:");
    println!("    标题: {}", book.title);
    println!("    标识符: {} [ID: {}]", book.identifier, book.identifier_id);
    println!("    语言: {}", book.language);
    if let Some(direction) = &book.direction {
        println!("    文字方向: {}", direction);
    }

    let creators = book.metadata.creators();
    if !creators.is_empty() {
        println!("    作者:");
        for (i, creator) in creators.iter().enumerate() {
            let mut author_info = format!("      {}. {}", i + 1, creator.name);
            if let Some(role) = &creator.role {
                author_info.push_str(&format!(" ({})", role));
            }
            if let Some(file_as) = &creator.file_as {
                author_info.push_str(&format!(" [排序: {}]", file_as));
            }
            println!("{}", author_info);
        }
    }

    println!("\n  🏷️  全部元数据:");
    for (namespace, name, entries) in book.metadata.iter() {
        for entry in entries {
            let key = match namespace {
                Some(ns) => format!("{{{}}}{}", ns, name),
                None => name.to_string(),
            };
            if entry.value.is_empty() {
                println!("    {} {:?}", key, entry.attributes);
            } else {
                println!("    {} = {}", key, entry.value);
            }
        }
    }
}

/// 显示清单条目
fn display_manifest(book: &Book, verbose: bool) {
    println!("\n🗂️  清单:");
    for (i, item) in book.items().iter().enumerate() {
        if verbose {
            println!(
                "  {}. {} → {} ({}, {:?}, {} 字节)",
                i + 1,
                item.id,
                item.file_name,
                item.media_type,
                item.variant(),
                item.content.len()
            );
        } else {
            println!("  {}. {} ({})", i + 1, item.file_name, item.media_type);
        }
    }

    println!("\n📑 脊柱:");
    for (i, entry) in book.spine.iter().enumerate() {
        let linear = book
            .get_item_with_id(&entry.idref)
            .map(|item| entry.effective_linear(item.is_linear()))
            .unwrap_or(entry.linear);
        let marker = if linear { "" } else { " [非线性]" };
        println!("  {}. {}{}", i + 1, entry.idref, marker);
    }
}

/// 专门显示目录树的函数
fn display_table_of_contents(book: &Book, verbose: bool) {
    println!("\n🌳 目录树:");

    let mut toc_tree = TocTree::from_book(book).with_style(TocTreeStyle::TreeSymbols);
    if verbose {
        // 详细模式：显示文件路径
        toc_tree = toc_tree.with_show_paths(true);
    } else {
        // 简洁模式：不显示文件路径，限制深度为3
        toc_tree = toc_tree.with_show_paths(false).with_max_depth(Some(3));
    }

    println!("  📊 {}", toc_tree.get_statistics());
    println!("\n{}", toc_tree);
}

/// 显示脊柱中指定章节的正文
fn display_chapter_content(book: &Book, index: usize, max_length: usize) -> Result<()> {
    let Some(entry) = index.checked_sub(1).and_then(|i| book.spine.get(i)) else {
        println!("\n⚠️  章节索引 {} 超出范围（共 {} 项）", index, book.spine.len());
        return Ok(());
    };

    let body = book.body_content(&entry.idref)?;
    let text = String::from_utf8_lossy(&body);

    println!("\n📖 章节 {} ({}):", index, entry.idref);
    if max_length > 0 && text.chars().count() > max_length {
        let truncated: String = text.chars().take(max_length).collect();
        println!("{}\n... (已截断，共 {} 字符)", truncated, text.chars().count());
    } else {
        println!("{}", text);
    }
    Ok(())
}
