//! 压缩包内路径工具
//!
//! EPUB内部路径总是使用 `/` 分隔，与宿主系统无关，因此这里不借助 `std::path`。

use percent_encoding::percent_decode_str;

/// 返回路径的目录部分（不含结尾的 `/`）
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => path[..idx].trim_end_matches('/'),
        None => "",
    }
}

/// 拼接两段路径，第二段为绝对路径时直接返回第二段
pub fn join(base: &str, path: &str) -> String {
    if path.starts_with('/') || base.is_empty() {
        path.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// 规范化路径，消除 `.`、`..` 以及重复的分隔符
pub fn normpath(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// 计算 `path` 相对于目录 `start` 的相对路径
pub fn relpath(path: &str, start: &str) -> String {
    let path = normpath(path);
    let start = normpath(if start.is_empty() { "." } else { start });

    let split = |p: &str| -> Vec<String> {
        p.split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .map(str::to_string)
            .collect()
    };

    let path_parts = split(&path);
    let start_parts = split(&start);

    let common = path_parts
        .iter()
        .zip(start_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result: Vec<String> = vec!["..".to_string(); start_parts.len() - common];
    result.extend(path_parts[common..].iter().cloned());

    if result.is_empty() {
        ".".to_string()
    } else {
        result.join("/")
    }
}

/// 解码清单中经过百分号编码的href
pub fn unquote(href: &str) -> String {
    percent_decode_str(href).decode_utf8_lossy().into_owned()
}
