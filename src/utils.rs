/// Path processing utility functions / 路径处理工具函数

/// Normalize an in-archive article path / 规范化档案内文章路径
/// 1. Replace backslashes with forward slashes / 将反斜杠替换为正斜杠
/// 2. Strip leading slashes and empty segments / 去除开头斜杠和空段
/// 3. Reject traversal segments outright / 拒绝包含 .. 的路径
pub fn clean_article_path(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            _ => parts.push(part),
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Get file extension (lowercase) / 获取文件扩展名
pub fn get_ext(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}
