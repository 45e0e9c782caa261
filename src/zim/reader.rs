use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use zip::result::ZipError;
use zip::ZipArchive;

use super::ZimOpenError;
use crate::models::Article;
use crate::utils::clean_article_path;

/// Entry namespaces inside the container / 容器内条目命名空间
const ARTICLE_NS: &str = "A/";
const META_NS: &str = "M/";
const REDIRECT_NS: &str = "R/";

type Container = ZipArchive<BufReader<File>>;

/// Article title extraction from HTML / 从HTML提取文章标题
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title regex"));

/// Open reader handle for one ZIM archive / 单个ZIM档案的读取句柄
///
/// Embedded metadata is read once at open time. Article content goes
/// through the internal mutex so one handle can serve concurrent lookups.
pub struct ZimReader {
    file_name: String,
    title: String,
    language: String,
    archive: Mutex<Container>,
}

impl ZimReader {
    /// Open an archive file / 打开档案文件
    ///
    /// Fails on unreadable or malformed containers. A failure here is
    /// isolated to this file; callers skip and continue.
    pub fn open(path: &Path) -> Result<Self, ZimOpenError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        // 标题回退链：内嵌Title > 内嵌Name > 文件名
        // Title fallback chain: embedded Title > embedded Name > file name
        let title = read_meta(&mut archive, "Title")
            .or_else(|| read_meta(&mut archive, "Name"))
            .unwrap_or_else(|| file_name.clone());
        let language = read_meta(&mut archive, "Language").unwrap_or_default();

        Ok(Self {
            file_name,
            title,
            language,
            archive: Mutex::new(archive),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Fetch one article by its in-archive path / 按路径获取单篇文章
    ///
    /// Missing entries, broken entries and undecodable content all read
    /// as `None`; nothing escapes past this boundary. A redirect entry
    /// is followed one hop to its target article.
    pub fn lookup(&self, path: &str) -> Option<Article> {
        let path = clean_article_path(path)?;
        let mut archive = self.archive.lock();

        if let Some(bytes) = read_entry(&mut archive, &format!("{}{}", ARTICLE_NS, path)) {
            return Some(make_article(path, bytes));
        }

        // Redirect hop / 重定向跳转
        let target = read_entry(&mut archive, &format!("{}{}", REDIRECT_NS, path))?;
        let target = clean_article_path(decode_text(target).trim())?;
        let bytes = read_entry(&mut archive, &format!("{}{}", ARTICLE_NS, target))?;
        Some(make_article(target, bytes))
    }
}

/// Read an embedded metadata value, best-effort / 读取内嵌元数据值
fn read_meta(archive: &mut Container, key: &str) -> Option<String> {
    let bytes = read_entry(archive, &format!("{}{}", META_NS, key))?;
    let value = decode_text(bytes);
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Read raw entry bytes; any failure reads as absent / 读取条目字节，任何失败视为不存在
fn read_entry(archive: &mut Container, name: &str) -> Option<Vec<u8>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return None,
        Err(e) => {
            tracing::debug!("Unreadable archive entry {}: {}", name, e);
            return None;
        }
    };

    let mut bytes = Vec::new();
    if let Err(e) = entry.read_to_end(&mut bytes) {
        tracing::warn!("Failed to read archive entry {}: {}", name, e);
        return None;
    }
    Some(bytes)
}

/// Best-effort UTF-8 decoding, invalid sequences replaced / 尽力UTF-8解码，无效序列替换
fn decode_text(bytes: Vec<u8>) -> String {
    let (text, _, _) = encoding_rs::UTF_8.decode(&bytes);
    text.into_owned()
}

fn make_article(path: String, bytes: Vec<u8>) -> Article {
    let content = decode_text(bytes);
    Article {
        title: extract_title(&content, &path),
        path,
        content,
    }
}

/// Article title from the HTML `<title>` element, else the file stem
/// / 从HTML的title元素提取文章标题，否则取文件主干名
fn extract_title(html: &str, path: &str) -> String {
    if let Some(caps) = TITLE_RE.captures(html) {
        let title = unescape_title(caps.get(1).map(|m| m.as_str()).unwrap_or(""));
        let title = title.trim();
        if !title.is_empty() {
            return title.to_string();
        }
    }

    let stem = path.rsplit('/').next().unwrap_or(path);
    match stem.rsplit_once('.') {
        Some((name, _)) if !name.is_empty() => name.to_string(),
        _ => stem.to_string(),
    }
}

/// Minimal entity unescape for titles / 标题的最小实体反转义
fn unescape_title(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Streaming article enumeration / 流式文章遍历
///
/// Opens its own container so a rebuild never shares state with live
/// lookups; each call to `open` yields a fresh, restartable sequence.
/// One entry is decoded at a time and can be dropped before the next
/// is produced. Redirect and non-article entries are skipped, and a
/// broken entry skips only itself.
pub struct ArticleIter {
    archive: Container,
    next_index: usize,
    path: PathBuf,
}

impl ArticleIter {
    pub fn open(path: &Path) -> Result<Self, ZimOpenError> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(BufReader::new(file))?;
        Ok(Self {
            archive,
            next_index: 0,
            path: path.to_path_buf(),
        })
    }
}

impl Iterator for ArticleIter {
    type Item = Article;

    fn next(&mut self) -> Option<Article> {
        while self.next_index < self.archive.len() {
            let index = self.next_index;
            self.next_index += 1;

            let mut entry = match self.archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry #{} in {:?}: {}", index, self.path, e);
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }

            let name = entry.name().to_string();
            let Some(article_path) = name.strip_prefix(ARTICLE_NS) else {
                // 非文章命名空间（元数据、重定向等）
                continue;
            };
            if article_path.is_empty() {
                continue;
            }

            let mut bytes = Vec::new();
            if let Err(e) = entry.read_to_end(&mut bytes) {
                tracing::warn!("Skipping broken article {} in {:?}: {}", name, self.path, e);
                continue;
            }

            return Some(make_article(article_path.to_string(), bytes));
        }
        None
    }
}
