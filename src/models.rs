use serde::{Deserialize, Serialize};

/// Last-known metadata for one ZIM archive, keyed by file name.
/// 单个ZIM档案的元数据快照，以文件名为标识
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZimMeta {
    pub file: String,
    pub title: String,
    pub lang: String,
    #[serde(default)]
    pub count: u64,
    pub mtime: i64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// One content entry inside an archive. Fetched on demand, never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub path: String,
    pub content: String,
}
