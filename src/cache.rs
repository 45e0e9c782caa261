//! Metadata snapshot cache / 元数据快照缓存
//!
//! Persists the last-known per-archive metadata so an unchanged archive
//! can skip reindexing across restarts, and so listings can be served
//! before the first reload finishes. Strictly best-effort: a missing or
//! corrupt file degrades to an empty snapshot, a failed write is logged
//! and forgotten.

use std::path::PathBuf;

use parking_lot::Mutex;

use crate::models::ZimMeta;

pub struct MetaCache {
    path: PathBuf,
    /// Serializes file writes from concurrent index workers / 串行化并发写入
    write_lock: Mutex<()>,
}

impl MetaCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// 读取快照，缺失或损坏时返回空 / Load snapshot, empty on missing or corrupt
    pub fn load(&self) -> Vec<ZimMeta> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };

        match serde_json::from_str(&content) {
            Ok(metas) => metas,
            Err(e) => {
                tracing::debug!("Metadata cache unreadable, starting empty: {}", e);
                Vec::new()
            }
        }
    }

    /// 覆盖写入快照 / Overwrite the persisted snapshot
    pub fn save(&self, metas: &[ZimMeta]) {
        let _guard = self.write_lock.lock();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        match serde_json::to_string_pretty(metas) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&self.path, content) {
                    tracing::warn!("Failed to persist metadata cache {:?}: {}", self.path, e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize metadata cache: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(file: &str, count: u64) -> ZimMeta {
        ZimMeta {
            file: file.to_string(),
            title: file.to_string(),
            lang: "en".to_string(),
            count,
            mtime: 1_700_000_000,
            size: 42,
            icon: None,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = MetaCache::new(tmp.path().join("zim_index.json"));
        assert!(cache.load().is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/zim_index.json");
        let cache = MetaCache::new(&path);

        cache.save(&[meta("wiki_en.zim", 2), meta("wiki_fr.zim", 7)]);
        assert!(path.exists());

        let loaded = cache.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].file, "wiki_en.zim");
        assert_eq!(loaded[1].count, 7);
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("zim_index.json");
        std::fs::write(&path, "{ not json at all").unwrap();

        let cache = MetaCache::new(&path);
        assert!(cache.load().is_empty());

        // a save recovers the file
        cache.save(&[meta("wiki_en.zim", 1)]);
        assert_eq!(cache.load().len(), 1);
    }
}
