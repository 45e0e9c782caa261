//! Archive registry and reload orchestration / 档案注册表与重载编排
//!
//! Owns the in-memory mapping of archive id → (reader, metadata), decides
//! per-archive staleness against the persisted snapshot, and schedules
//! index rebuilds either inline (blocking reload) or on background
//! workers. The registry map is the only shared mutable state and sits
//! behind one mutex; the lock is held for map swaps, lookups and count
//! updates only, never across archive I/O or index transactions. A full
//! reload builds the replacement map off-lock and swaps it in atomically,
//! so concurrent lookups observe either the old or the new snapshot.

pub mod scheduler;

pub use scheduler::RebuildScheduler;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::cache::MetaCache;
use crate::config::LibraryConfig;
use crate::models::{Article, ZimMeta};
use crate::search::{SearchHit, SearchIndex};
use crate::utils::get_ext;
use crate::zim::{ArticleIter, ZimReader};

/// Channel depth for streaming articles into a rebuild / 重建流式通道深度
const REBUILD_CHANNEL_DEPTH: usize = 256;

/// One registered archive / 单个已注册档案
#[derive(Clone)]
pub struct ZimEntry {
    pub reader: Arc<ZimReader>,
    pub meta: ZimMeta,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, ZimEntry>,
    /// Stable listing order (discovery order) / 稳定的列表顺序
    order: Vec<String>,
}

/// Per-archive search results, in listing order / 按档案分组的搜索结果
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveHits {
    pub file: String,
    pub hits: Vec<SearchHit>,
}

/// Archive registry / 档案注册表
///
/// Cheap to clone; all state is shared. The service root owns one and
/// hands clones to whatever serves requests.
#[derive(Clone)]
pub struct ZimRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    index: Arc<SearchIndex>,
    cache: Arc<MetaCache>,
    scheduler: Arc<RebuildScheduler>,
    /// Config collaborator input / 配置协作者输入
    library: Arc<RwLock<LibraryConfig>>,
}

impl ZimRegistry {
    pub fn new(index: Arc<SearchIndex>, cache: MetaCache, library: LibraryConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner::default())),
            index,
            cache: Arc::new(cache),
            scheduler: Arc::new(RebuildScheduler::new()),
            library: Arc::new(RwLock::new(library)),
        }
    }

    /// Replace the library configuration used by the next reload
    /// / 替换下次重载使用的库配置
    pub fn set_library_config(&self, config: LibraryConfig) {
        *self.library.write() = config;
    }

    /// Full reload: rediscover archives and refresh stale indexes
    /// / 全量重载：重新发现档案并刷新过期索引
    ///
    /// With `blocking` set, stale archives are reindexed before the new
    /// registry is published. Otherwise readers become available
    /// immediately and rebuilds run on background workers; search results
    /// for those archives lag until their worker finishes.
    ///
    /// Every failure in here is recoverable: a missing directory or an
    /// unreadable archive is logged and skipped, never fatal.
    pub async fn reload(&self, blocking: bool) {
        // 过期判断基线 / Staleness baseline
        let baseline: HashMap<String, ZimMeta> = self
            .cache
            .load()
            .into_iter()
            .map(|m| (m.file.clone(), m))
            .collect();
        let library = self.library.read().clone();

        let mut entries: HashMap<String, ZimEntry> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut stale: Vec<(String, PathBuf)> = Vec::new();
        let mut cache_map: BTreeMap<String, ZimMeta> =
            baseline.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        for dir in &library.zim_dirs {
            let dir = PathBuf::from(dir);
            if !dir.is_dir() {
                tracing::error!("ZIM directory not found: {:?}", dir);
                continue;
            }

            for path in discover_zim_files(&dir) {
                let file_name = match path.file_name().and_then(|n| n.to_str()) {
                    Some(name) => name.to_string(),
                    None => continue,
                };
                if entries.contains_key(&file_name) {
                    tracing::warn!("Duplicate archive file name ignored: {:?}", path);
                    continue;
                }

                let (mtime, size) = match std::fs::metadata(&path) {
                    Ok(stat) => (file_mtime(&stat), stat.len()),
                    Err(e) => {
                        tracing::error!("Failed to stat {}: {}", file_name, e);
                        continue;
                    }
                };

                // 打开失败只隔离此文件 / Open failure isolated to this file
                let open_path = path.clone();
                let reader = match tokio::task::spawn_blocking(move || ZimReader::open(&open_path)).await {
                    Ok(Ok(reader)) => Arc::new(reader),
                    Ok(Err(e)) => {
                        tracing::error!("Failed to load {}: {}", file_name, e);
                        continue;
                    }
                    Err(e) => {
                        tracing::error!("Failed to load {}: {}", file_name, e);
                        continue;
                    }
                };

                let over = library.overrides.get(&file_name);
                let mut meta = ZimMeta {
                    file: file_name.clone(),
                    title: over
                        .and_then(|o| o.title.clone())
                        .unwrap_or_else(|| reader.title().to_string()),
                    lang: reader.language().to_string(),
                    count: baseline.get(&file_name).map(|m| m.count).unwrap_or(0),
                    mtime,
                    size,
                    icon: over.and_then(|o| o.icon.clone()),
                };

                // 过期判断：mtime与size均未变且索引已有行
                // Up to date iff cached mtime AND size match and rows exist
                let up_to_date = baseline
                    .get(&file_name)
                    .map_or(false, |c| c.mtime == mtime && c.size == size)
                    && self.index.has_entries(&file_name).await;

                if up_to_date {
                    tracing::info!("Loaded {} (index up-to-date)", file_name);
                } else if blocking {
                    // an older background job for this id must not race the
                    // inline rebuild; last scheduled wins
                    self.scheduler.cancel(&file_name);
                    let _permit = self.scheduler.acquire_rebuild_slot().await;
                    match rebuild_archive(&self.index, &file_name, &path).await {
                        Ok(count) => {
                            meta.count = count;
                            tracing::info!("Indexed {} with {} articles", file_name, count);
                        }
                        Err(e) => tracing::error!("Failed to index {}: {}", file_name, e),
                    }
                } else {
                    stale.push((file_name.clone(), path.clone()));
                    tracing::info!("Loaded {}; indexing queued", file_name);
                }

                order.push(file_name.clone());
                cache_map.insert(file_name.clone(), meta.clone());
                entries.insert(file_name, ZimEntry { reader, meta });

                // 每处理一个档案就落盘，崩溃时保留已完成条目
                // Persist after each archive; a crash keeps completed entries
                let snapshot: Vec<ZimMeta> = cache_map.values().cloned().collect();
                self.cache.save(&snapshot);
            }
        }

        // 原子换入新注册表 / Atomic registry swap
        {
            let mut inner = self.inner.lock();
            inner.entries = entries;
            inner.order = order;
        }

        for (file, path) in stale {
            self.schedule_rebuild(file, path);
        }
    }

    /// Ordered metadata listing / 有序元数据列表
    ///
    /// Serves the in-memory snapshot when one exists, else the persisted
    /// cache, so a previous successful load keeps listings alive even while
    /// a fresh reload is still running.
    pub fn list_metadata(&self) -> Vec<ZimMeta> {
        let metas: Vec<ZimMeta> = {
            let inner = self.inner.lock();
            inner
                .order
                .iter()
                .filter_map(|f| inner.entries.get(f))
                .map(|e| e.meta.clone())
                .collect()
        };

        if metas.is_empty() {
            self.cache.load()
        } else {
            metas
        }
    }

    /// Direct article fetch / 直接文章获取
    ///
    /// The reader handle is cloned under the lock (brief), the content
    /// fetch itself runs on a blocking thread outside it. Unknown archive
    /// or path reads as `None`.
    pub async fn get_article(&self, zim_id: &str, path: &str) -> Option<Article> {
        let reader = {
            self.inner.lock().entries.get(zim_id).map(|e| e.reader.clone())
        }?;

        let path = path.to_string();
        match tokio::task::spawn_blocking(move || reader.lookup(&path)).await {
            Ok(article) => article,
            Err(e) => {
                tracing::warn!("Article fetch task failed for {}: {}", zim_id, e);
                None
            }
        }
    }

    /// Keyword search, optionally scoped to one archive / 关键词搜索
    pub async fn search(&self, term: &str, limit: usize, zim_id: Option<&str>) -> Vec<SearchHit> {
        self.index.query(term, limit, zim_id).await
    }

    /// Per-archive search in listing order, empty groups omitted
    /// / 按档案顺序分组搜索，省略空分组
    pub async fn search_grouped(&self, term: &str, per_archive_limit: usize) -> Vec<ArchiveHits> {
        let mut groups = Vec::new();
        for meta in self.list_metadata() {
            let hits = self.index.query(term, per_archive_limit, Some(&meta.file)).await;
            if !hits.is_empty() {
                groups.push(ArchiveHits { file: meta.file, hits });
            }
        }
        groups
    }

    /// Whether background rebuilds are still running / 是否仍有后台重建
    pub fn is_indexing(&self) -> bool {
        !self.scheduler.is_idle()
    }

    /// Wait for all in-flight background rebuilds / 等待所有在途后台重建
    pub async fn join_rebuilds(&self) {
        self.scheduler.join_all().await;
    }

    /// 调度一次后台重建，替换同档案的在途任务
    /// / Schedule one background rebuild, superseding any in-flight job
    fn schedule_rebuild(&self, file: String, path: PathBuf) {
        let generation = self.scheduler.next_generation();
        let registry = self.clone();
        let zim_id = file.clone();

        let task = async move {
            // one rebuild transaction at a time against the store
            let Some(_permit) = registry.scheduler.acquire_rebuild_slot().await else {
                return;
            };
            match rebuild_archive(&registry.index, &zim_id, &path).await {
                Ok(count) => registry.finish_rebuild(&zim_id, count),
                Err(e) => tracing::error!("Background index rebuild failed for {}: {}", zim_id, e),
            }
            registry.scheduler.finish(&zim_id, generation);
        };

        self.scheduler.submit(file, generation, task);
    }

    /// 后台重建完成：短暂加锁更新计数并落盘快照
    /// / Worker completion: update the count under a brief lock, persist
    fn finish_rebuild(&self, zim_id: &str, count: u64) {
        let snapshot: Vec<ZimMeta> = {
            let mut inner = self.inner.lock();
            if let Some(entry) = inner.entries.get_mut(zim_id) {
                entry.meta.count = count;
            }
            inner
                .order
                .iter()
                .filter_map(|f| inner.entries.get(f))
                .map(|e| e.meta.clone())
                .collect()
        };
        self.cache.save(&snapshot);
        tracing::info!("Indexed {} with {} articles", zim_id, count);
    }
}

/// Stream every article of one archive into an index rebuild
/// / 将单个档案的全部文章流式写入索引重建
///
/// Opens a fresh enumeration (never reuses a live reader), decodes on a
/// blocking thread and feeds the rebuild transaction through a bounded
/// channel: one article in flight at a time, nothing buffered.
async fn rebuild_archive(index: &SearchIndex, zim_id: &str, path: &Path) -> Result<u64, String> {
    let archive_path = path.to_path_buf();
    let iter = tokio::task::spawn_blocking(move || ArticleIter::open(&archive_path))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())?;

    let (tx, rx) = mpsc::channel::<Article>(REBUILD_CHANNEL_DEPTH);
    let producer = tokio::task::spawn_blocking(move || {
        for article in iter {
            if tx.blocking_send(article).is_err() {
                // consumer gone (rebuild superseded or failed), stop decoding
                break;
            }
        }
    });

    let count = index.rebuild(zim_id, rx).await?;
    if let Err(e) = producer.await {
        tracing::warn!("Article producer for {} ended abnormally: {}", zim_id, e);
    }
    Ok(count)
}

/// Discover *.zim files in one directory, sorted for stable listing order
/// / 发现目录下的ZIM文件，排序保证稳定顺序
fn discover_zim_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    match std::fs::read_dir(dir) {
        Ok(read_dir) => {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.is_file() && get_ext(&path.to_string_lossy()) == "zim" {
                    files.push(path);
                }
            }
        }
        Err(e) => tracing::error!("Failed to read ZIM directory {:?}: {}", dir, e),
    }
    files.sort();
    files
}

fn file_mtime(stat: &std::fs::Metadata) -> i64 {
    stat.modified()
        .ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp())
        .unwrap_or(0)
}
