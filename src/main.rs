//! Maintenance entry point / 维护入口
//!
//! Loads the configured library, runs a blocking reload (so every stale
//! archive is reindexed before exit) and prints the resulting listing.
//! An optional argument runs a one-shot search against the fresh index.
//! The serving layer consumes the same registry API this binary drives.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mnemo_backend::cache::MetaCache;
use mnemo_backend::config;
use mnemo_backend::registry::ZimRegistry;
use mnemo_backend::search::{SearchIndex, DEFAULT_SEARCH_LIMIT};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mnemo_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Mnemo backend {} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME")
    );

    // Load configuration / 加载配置
    config::init_config().map_err(|e| anyhow::anyhow!(e))?;
    let app_config = config::config();

    // Create data directory if not exists / 创建数据目录
    let data_dir = app_config.get_data_dir();
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!("Created data directory: {:?}", data_dir);
    }

    let index = Arc::new(
        SearchIndex::open(&app_config.get_search_db_path())
            .await
            .map_err(|e| anyhow::anyhow!(e))?,
    );
    let cache = MetaCache::new(app_config.get_meta_cache_path());
    let registry = ZimRegistry::new(index.clone(), cache, app_config.library.clone());

    registry.reload(true).await;

    let metas = registry.list_metadata();
    tracing::info!("Library loaded: {} archives", metas.len());
    for meta in &metas {
        println!(
            "{}\t{}\t{}\t{} articles\t{} bytes",
            meta.file, meta.title, meta.lang, meta.count, meta.size
        );
    }

    // 可选的一次性搜索 / Optional one-shot search
    if let Some(term) = std::env::args().nth(1) {
        let hits = registry.search(&term, DEFAULT_SEARCH_LIMIT, None).await;
        tracing::info!("Search '{}' returned {} hits", term, hits.len());
        for hit in hits {
            println!("{}\t{}\t{}", hit.zim_id, hit.title, hit.path);
        }
    }

    index.close().await;
    Ok(())
}
