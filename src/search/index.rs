//! 搜索索引 - SQLite FTS5 持久化存储
//!
//! 存储方案：
//! - articles虚拟表：每篇已索引文章一行 (zim_id, title, path)
//! - index_meta表：每个档案的最近索引时间
//!
//! 特性：
//! - WAL模式 + busy_timeout（并发安全）/ WAL mode + busy_timeout
//! - 重建为单事务"删除后重插"，逐行流式消费，不缓冲整个档案
//! - 查询失败记录警告并返回空结果 / Query failures log a warning, return empty

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tokio::sync::mpsc;

use super::query::fts_match_expr;
use crate::models::Article;

/// Result cap applied when the caller does not pass one / 默认结果上限
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// 搜索命中 / Search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub zim_id: String,
    pub title: String,
    pub path: String,
}

/// 数据库搜索索引 / Database search index
pub struct SearchIndex {
    db: Pool<Sqlite>,
}

impl SearchIndex {
    /// 打开（或创建）索引数据库 / Open (or create) the index database
    pub async fn open(db_path: &Path) -> Result<Self, String> {
        // 确保目录存在 / Ensure directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        // Connection-level pragmas so every pooled connection gets them,
        // not just the first one handed out.
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(10_000));

        let db = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| e.to_string())?;

        let index = Self { db };
        index.init().await?;

        tracing::info!("Search database ready: {:?} (WAL mode)", db_path);
        Ok(index)
    }

    /// 初始化表结构，只在不存在时创建 / Create tables if missing
    async fn init(&self) -> Result<(), String> {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS articles USING fts5(
                zim_id, title, path
            )
            "#,
        )
        .execute(&self.db)
        .await
        .map_err(|e| e.to_string())?;

        // 每个档案的索引时间记录 / Per-archive index bookkeeping
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                zim_id TEXT PRIMARY KEY,
                indexed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await
        .map_err(|e| e.to_string())?;

        Ok(())
    }

    /// 重建单个档案的索引 / Rebuild the index rows for one archive
    ///
    /// One atomic unit of work: delete every existing row for `zim_id`,
    /// insert one row per article received on the channel, commit. The
    /// channel is bounded, so arbitrarily large archives stream through
    /// without being buffered. Returns the inserted row count.
    pub async fn rebuild(
        &self,
        zim_id: &str,
        mut articles: mpsc::Receiver<Article>,
    ) -> Result<u64, String> {
        let mut tx = self.db.begin().await.map_err(|e| e.to_string())?;

        sqlx::query("DELETE FROM articles WHERE zim_id = ?")
            .bind(zim_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.to_string())?;

        let mut count = 0u64;
        while let Some(article) = articles.recv().await {
            sqlx::query("INSERT INTO articles (zim_id, title, path) VALUES (?, ?, ?)")
                .bind(zim_id)
                .bind(&article.title)
                .bind(&article.path)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.to_string())?;
            count += 1;
        }

        tx.commit().await.map_err(|e| e.to_string())?;

        // 记录索引时间（记录失败不影响重建结果）
        // Bookkeeping failure does not fail the rebuild
        let now = Utc::now().to_rfc3339();
        if let Err(e) = sqlx::query(
            "INSERT OR REPLACE INTO index_meta (zim_id, indexed_at) VALUES (?, ?)",
        )
        .bind(zim_id)
        .bind(&now)
        .execute(&self.db)
        .await
        {
            tracing::warn!("Failed to record index time for {}: {}", zim_id, e);
        }

        Ok(count)
    }

    /// 关键词查询 / Keyword query
    ///
    /// Up to `limit` matches, optionally restricted to one archive.
    /// Malformed input or an unavailable index yields an empty result
    /// and a logged warning, never an error.
    pub async fn query(&self, term: &str, limit: usize, zim_id: Option<&str>) -> Vec<SearchHit> {
        let Some(expr) = fts_match_expr(term) else {
            return Vec::new();
        };

        let result: Result<Vec<(String, String, String)>, sqlx::Error> = match zim_id {
            Some(id) => {
                sqlx::query_as(
                    r#"
                    SELECT zim_id, title, path
                    FROM articles
                    WHERE zim_id = ? AND articles MATCH ?
                    LIMIT ?
                    "#,
                )
                .bind(id)
                .bind(&expr)
                .bind(limit as i64)
                .fetch_all(&self.db)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT zim_id, title, path
                    FROM articles
                    WHERE articles MATCH ?
                    LIMIT ?
                    "#,
                )
                .bind(&expr)
                .bind(limit as i64)
                .fetch_all(&self.db)
                .await
            }
        };

        match result {
            Ok(rows) => rows
                .into_iter()
                .map(|(zim_id, title, path)| SearchHit { zim_id, title, path })
                .collect(),
            Err(e) => {
                tracing::warn!("Search query failed: {}", e);
                Vec::new()
            }
        }
    }

    /// 档案是否已有索引行（用于过期判断）
    /// / Existence probe used for staleness decisions
    pub async fn has_entries(&self, zim_id: &str) -> bool {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM articles WHERE zim_id = ? LIMIT 1")
            .bind(zim_id)
            .fetch_optional(&self.db)
            .await
            .ok()
            .flatten();
        row.is_some()
    }

    /// 档案的索引行数 / Indexed row count for one archive
    pub async fn entry_count(&self, zim_id: &str) -> u64 {
        let row: Option<(i64,)> = sqlx::query_as("SELECT COUNT(*) FROM articles WHERE zim_id = ?")
            .bind(zim_id)
            .fetch_optional(&self.db)
            .await
            .ok()
            .flatten();
        row.map(|(n,)| n as u64).unwrap_or(0)
    }

    /// 档案的最近索引时间 / Last index time for one archive
    pub async fn last_indexed(&self, zim_id: &str) -> Option<DateTime<Utc>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT indexed_at FROM index_meta WHERE zim_id = ?")
                .bind(zim_id)
                .fetch_optional(&self.db)
                .await
                .ok()
                .flatten();

        row.and_then(|(ts,)| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// 关闭数据库连接池 / Close database connection pool
    pub async fn close(&self) {
        self.db.close().await;
    }

    /// 直接插入一行（测试用，绕过重建事务）
    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, zim_id: &str, title: &str, path: &str) {
        sqlx::query("INSERT INTO articles (zim_id, title, path) VALUES (?, ?, ?)")
            .bind(zim_id)
            .bind(title)
            .bind(path)
            .execute(&self.db)
            .await
            .expect("raw insert");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_index(dir: &tempfile::TempDir) -> SearchIndex {
        SearchIndex::open(&dir.path().join("search_index.db"))
            .await
            .unwrap()
    }

    fn article(title: &str, path: &str) -> Article {
        Article {
            title: title.to_string(),
            path: path.to_string(),
            content: String::new(),
        }
    }

    /// Feed a fixed set of articles through the streaming rebuild API
    async fn rebuild_with(index: &SearchIndex, zim_id: &str, articles: Vec<Article>) -> u64 {
        let (tx, rx) = mpsc::channel(8);
        let producer = tokio::spawn(async move {
            for article in articles {
                if tx.send(article).await.is_err() {
                    break;
                }
            }
        });
        let count = index.rebuild(zim_id, rx).await.unwrap();
        producer.await.unwrap();
        count
    }

    #[tokio::test]
    async fn test_rebuild_and_query() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open_index(&tmp).await;

        let count = rebuild_with(
            &index,
            "wiki_en.zim",
            vec![
                article("African Elephant", "African_Elephant.html"),
                article("Lion", "Lion.html"),
            ],
        )
        .await;
        assert_eq!(count, 2);
        assert!(index.has_entries("wiki_en.zim").await);
        assert!(index.last_indexed("wiki_en.zim").await.is_some());

        let hits = index.query("Elephant", DEFAULT_SEARCH_LIMIT, None).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].zim_id, "wiki_en.zim");
        assert_eq!(hits[0].path, "African_Elephant.html");

        assert!(index.query("Zebra", DEFAULT_SEARCH_LIMIT, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_replaces_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open_index(&tmp).await;

        rebuild_with(
            &index,
            "a.zim",
            vec![article("One", "one.html"), article("Two", "two.html")],
        )
        .await;
        let count = rebuild_with(&index, "a.zim", vec![article("Three", "three.html")]).await;

        assert_eq!(count, 1);
        assert_eq!(index.entry_count("a.zim").await, 1);
        assert!(index.query("One", DEFAULT_SEARCH_LIMIT, None).await.is_empty());
        assert_eq!(index.query("Three", DEFAULT_SEARCH_LIMIT, None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_is_isolated_per_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open_index(&tmp).await;

        rebuild_with(&index, "a.zim", vec![article("Elephant", "e.html")]).await;
        rebuild_with(&index, "b.zim", vec![article("Elephant Seal", "s.html")]).await;

        // rebuilding a touches nothing in b
        rebuild_with(&index, "a.zim", vec![article("Elephant", "e.html")]).await;
        assert_eq!(index.entry_count("b.zim").await, 1);

        let scoped = index.query("Elephant", DEFAULT_SEARCH_LIMIT, Some("b.zim")).await;
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].zim_id, "b.zim");
    }

    #[tokio::test]
    async fn test_query_limit_and_bad_input() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open_index(&tmp).await;

        let articles = (0..10)
            .map(|i| article(&format!("Elephant {}", i), &format!("e{}.html", i)))
            .collect();
        rebuild_with(&index, "a.zim", articles).await;

        assert_eq!(index.query("Elephant", 3, None).await.len(), 3);

        // FTS syntax in raw input must not error out
        assert!(index.query("(((", DEFAULT_SEARCH_LIMIT, None).await.is_empty());
        assert!(!index
            .query("\"Elephant)", DEFAULT_SEARCH_LIMIT, None)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_empty_archive_clears_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let index = open_index(&tmp).await;

        rebuild_with(&index, "a.zim", vec![article("Elephant", "e.html")]).await;
        let count = rebuild_with(&index, "a.zim", vec![]).await;

        assert_eq!(count, 0);
        assert!(!index.has_entries("a.zim").await);
    }
}
