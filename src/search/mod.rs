//! Search module - persisted full-text index over article titles and paths
//! / 搜索模块 - 文章标题与路径的持久化全文索引
//!
//! Architecture principles / 架构原则：
//! - Search module only exposes primitive operations: rebuild, query,
//!   has_entries; the registry controls staleness, scheduling and recovery
//! - Call direction: registry → search (unidirectional) / 调用方向单向
//!
//! Index features / 索引特性：
//! - SQLite FTS5 storage, WAL mode / SQLite FTS5存储，WAL模式
//! - Rebuild is delete-then-insert per archive inside one transaction,
//!   streamed row by row / 按档案删除后重插，单事务流式写入
//! - Query failures degrade to empty results, never hard errors
//!   / 查询失败降级为空结果，绝不硬失败

pub mod index;
pub mod query;

pub use index::{SearchHit, SearchIndex, DEFAULT_SEARCH_LIMIT};
pub use query::fts_match_expr;
