//! ZIM archive access / ZIM档案访问
//!
//! A ZIM bundle is a ZIP container with namespaced entry paths
//! / ZIM包是带命名空间条目路径的ZIP容器:
//! - `A/<path>` article entries (HTML bodies) / 文章条目
//! - `M/<key>` embedded metadata (`Title`, `Name`, `Language`) / 内嵌元数据
//! - `R/<path>` redirect entries, body holds the target path / 重定向条目
//!
//! Readers are isolated per file: a corrupt bundle fails its own `open`
//! and nothing else. All article decoding is best-effort: invalid byte
//! sequences are replaced, a broken entry reads as absent.

pub mod reader;

pub use reader::{ArticleIter, ZimReader};

use thiserror::Error;

/// Failure to open an archive file / 打开档案文件失败
#[derive(Debug, Error)]
pub enum ZimOpenError {
    #[error("failed to open archive file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid archive container: {0}")]
    Container(#[from] zip::result::ZipError),
}
