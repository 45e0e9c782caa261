//! Application configuration module / 应用配置模块
//!
//! Manages application configuration loaded from config.json
//! Creates default config file on first run / 首次运行时创建默认配置文件

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Global configuration instance / 全局配置实例
static CONFIG: OnceCell<Arc<RwLock<AppConfig>>> = OnceCell::new();

/// Application configuration / 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Archive library configuration / 档案库配置
    #[serde(default)]
    pub library: LibraryConfig,
    /// Storage paths configuration / 存储路径配置
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Archive library configuration: where ZIM files live and how they are
/// presented / 档案库配置：ZIM文件位置及展示方式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directories scanned for *.zim files / 扫描ZIM文件的目录列表
    pub zim_dirs: Vec<String>,
    /// Per-file display overrides keyed by file name / 按文件名的展示覆盖
    #[serde(default)]
    pub overrides: HashMap<String, ZimOverride>,
}

/// Display override for a single archive / 单个档案的展示覆盖
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZimOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Storage paths configuration / 存储路径配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory path / 数据目录路径
    pub data_dir: String,
    /// Metadata snapshot file name (relative to data_dir) / 元数据快照文件名
    pub meta_cache_file: String,
    /// Search index database file name (relative to data_dir) / 搜索索引数据库文件名
    pub search_db_file: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            library: LibraryConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            zim_dirs: vec!["/data/zim".to_string()],
            overrides: HashMap::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            meta_cache_file: "zim_index.json".to_string(),
            search_db_file: "search_index.db".to_string(),
        }
    }
}

impl AppConfig {
    /// Get the full data directory path / 获取完整的数据目录路径
    pub fn get_data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }

    /// Get the metadata snapshot file path / 获取元数据快照文件路径
    pub fn get_meta_cache_path(&self) -> PathBuf {
        self.get_data_dir().join(&self.storage.meta_cache_file)
    }

    /// Get the search index database path / 获取搜索索引数据库路径
    pub fn get_search_db_path(&self) -> PathBuf {
        self.get_data_dir().join(&self.storage.search_db_file)
    }
}

/// Get the config file path / 获取配置文件路径
fn get_config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
pub fn load_config() -> Result<AppConfig, String> {
    load_config_from(&get_config_path())
}

fn load_config_from(config_path: &Path) -> Result<AppConfig, String> {
    if config_path.exists() {
        // Load existing config / 加载现有配置
        let content = std::fs::read_to_string(config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        tracing::info!("Loaded configuration from {:?}", config_path);
        Ok(config)
    } else {
        // Create default config / 创建默认配置
        let config = AppConfig::default();
        save_config_to(config_path, &config)?;
        tracing::info!("Created default configuration at {:?}", config_path);
        Ok(config)
    }
}

/// Save configuration to file / 保存配置到文件
pub fn save_config(config: &AppConfig) -> Result<(), String> {
    save_config_to(&get_config_path(), config)
}

fn save_config_to(config_path: &Path, config: &AppConfig) -> Result<(), String> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    std::fs::write(config_path, content)
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}

/// Initialize global configuration / 初始化全局配置
pub fn init_config() -> Result<Arc<RwLock<AppConfig>>, String> {
    let config = load_config()?;

    let config_arc = Arc::new(RwLock::new(config));

    CONFIG
        .set(config_arc.clone())
        .map_err(|_| "Config already initialized".to_string())?;

    Ok(config_arc)
}

/// Get global configuration instance / 获取全局配置实例
pub fn get_config() -> Arc<RwLock<AppConfig>> {
    CONFIG
        .get_or_init(|| {
            let config = load_config().unwrap_or_default();
            Arc::new(RwLock::new(config))
        })
        .clone()
}

/// Get a read-only snapshot of current config / 获取当前配置的只读快照
pub fn config() -> AppConfig {
    get_config().read().clone()
}
