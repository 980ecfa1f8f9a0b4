use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::{BindingError, DEFAULT_MALWARE_THRESHOLD};

/// 各平台默认的引擎动态库位置
#[cfg(windows)]
pub const DEFAULT_LIBRARY_PATH: &str = "C:\\XvirusSDK\\bin\\Windows\\XvirusSDK.dll";
#[cfg(not(windows))]
pub const DEFAULT_LIBRARY_PATH: &str = "/usr/local/lib/XvirusSDK.so";

/// Xvirus 引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// XvirusSDK 动态库路径
    pub library_path: PathBuf,
    /// 引擎根目录（病毒库、模型、日志），None 表示使用引擎默认值
    pub base_folder: Option<PathBuf>,
    /// 引擎内部日志开关，None 表示不修改
    pub enable_logging: Option<bool>,
    /// 判定阈值
    pub malware_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from(DEFAULT_LIBRARY_PATH),
            base_folder: None,
            enable_logging: None,
            malware_threshold: DEFAULT_MALWARE_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// 从 JSON 文件读取，缺失字段使用默认值
    pub fn from_file(path: &Path) -> Result<Self, BindingError> {
        let content = std::fs::read_to_string(path).map_err(|source| BindingError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| BindingError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}
