// 环境变量配置
use std::env;
use std::path::PathBuf;

use crate::engine::BindingError;
use crate::models::config::EngineConfig;

/// Xvirus SDK 环境变量
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SdkEnv {
    /// 引擎动态库路径 (XVIRUS_SDK_LIBRARY)
    pub library_path: Option<PathBuf>,
    /// 引擎根目录 (XVIRUS_BASE_FOLDER)
    pub base_folder: Option<PathBuf>,
    /// 引擎内部日志开关 (XVIRUS_ENGINE_LOGGING)
    pub engine_logging: Option<bool>,
    /// JSON 配置文件 (XVIRUS_CONFIG)
    pub config_file: Option<PathBuf>,
}

impl SdkEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取，空值视为未设置
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            library_path: get("XVIRUS_SDK_LIBRARY").map(PathBuf::from),
            base_folder: get("XVIRUS_BASE_FOLDER").map(PathBuf::from),
            engine_logging: get("XVIRUS_ENGINE_LOGGING").and_then(|v| parse_flag(&v)),
            config_file: get("XVIRUS_CONFIG").map(PathBuf::from),
        }
    }

    /// 将环境变量覆盖到配置上
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(path) = &self.library_path {
            config.library_path = path.clone();
        }
        if let Some(base) = &self.base_folder {
            config.base_folder = Some(base.clone());
        }
        if let Some(enable) = self.engine_logging {
            config.enable_logging = Some(enable);
        }
    }

    /// 配置文件（如有）-> 环境变量，得到最终配置
    pub fn resolve_config(&self) -> Result<EngineConfig, BindingError> {
        let mut config = match &self.config_file {
            Some(path) => {
                tracing::info!("Loading engine config from {}", path.display());
                EngineConfig::from_file(path)?
            }
            None => EngineConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            tracing::warn!("Ignoring unrecognised boolean value: {}", other);
            None
        }
    }
}
