// Xvirus 引擎单例和生命周期管理
//
// 设计要点:
// - 引擎是进程级共享状态，由唯一的 EngineManager 持有
// - 每次外部调用都在 engine 锁内完成，load -> scan -> unload 串行执行
// - 依赖病毒库的操作在未加载时直接返回失败记录，不进入引擎
//
// 引擎状态:
// - Unloaded: 未加载
// - Loading: 正在加载病毒库和模型
// - Loaded: 已就绪，可以执行扫描
// - Unloading: 正在释放

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::BindingError;
use super::library::{EngineApi, NativeEngine};
use super::types::{
    ActionResult, EngineSettings, ScanResult, ScanVerdict, UpdateStatus, NOT_LOADED_ERROR,
};
use crate::models::config::EngineConfig;

/// 引擎状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Loaded,
    Unloading,
}

impl EngineState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, EngineState::Loaded)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Unloaded => write!(f, "unloaded"),
            EngineState::Loading => write!(f, "loading"),
            EngineState::Loaded => write!(f, "loaded"),
            EngineState::Unloading => write!(f, "unloading"),
        }
    }
}

/// 锁中毒时继续使用内部数据：真正的引擎状态在原生侧，这里的状态字段始终完整写入
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Xvirus 引擎单例管理器
pub struct EngineManager<E: EngineApi = NativeEngine> {
    engine: Mutex<E>,
    state: Mutex<EngineState>,
    last_error: Mutex<Option<String>>,
}

impl EngineManager<NativeEngine> {
    /// 按配置加载动态库，并应用根目录与日志设置
    ///
    /// 只解析符号，不加载病毒库；调用方随后显式调用 `load`。
    pub fn open(config: &EngineConfig) -> Result<Self, BindingError> {
        let engine = NativeEngine::open(&config.library_path)?;
        tracing::info!("Engine library ready: {}", engine.path().display());
        let manager = Self::new(engine);

        if let Some(base) = &config.base_folder {
            let effective = manager.base_folder(base)?;
            tracing::info!("Engine base folder: {}", effective.display());
        }
        if let Some(enable) = config.enable_logging {
            let state = manager.logging(enable);
            tracing::info!("Engine logging enabled: {}", state);
        }

        Ok(manager)
    }
}

impl<E: EngineApi> EngineManager<E> {
    /// 包装一个已解析的引擎
    pub fn new(engine: E) -> Self {
        Self {
            engine: Mutex::new(engine),
            state: Mutex::new(EngineState::Unloaded),
            last_error: Mutex::new(None),
        }
    }

    /// 获取当前引擎状态
    pub fn state(&self) -> EngineState {
        *lock(&self.state)
    }

    pub fn is_loaded(&self) -> bool {
        self.state().is_loaded()
    }

    /// 最近一次 load/unload/checkUpdates 失败的错误文本
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    fn set_state(&self, state: EngineState) {
        *lock(&self.state) = state;
    }

    fn record_error(&self, error: Option<String>) {
        *lock(&self.last_error) = error;
    }

    // ============ 任意状态可用 ============

    pub fn version(&self) -> String {
        lock(&self.engine).version()
    }

    pub fn logging(&self, enable: bool) -> bool {
        lock(&self.engine).logging(enable)
    }

    pub fn base_folder(&self, folder: &Path) -> Result<PathBuf, BindingError> {
        lock(&self.engine).base_folder(folder)
    }

    // ============ 生命周期 ============

    /// 加载引擎
    ///
    /// 已加载且 force = false 时直接返回成功，不会重新读取病毒库；
    /// force = true 总是从头重新加载。失败后状态回到 Unloaded。
    pub fn load(&self, force: bool) -> ActionResult {
        let engine = lock(&self.engine);

        if !force && self.state().is_loaded() {
            tracing::info!("Engine already loaded");
            return ActionResult::ok("Engine already loaded");
        }

        self.set_state(EngineState::Loading);
        tracing::info!("Loading Xvirus engine (force={})", force);

        let result = engine.load(force);
        if result.success {
            self.set_state(EngineState::Loaded);
            self.record_error(None);
            tracing::info!("Engine state: Loaded");
        } else {
            self.set_state(EngineState::Unloaded);
            tracing::error!("Failed to load Xvirus engine: {}", result.error_text());
            self.record_error(result.error.clone());
        }
        result
    }

    /// 病毒库热重载，等价于 load(force = true)
    pub fn reload(&self) -> ActionResult {
        tracing::info!("Reloading Xvirus engine");
        self.load(true)
    }

    /// 释放引擎
    ///
    /// 未加载时是无害的空操作。无论引擎返回什么，之后都视为 Unloaded，
    /// 保证不会再用卸载前的状态给出判定。
    pub fn unload(&self) -> ActionResult {
        let engine = lock(&self.engine);

        if self.state() == EngineState::Unloaded {
            tracing::debug!("Unload requested while engine is not loaded");
            return ActionResult::ok("Engine already unloaded");
        }

        self.set_state(EngineState::Unloading);
        tracing::info!("Unloading Xvirus engine");

        let result = engine.unload();
        self.set_state(EngineState::Unloaded);
        if result.success {
            self.record_error(None);
        } else {
            tracing::warn!("Engine reported unload failure: {}", result.error_text());
            self.record_error(result.error.clone());
        }
        tracing::info!("Engine state: Unloaded");
        result
    }

    // ============ 仅 Loaded 状态可用 ============

    /// 在 engine 锁内检查状态，未加载时返回 None
    fn loaded_engine(&self) -> Option<MutexGuard<'_, E>> {
        let engine = lock(&self.engine);
        if self.state().is_loaded() {
            Some(engine)
        } else {
            None
        }
    }

    pub fn scan(&self, path: &Path) -> ScanResult {
        let Some(engine) = self.loaded_engine() else {
            tracing::warn!("Scan rejected, engine not loaded: {}", path.display());
            return ScanResult::failed(path.display().to_string(), NOT_LOADED_ERROR);
        };

        let result = engine.scan(path);
        if result.is_threat() {
            tracing::warn!("MALWARE FOUND: {}", result);
        } else if !result.success {
            tracing::debug!("Scan failed: {}", result);
        }
        result
    }

    pub fn scan_as_string(&self, path: &Path) -> ActionResult {
        match self.loaded_engine() {
            Some(engine) => engine.scan_as_string(path),
            None => ActionResult::failed(NOT_LOADED_ERROR),
        }
    }

    pub fn scan_folder(&self, folder: &Path) -> Result<Vec<ScanResult>, BindingError> {
        let Some(engine) = self.loaded_engine() else {
            tracing::warn!("Folder scan rejected, engine not loaded: {}", folder.display());
            return Err(BindingError::Engine(NOT_LOADED_ERROR.to_string()));
        };

        let results = engine.scan_folder(folder)?;
        tracing::info!(
            "Scanned {} file(s) under {}, {} threat(s)",
            results.len(),
            folder.display(),
            results.iter().filter(|r| r.is_threat()).count()
        );
        Ok(results)
    }

    pub fn scan_folder_as_string(&self, folder: &Path) -> ActionResult {
        match self.loaded_engine() {
            Some(engine) => engine.scan_folder_as_string(folder),
            None => ActionResult::failed(NOT_LOADED_ERROR),
        }
    }

    /// 检查病毒库更新
    ///
    /// load_db_after_update = true 时引擎在更新成功后内部执行一次强制重载。
    /// 强制重载会先释放旧的病毒库，因此带重载的检查失败后状态回到 Unloaded。
    pub fn check_updates(&self, load_db_after_update: bool) -> ActionResult {
        let Some(engine) = self.loaded_engine() else {
            return ActionResult::failed(NOT_LOADED_ERROR);
        };

        tracing::info!("Checking for engine updates");
        let result = engine.check_updates(load_db_after_update);
        if result.success {
            tracing::info!("Update check: {}", result.result.as_deref().unwrap_or(""));
        } else {
            tracing::warn!("Update check failed: {}", result.error_text());
            self.record_error(result.error.clone());
            if load_db_after_update {
                self.set_state(EngineState::Unloaded);
                tracing::info!("Engine state: Unloaded");
            }
        }
        result
    }

    pub fn get_settings(&self) -> ActionResult {
        match self.loaded_engine() {
            Some(engine) => engine.get_settings(),
            None => ActionResult::failed(NOT_LOADED_ERROR),
        }
    }

    // ============ 字符串传输的结构化解析 ============

    /// 通过 scanAsString 扫描并解析 JSON 判定
    pub fn scan_verdict(&self, path: &Path) -> Result<ScanVerdict, BindingError> {
        let text = self.scan_as_string(path).into_result()?;
        Ok(serde_json::from_str(&text)?)
    }

    /// 通过 scanFolderAsString 扫描并解析 JSON 判定数组
    pub fn scan_folder_verdicts(&self, folder: &Path) -> Result<Vec<ScanVerdict>, BindingError> {
        let text = self.scan_folder_as_string(folder).into_result()?;
        Ok(serde_json::from_str(&text)?)
    }

    /// 解析 getSettings 的 JSON 配置
    pub fn settings(&self) -> Result<EngineSettings, BindingError> {
        let text = self.get_settings().into_result()?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn check_updates_status(
        &self,
        load_db_after_update: bool,
    ) -> Result<UpdateStatus, BindingError> {
        let text = self.check_updates(load_db_after_update).into_result()?;
        Ok(UpdateStatus::classify(&text))
    }
}

impl<E: EngineApi> Drop for EngineManager<E> {
    fn drop(&mut self) {
        if self.is_loaded() {
            let _ = self.unload();
        }
    }
}
