// Xvirus 引擎异步服务
//
// 引擎的所有导出函数都是同步阻塞的，这里把每次调用放到 tokio 的阻塞线程池，
// 串行化仍由 EngineManager 内部的锁保证。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::engine::{
    ActionResult, EngineApi, EngineManager, EngineSettings, EngineState, FolderScanSummary,
    NativeEngine, ScanResult, UpdateStatus,
};
use crate::models::config::EngineConfig;

/// Xvirus 引擎服务
pub struct EngineService<E: EngineApi = NativeEngine> {
    manager: Arc<EngineManager<E>>,
}

impl<E: EngineApi> Clone for EngineService<E> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl EngineService<NativeEngine> {
    /// 按配置打开引擎动态库
    pub async fn open(config: EngineConfig) -> Result<Self> {
        let manager = tokio::task::spawn_blocking(move || EngineManager::open(&config))
            .await
            .context("engine open task panicked")?
            .context("failed to open Xvirus engine library")?;
        Ok(Self::new(Arc::new(manager)))
    }
}

impl<E> EngineService<E>
where
    E: EngineApi + Send + 'static,
{
    pub fn new(manager: Arc<EngineManager<E>>) -> Self {
        Self { manager }
    }

    /// 在阻塞线程池中执行一次引擎调用
    async fn call<T, F>(&self, name: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&EngineManager<E>) -> T + Send + 'static,
    {
        let manager = self.manager.clone();
        tokio::task::spawn_blocking(move || f(&manager))
            .await
            .with_context(|| format!("engine call `{}` panicked", name))
    }

    pub fn state(&self) -> EngineState {
        self.manager.state()
    }

    pub async fn version(&self) -> Result<String> {
        self.call("version", |m| m.version()).await
    }

    /// 加载引擎，失败时返回引擎给出的错误文本
    pub async fn load(&self, force: bool) -> Result<String> {
        let result = self.call("load", move |m| m.load(force)).await?;
        Ok(result.into_result()?)
    }

    pub async fn unload(&self) -> Result<ActionResult> {
        self.call("unload", |m| m.unload()).await
    }

    pub async fn scan(&self, path: PathBuf) -> Result<ScanResult> {
        self.call("scan", move |m| m.scan(&path)).await
    }

    /// 扫描文件夹并生成汇总
    pub async fn scan_folder(&self, folder: PathBuf) -> Result<(Vec<ScanResult>, FolderScanSummary)> {
        let started_at = Utc::now();
        let results = self
            .call("scanFolder", move |m| m.scan_folder(&folder))
            .await??;
        let summary = FolderScanSummary::from_results(started_at, &results);
        Ok((results, summary))
    }

    pub async fn check_updates(&self, load_db_after_update: bool) -> Result<UpdateStatus> {
        let status = self
            .call("checkUpdates", move |m| m.check_updates_status(load_db_after_update))
            .await??;
        Ok(status)
    }

    pub async fn settings(&self) -> Result<EngineSettings> {
        Ok(self.call("getSettings", |m| m.settings()).await??)
    }

    pub async fn logging(&self, enable: bool) -> Result<bool> {
        self.call("logging", move |m| m.logging(enable)).await
    }

    /// 关闭服务：已加载时卸载引擎
    pub async fn shutdown(&self) -> Result<()> {
        if self.manager.is_loaded() {
            let result = self.unload().await?;
            if !result.success {
                tracing::warn!("Engine unload reported: {}", result.error_text());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BindingError;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubEngine {
        loaded: AtomicBool,
    }

    impl EngineApi for StubEngine {
        fn version(&self) -> String {
            "4.2.0.0".to_string()
        }
        fn load(&self, _force: bool) -> ActionResult {
            self.loaded.store(true, Ordering::SeqCst);
            ActionResult::ok("Loaded Successfully")
        }
        fn unload(&self) -> ActionResult {
            self.loaded.store(false, Ordering::SeqCst);
            ActionResult::ok("Unloaded Successfully")
        }
        fn scan(&self, path: &Path) -> ScanResult {
            ScanResult {
                success: true,
                error: None,
                is_malware: false,
                detection_name: Some("Safe".to_string()),
                malware_score: 0.0,
                scanned_path: path.display().to_string(),
            }
        }
        fn scan_as_string(&self, _path: &Path) -> ActionResult {
            ActionResult::failed("unsupported")
        }
        fn scan_folder(&self, folder: &Path) -> Result<Vec<ScanResult>, BindingError> {
            Ok(vec![
                self.scan(&folder.join("a")),
                ScanResult::failed(folder.join("b").display().to_string(), "File too big!"),
            ])
        }
        fn scan_folder_as_string(&self, _folder: &Path) -> ActionResult {
            ActionResult::failed("unsupported")
        }
        fn check_updates(&self, _load_db_after_update: bool) -> ActionResult {
            ActionResult::ok("There is a new SDK version available!")
        }
        fn get_settings(&self) -> ActionResult {
            ActionResult::ok("{}")
        }
        fn logging(&self, enable: bool) -> bool {
            enable
        }
        fn base_folder(&self, folder: &Path) -> Result<PathBuf, BindingError> {
            Ok(folder.to_path_buf())
        }
    }

    fn service() -> EngineService<StubEngine> {
        EngineService::new(Arc::new(EngineManager::new(StubEngine {
            loaded: AtomicBool::new(false),
        })))
    }

    #[tokio::test]
    async fn test_service_lifecycle() {
        let service = service();
        assert_eq!(service.version().await.unwrap(), "4.2.0.0");
        assert_eq!(service.state(), EngineState::Unloaded);

        assert_eq!(service.load(false).await.unwrap(), "Loaded Successfully");
        assert_eq!(service.state(), EngineState::Loaded);

        let result = service.scan(PathBuf::from("/tmp/x")).await.unwrap();
        assert!(result.success);

        service.shutdown().await.unwrap();
        assert_eq!(service.state(), EngineState::Unloaded);

        let result = service.scan(PathBuf::from("/tmp/x")).await.unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_service_folder_summary() {
        let service = service();
        service.load(false).await.unwrap();

        let (results, summary) = service.scan_folder(PathBuf::from("/srv")).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.threats, 0);
    }

    #[tokio::test]
    async fn test_service_updates_and_settings() {
        let service = service();
        assert!(service.check_updates(false).await.is_err());

        service.load(false).await.unwrap();
        assert_eq!(
            service.check_updates(false).await.unwrap(),
            UpdateStatus::NewSdkVersion
        );
        assert_eq!(service.settings().await.unwrap(), EngineSettings::default());
        assert!(service.logging(true).await.unwrap());
    }
}
