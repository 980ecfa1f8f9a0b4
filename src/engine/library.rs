// Xvirus 引擎动态库封装
//
// - EngineApi: 每个导出符号对应一个方法
// - EntryPoints 上实现全部编组逻辑（宽字符串编码、结果复制）
// - NativeEngine: 持有 Library 与入口表，原始句柄不对外暴露

use std::path::{Path, PathBuf};

use libloading::Library;
use walkdir::WalkDir;

use super::error::BindingError;
use super::ffi::EntryPoints;
use super::types::{ActionResult, ScanResult, ScanVerdict};
use super::wide::{read_wide, WideString};

/// 引擎能力集合
///
/// 失败通过结果记录的 success/error 返回；只有无法产生记录的情况
/// （文件夹扫描整体失败、报告无法解析、路径无法编码）才使用 `BindingError`。
pub trait EngineApi {
    /// 引擎版本，任何状态下都可调用
    fn version(&self) -> String;

    /// 初始化引擎（打开病毒库、加载模型）
    fn load(&self, force: bool) -> ActionResult;

    /// 释放 load 获取的全部资源
    fn unload(&self) -> ActionResult;

    fn scan(&self, path: &Path) -> ScanResult;

    fn scan_as_string(&self, path: &Path) -> ActionResult;

    /// 递归扫描文件夹，每个文件一条结果（失败项 success = false）
    fn scan_folder(&self, folder: &Path) -> Result<Vec<ScanResult>, BindingError>;

    fn scan_folder_as_string(&self, folder: &Path) -> ActionResult;

    fn check_updates(&self, load_db_after_update: bool) -> ActionResult;

    fn get_settings(&self) -> ActionResult;

    /// 开关引擎内部日志，返回生效后的状态
    fn logging(&self, enable: bool) -> bool;

    /// 设置引擎根目录，返回实际生效的路径
    fn base_folder(&self, folder: &Path) -> Result<PathBuf, BindingError>;
}

/// 统计引擎 scanFolder 会返回的记录数
///
/// 引擎对文件夹下（递归、不跳过任何属性）的每个非目录条目产出一条记录，
/// 返回的数组不带长度，由这里的计数决定读取多少条。
/// 无权访问的条目被跳过不计，与引擎枚举时忽略不可访问条目的行为一致；
/// 计数偏大会导致越界读取。
pub fn count_folder_files(folder: &Path) -> usize {
    if !folder.is_dir() {
        return 0;
    }

    WalkDir::new(folder)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| {
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                // 指向目录的链接按目录处理
                return !entry.path().is_dir();
            }
            !file_type.is_dir()
        })
        .count()
}

impl EngineApi for EntryPoints {
    fn version(&self) -> String {
        unsafe { read_wide((self.version)()) }.unwrap_or_default()
    }

    fn load(&self, force: bool) -> ActionResult {
        tracing::debug!("Calling load(force={})", force);
        let raw = unsafe { (self.load)(force) };
        unsafe { ActionResult::from_raw(&raw) }
    }

    fn unload(&self) -> ActionResult {
        tracing::debug!("Calling unload");
        let raw = unsafe { (self.unload)() };
        unsafe { ActionResult::from_raw(&raw) }
    }

    fn scan(&self, path: &Path) -> ScanResult {
        let path_str = path.display().to_string();
        let wide = match WideString::from_path(path) {
            Ok(w) => w,
            Err(e) => return ScanResult::failed(path_str, e.to_string()),
        };

        tracing::debug!("Calling scan for: {}", path_str);
        let raw = unsafe { (self.scan)(wide.as_ptr()) };
        // 失败记录的 path 可能直接回传了我们的输入指针，必须在 wide 释放前复制
        let result = unsafe { ScanResult::from_raw(&raw, &path_str) };
        drop(wide);
        result
    }

    fn scan_as_string(&self, path: &Path) -> ActionResult {
        let wide = match WideString::from_path(path) {
            Ok(w) => w,
            Err(e) => return ActionResult::failed(e.to_string()),
        };

        tracing::debug!("Calling scanAsString for: {}", path.display());
        let raw = unsafe { (self.scan_as_string)(wide.as_ptr()) };
        unsafe { ActionResult::from_raw(&raw) }
    }

    /// 经由 scanFolderAsString 扫描：JSON 数组自带长度，失败项以 MalwareScore = -1 表示
    fn scan_folder(&self, folder: &Path) -> Result<Vec<ScanResult>, BindingError> {
        let text = self.scan_folder_as_string(folder).into_result()?;
        let verdicts: Vec<ScanVerdict> = serde_json::from_str(&text)?;
        Ok(verdicts.into_iter().map(ScanResult::from).collect())
    }

    fn scan_folder_as_string(&self, folder: &Path) -> ActionResult {
        let wide = match WideString::from_path(folder) {
            Ok(w) => w,
            Err(e) => return ActionResult::failed(e.to_string()),
        };

        tracing::debug!("Calling scanFolderAsString for: {}", folder.display());
        let raw = unsafe { (self.scan_folder_as_string)(wide.as_ptr()) };
        unsafe { ActionResult::from_raw(&raw) }
    }

    fn check_updates(&self, load_db_after_update: bool) -> ActionResult {
        tracing::debug!("Calling checkUpdates(loadDBAfterUpdate={})", load_db_after_update);
        let raw = unsafe { (self.check_updates)(load_db_after_update) };
        unsafe { ActionResult::from_raw(&raw) }
    }

    fn get_settings(&self) -> ActionResult {
        let raw = unsafe { (self.get_settings)() };
        unsafe { ActionResult::from_raw(&raw) }
    }

    fn logging(&self, enable: bool) -> bool {
        unsafe { (self.logging)(enable) != 0 }
    }

    fn base_folder(&self, folder: &Path) -> Result<PathBuf, BindingError> {
        let wide = WideString::from_path(folder)?;
        let effective = unsafe { read_wide((self.base_folder)(wide.as_ptr())) };
        Ok(effective.map(PathBuf::from).unwrap_or_else(|| folder.to_path_buf()))
    }
}

impl EntryPoints {
    /// 直接调用 scanFolder 并读取其返回的记录数组
    ///
    /// 数组不带长度。调用前后各统计一次文件数，只读取两者中较小的条数；
    /// 扫描期间新增的文件会被漏读，删除的文件不会越界。
    ///
    /// # Safety
    /// 文件夹内容在调用期间必须保持不变：若某个文件在计数之后被删除、
    /// 又有别的文件在引擎枚举之后出现，两次计数都会大于引擎分配的条数。
    pub unsafe fn scan_folder_records(&self, folder: &Path) -> Result<Vec<ScanResult>, BindingError> {
        let wide = WideString::from_path(folder)?;
        let before = count_folder_files(folder);

        tracing::debug!(
            "Calling scanFolder for: {} ({} files before call)",
            folder.display(),
            before
        );
        let array = (self.scan_folder)(wide.as_ptr());
        if array.is_null() {
            tracing::warn!("scanFolder returned null for {}", folder.display());
            return Err(BindingError::FolderScanFailed(folder.to_path_buf()));
        }

        let after = count_folder_files(folder);
        let expected = before.min(after);
        if before != after {
            tracing::warn!(
                "Folder {} changed during scan ({} -> {} files), reading {} records",
                folder.display(),
                before,
                after,
                expected
            );
        }
        if expected == 0 {
            return Ok(Vec::new());
        }

        let fallback = folder.display().to_string();
        let records = std::slice::from_raw_parts(array, expected);
        Ok(records
            .iter()
            .map(|raw| ScanResult::from_raw(raw, &fallback))
            .collect())
    }
}

/// 已加载的 Xvirus 引擎动态库
///
/// 入口表在 `library` 之前声明，drop 时先于库卸载失效。
pub struct NativeEngine {
    entry: EntryPoints,
    path: PathBuf,
    _library: Library,
}

impl NativeEngine {
    /// 加载动态库并一次性解析全部符号
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BindingError> {
        let path = path.as_ref().to_path_buf();
        tracing::info!("Loading Xvirus engine library: {}", path.display());

        // 加载任意动态库都会执行其初始化代码，调用方需确保路径可信
        let library = unsafe { Library::new(&path) }.map_err(|source| {
            tracing::error!("Failed to load engine library {}: {}", path.display(), source);
            BindingError::LibraryLoad {
                path: path.clone(),
                source,
            }
        })?;

        let entry = unsafe { EntryPoints::resolve(&library) }.map_err(|e| {
            tracing::error!("Engine library {} is unusable: {}", path.display(), e);
            e
        })?;

        tracing::info!("Resolved all engine entry points from {}", path.display());
        Ok(Self {
            entry,
            path,
            _library: library,
        })
    }

    /// 动态库路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取 scanFolder 原始记录数组
    ///
    /// # Safety
    /// 同 [`EntryPoints::scan_folder_records`]。
    pub unsafe fn scan_folder_records(&self, folder: &Path) -> Result<Vec<ScanResult>, BindingError> {
        self.entry.scan_folder_records(folder)
    }
}

impl std::fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEngine")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl EngineApi for NativeEngine {
    fn version(&self) -> String {
        self.entry.version()
    }

    fn load(&self, force: bool) -> ActionResult {
        self.entry.load(force)
    }

    fn unload(&self) -> ActionResult {
        self.entry.unload()
    }

    fn scan(&self, path: &Path) -> ScanResult {
        self.entry.scan(path)
    }

    fn scan_as_string(&self, path: &Path) -> ActionResult {
        self.entry.scan_as_string(path)
    }

    fn scan_folder(&self, folder: &Path) -> Result<Vec<ScanResult>, BindingError> {
        self.entry.scan_folder(folder)
    }

    fn scan_folder_as_string(&self, folder: &Path) -> ActionResult {
        self.entry.scan_folder_as_string(folder)
    }

    fn check_updates(&self, load_db_after_update: bool) -> ActionResult {
        self.entry.check_updates(load_db_after_update)
    }

    fn get_settings(&self) -> ActionResult {
        self.entry.get_settings()
    }

    fn logging(&self, enable: bool) -> bool {
        self.entry.logging(enable)
    }

    fn base_folder(&self, folder: &Path) -> Result<PathBuf, BindingError> {
        self.entry.base_folder(folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_library() {
        let err = NativeEngine::open("/nonexistent/XvirusSDK.so").unwrap_err();
        assert!(matches!(err, BindingError::LibraryLoad { .. }));
        assert!(err.to_string().contains("/nonexistent/XvirusSDK.so"));
    }

    // libc 不导出引擎符号，解析必须整体失败
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_open_library_without_engine_symbols() {
        let err = NativeEngine::open("libc.so.6").unwrap_err();
        match err {
            BindingError::SymbolNotFound { symbol, .. } => {
                assert!(super::super::ffi::EXPORTED_SYMBOLS.contains(&symbol));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_count_folder_files_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.exe"), b"MZ").unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("nested/b.dll"), b"MZ").unwrap();
        std::fs::write(dir.path().join("nested/deeper/c.txt"), b"hello").unwrap();

        assert_eq!(count_folder_files(dir.path()), 3);
    }

    #[test]
    fn test_count_folder_files_missing_folder() {
        assert_eq!(count_folder_files(Path::new("/nonexistent/folder")), 0);
    }
}
