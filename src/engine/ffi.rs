// Xvirus 引擎 FFI 绑定层
// 对齐 xvneng.h 中的导出符号与结构体布局

use libloading::Library;

use super::error::BindingError;
use super::wide::WideChar;

// ============ 导出符号名 ============

pub const LOAD_SYMBOL: &str = "load";
pub const UNLOAD_SYMBOL: &str = "unload";
pub const SCAN_SYMBOL: &str = "scan";
pub const SCAN_AS_STRING_SYMBOL: &str = "scanAsString";
pub const SCAN_FOLDER_SYMBOL: &str = "scanFolder";
pub const SCAN_FOLDER_AS_STRING_SYMBOL: &str = "scanFolderAsString";
pub const CHECK_UPDATES_SYMBOL: &str = "checkUpdates";
pub const GET_SETTINGS_SYMBOL: &str = "getSettings";
pub const LOGGING_SYMBOL: &str = "logging";
pub const BASE_FOLDER_SYMBOL: &str = "baseFolder";
pub const VERSION_SYMBOL: &str = "version";

/// 兼容引擎必须导出的全部符号
pub const EXPORTED_SYMBOLS: [&str; 11] = [
    VERSION_SYMBOL,
    LOAD_SYMBOL,
    UNLOAD_SYMBOL,
    SCAN_SYMBOL,
    SCAN_AS_STRING_SYMBOL,
    SCAN_FOLDER_SYMBOL,
    SCAN_FOLDER_AS_STRING_SYMBOL,
    CHECK_UPDATES_SYMBOL,
    GET_SETTINGS_SYMBOL,
    LOGGING_SYMBOL,
    BASE_FOLDER_SYMBOL,
];

// ============ C 结构体布局 ============

/// struct ActionResult { bool sucess; wchar_t *result; wchar_t *error; }
///
/// bool 按单字节读取，任何非 0 值视为 true。
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct RawActionResult {
    pub sucess: u8,
    pub result: *const WideChar,
    pub error: *const WideChar,
}

/// struct ScanResult { bool sucess; wchar_t *error; bool isMalware;
///                     wchar_t *name; double malwareScore; wchar_t *path; }
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct RawScanResult {
    pub sucess: u8,
    pub error: *const WideChar,
    pub is_malware: u8,
    pub name: *const WideChar,
    pub malware_score: f64,
    pub path: *const WideChar,
}

// ============ 函数指针类型 ============

pub type LoadFn = unsafe extern "C" fn(force: bool) -> RawActionResult;
pub type UnloadFn = unsafe extern "C" fn() -> RawActionResult;
pub type ScanFn = unsafe extern "C" fn(filepath: *const WideChar) -> RawScanResult;
pub type ScanAsStringFn = unsafe extern "C" fn(filepath: *const WideChar) -> RawActionResult;
pub type ScanFolderFn = unsafe extern "C" fn(folder_path: *const WideChar) -> *const RawScanResult;
pub type ScanFolderAsStringFn =
    unsafe extern "C" fn(folder_path: *const WideChar) -> RawActionResult;
pub type CheckUpdatesFn = unsafe extern "C" fn(load_db_after_update: bool) -> RawActionResult;
pub type GetSettingsFn = unsafe extern "C" fn() -> RawActionResult;
pub type LoggingFn = unsafe extern "C" fn(enable_logging: bool) -> u8;
pub type BaseFolderFn = unsafe extern "C" fn(base_folder: *const WideChar) -> *const WideChar;
pub type VersionFn = unsafe extern "C" fn() -> *const WideChar;

/// 已解析的入口表
///
/// 函数指针只在对应的 `Library` 存活期间有效，由 `NativeEngine` 保证二者同生命周期。
#[derive(Debug, Copy, Clone)]
pub struct EntryPoints {
    pub(crate) version: VersionFn,
    pub(crate) load: LoadFn,
    pub(crate) unload: UnloadFn,
    pub(crate) scan: ScanFn,
    pub(crate) scan_as_string: ScanAsStringFn,
    pub(crate) scan_folder: ScanFolderFn,
    pub(crate) scan_folder_as_string: ScanFolderAsStringFn,
    pub(crate) check_updates: CheckUpdatesFn,
    pub(crate) get_settings: GetSettingsFn,
    pub(crate) logging: LoggingFn,
    pub(crate) base_folder: BaseFolderFn,
}

impl EntryPoints {
    /// 一次性解析全部导出符号
    ///
    /// 任何一个符号缺失都会让整个解析失败，不会返回部分可用的入口表。
    ///
    /// # Safety
    /// `library` 必须是符合 xvneng.h 约定的引擎库，且在返回的入口表被使用期间保持加载。
    pub unsafe fn resolve(library: &Library) -> Result<Self, BindingError> {
        Ok(Self {
            version: lookup(library, VERSION_SYMBOL)?,
            load: lookup(library, LOAD_SYMBOL)?,
            unload: lookup(library, UNLOAD_SYMBOL)?,
            scan: lookup(library, SCAN_SYMBOL)?,
            scan_as_string: lookup(library, SCAN_AS_STRING_SYMBOL)?,
            scan_folder: lookup(library, SCAN_FOLDER_SYMBOL)?,
            scan_folder_as_string: lookup(library, SCAN_FOLDER_AS_STRING_SYMBOL)?,
            check_updates: lookup(library, CHECK_UPDATES_SYMBOL)?,
            get_settings: lookup(library, GET_SETTINGS_SYMBOL)?,
            logging: lookup(library, LOGGING_SYMBOL)?,
            base_folder: lookup(library, BASE_FOLDER_SYMBOL)?,
        })
    }
}

/// 按名称解析单个符号并复制出函数指针
unsafe fn lookup<T: Copy>(library: &Library, symbol: &'static str) -> Result<T, BindingError> {
    tracing::trace!("Resolving engine symbol: {}", symbol);
    let sym = library
        .get::<T>(symbol.as_bytes())
        .map_err(|source| BindingError::SymbolNotFound { symbol, source })?;
    Ok(*sym)
}
