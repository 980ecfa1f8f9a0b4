// Xvirus 引擎相关类型定义
//
// 引擎返回的原始记录在调用返回后立即复制为这里的自有类型，
// 之后不再持有任何引擎分配的指针。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ffi::{RawActionResult, RawScanResult};
use super::wide::read_wide;

/// 引擎默认的激进度：分数严格大于该值才判定为恶意
pub const DEFAULT_MALWARE_THRESHOLD: f64 = 0.8;

/// 引擎未加载时依赖病毒库的操作返回的错误文本
pub const NOT_LOADED_ERROR: &str = "Engine is not loaded";

/// 非扫描操作的结果（load / unload / getSettings / checkUpdates / 字符串扫描）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// 复制引擎返回的记录
    ///
    /// # Safety
    /// `raw` 中的指针必须为空或指向以 0 结尾的 UTF-16 字符串。
    pub(crate) unsafe fn from_raw(raw: &RawActionResult) -> Self {
        let success = raw.sucess != 0;
        if success {
            Self {
                success,
                result: read_wide(raw.result),
                error: None,
            }
        } else {
            Self {
                success,
                result: None,
                error: read_wide(raw.error),
            }
        }
    }

    /// 失败时的错误文本，引擎没有给出时使用通用描述
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown engine error")
    }

    /// 转换为 Result，成功时返回 result 文本
    pub fn into_result(self) -> Result<String, super::BindingError> {
        if self.success {
            Ok(self.result.unwrap_or_default())
        } else {
            Err(super::BindingError::Engine(self.error_text().to_string()))
        }
    }
}

/// 单文件扫描结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub success: bool,
    pub error: Option<String>,
    pub is_malware: bool,
    pub detection_name: Option<String>,
    pub malware_score: f64,
    pub scanned_path: String,
}

/// 成功扫描的判定结果视图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict<'a> {
    pub is_malware: bool,
    pub detection_name: &'a str,
    pub malware_score: f64,
}

impl ScanResult {
    /// 构造失败结果，判定字段保持为空
    pub fn failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            is_malware: false,
            detection_name: None,
            malware_score: 0.0,
            scanned_path: path.into(),
        }
    }

    /// 复制引擎返回的记录，失败记录中的判定字段被丢弃
    ///
    /// # Safety
    /// `raw` 中的指针必须为空或指向以 0 结尾的 UTF-16 字符串。
    pub(crate) unsafe fn from_raw(raw: &RawScanResult, fallback_path: &str) -> Self {
        let scanned_path = read_wide(raw.path).unwrap_or_else(|| fallback_path.to_string());

        if raw.sucess == 0 {
            let error = read_wide(raw.error).unwrap_or_else(|| "unknown scan error".to_string());
            return Self::failed(scanned_path, error);
        }

        Self {
            success: true,
            error: None,
            is_malware: raw.is_malware != 0,
            detection_name: read_wide(raw.name),
            malware_score: raw.malware_score,
            scanned_path,
        }
    }

    /// 仅在扫描成功时返回判定
    pub fn verdict(&self) -> Option<Verdict<'_>> {
        if !self.success {
            return None;
        }
        Some(Verdict {
            is_malware: self.is_malware,
            detection_name: self.detection_name.as_deref().unwrap_or(""),
            malware_score: self.malware_score,
        })
    }

    pub fn is_threat(&self) -> bool {
        self.verdict().map(|v| v.is_malware).unwrap_or(false)
    }

    /// 分数是否严格超过给定阈值（失败结果总是 false）
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.verdict()
            .map(|v| v.malware_score > threshold)
            .unwrap_or(false)
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.verdict() {
            Some(v) if v.is_malware => write!(
                f,
                "{}: {} ({:.2}%)",
                self.scanned_path,
                v.detection_name,
                v.malware_score * 100.0
            ),
            Some(_) => write!(f, "{}: clean", self.scanned_path),
            None => write!(
                f,
                "{}: error: {}",
                self.scanned_path,
                self.error.as_deref().unwrap_or("unknown scan error")
            ),
        }
    }
}

/// scanAsString / scanFolderAsString 的 JSON 判定格式
///
/// 文件夹扫描中的失败项以 MalwareScore = -1 表示，Name 为错误原因。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanVerdict {
    pub is_malware: bool,
    pub name: String,
    pub malware_score: f64,
    #[serde(default)]
    pub path: String,
}

impl ScanVerdict {
    pub fn is_error(&self) -> bool {
        self.malware_score < 0.0
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.is_error().then_some(self.name.as_str())
    }
}

impl From<ScanVerdict> for ScanResult {
    fn from(verdict: ScanVerdict) -> Self {
        if verdict.is_error() {
            return ScanResult::failed(verdict.path, verdict.name);
        }
        ScanResult {
            success: true,
            error: None,
            is_malware: verdict.is_malware,
            detection_name: Some(verdict.name),
            malware_score: verdict.malware_score,
            scanned_path: verdict.path,
        }
    }
}

/// 引擎病毒库各组件版本
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseVersions {
    #[serde(rename = "AIModel")]
    pub ai_model: i64,
    #[serde(rename = "MainDB")]
    pub main_db: i64,
    #[serde(rename = "DailyDB")]
    pub daily_db: i64,
    #[serde(rename = "WhiteDB")]
    pub white_db: i64,
    #[serde(rename = "DailywlDB")]
    pub dailywl_db: i64,
    #[serde(rename = "HeurDB")]
    pub heur_db: i64,
    #[serde(rename = "HeurDB2")]
    pub heur_db2: i64,
    #[serde(rename = "MalvendorDB")]
    pub malvendor_db: i64,
}

/// getSettings 返回的引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EngineSettings {
    pub enable_signatures: bool,
    pub enable_heuristics: bool,
    #[serde(rename = "EnableAIScan")]
    pub enable_ai_scan: bool,
    /// 1..5，越高越激进
    pub heuristics_level: i32,
    /// 1..100，越高越激进
    #[serde(rename = "AILevel")]
    pub ai_level: i32,
    pub max_scan_length: Option<f64>,
    pub max_heuristics_pe_scan_length: Option<f64>,
    pub max_heuristics_others_scan_length: Option<f64>,
    #[serde(rename = "MaxAIScanLength")]
    pub max_ai_scan_length: Option<f64>,
    #[serde(rename = "CheckSDKUpdates")]
    pub check_sdk_updates: bool,
    pub database_folder: String,
    pub database_version: DatabaseVersions,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enable_signatures: true,
            enable_heuristics: true,
            enable_ai_scan: true,
            heuristics_level: 4,
            ai_level: 10,
            max_scan_length: None,
            max_heuristics_pe_scan_length: Some(20_971_520.0),
            max_heuristics_others_scan_length: Some(10_485_760.0),
            max_ai_scan_length: Some(20_971_520.0),
            check_sdk_updates: true,
            database_folder: "Database".to_string(),
            database_version: DatabaseVersions::default(),
        }
    }
}

impl EngineSettings {
    /// AI 判定阈值，AILevel 越高阈值越低
    pub fn ai_threshold(&self) -> f64 {
        (100.0 - f64::from(self.ai_level)) / 100.0
    }
}

/// checkUpdates 结果分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    Updated,
    UpToDate,
    NewSdkVersion,
    Other(String),
}

impl UpdateStatus {
    pub fn classify(text: &str) -> Self {
        match text.trim() {
            "Database was updated!" => Self::Updated,
            "Database is up-to-date!" => Self::UpToDate,
            "There is a new SDK version available!" => Self::NewSdkVersion,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStatus::Updated => write!(f, "database updated"),
            UpdateStatus::UpToDate => write!(f, "database up to date"),
            UpdateStatus::NewSdkVersion => write!(f, "new SDK version available"),
            UpdateStatus::Other(text) => write!(f, "{}", text),
        }
    }
}

/// 文件夹扫描汇总
#[derive(Debug, Clone, Serialize)]
pub struct FolderScanSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub threats: usize,
    pub failures: usize,
}

impl FolderScanSummary {
    pub fn from_results(started_at: DateTime<Utc>, results: &[ScanResult]) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            total: results.len(),
            threats: results.iter().filter(|r| r.is_threat()).count(),
            failures: results.iter().filter(|r| !r.success).count(),
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::wide::WideString;

    #[test]
    fn test_action_result_from_raw_success() {
        let text = WideString::new("Loaded Successfully").unwrap();
        let raw = RawActionResult {
            sucess: 1,
            result: text.as_ptr(),
            error: std::ptr::null(),
        };
        let result = unsafe { ActionResult::from_raw(&raw) };
        assert!(result.success);
        assert_eq!(result.result.as_deref(), Some("Loaded Successfully"));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_action_result_from_raw_failure_ignores_result() {
        let text = WideString::new("stale").unwrap();
        let error = WideString::new("Database folder not found!").unwrap();
        let raw = RawActionResult {
            sucess: 0,
            result: text.as_ptr(),
            error: error.as_ptr(),
        };
        let result = unsafe { ActionResult::from_raw(&raw) };
        assert!(!result.success);
        assert!(result.result.is_none());
        assert_eq!(result.error_text(), "Database folder not found!");
    }

    #[test]
    fn test_into_result() {
        assert_eq!(ActionResult::ok("done").into_result().unwrap(), "done");
        let err = ActionResult::failed("boom").into_result().unwrap_err();
        assert_eq!(err.to_string(), "engine error: boom");
    }

    #[test]
    fn test_failed_scan_has_no_verdict() {
        let name = WideString::new("Malware").unwrap();
        let error = WideString::new("File not found!").unwrap();
        let raw = RawScanResult {
            sucess: 0,
            error: error.as_ptr(),
            is_malware: 1,
            name: name.as_ptr(),
            malware_score: 1.0,
            path: std::ptr::null(),
        };
        let result = unsafe { ScanResult::from_raw(&raw, "/missing") };
        assert!(!result.success);
        assert!(!result.is_malware);
        assert!(result.verdict().is_none());
        assert!(!result.is_threat());
        assert!(!result.exceeds(0.0));
        assert_eq!(result.scanned_path, "/missing");
        assert_eq!(result.error.as_deref(), Some("File not found!"));
    }

    #[test]
    fn test_successful_scan_verdict() {
        let name = WideString::new("Trojan.Generic").unwrap();
        let path = WideString::new("/samples/eicar.com").unwrap();
        let raw = RawScanResult {
            sucess: 1,
            error: std::ptr::null(),
            is_malware: 1,
            name: name.as_ptr(),
            malware_score: 1.0,
            path: path.as_ptr(),
        };
        let result = unsafe { ScanResult::from_raw(&raw, "ignored") };
        let verdict = result.verdict().unwrap();
        assert!(verdict.is_malware);
        assert_eq!(verdict.detection_name, "Trojan.Generic");
        assert!(result.exceeds(DEFAULT_MALWARE_THRESHOLD));
        assert_eq!(result.scanned_path, "/samples/eicar.com");
        assert_eq!(
            result.to_string(),
            "/samples/eicar.com: Trojan.Generic (100.00%)"
        );
    }

    #[test]
    fn test_scan_verdict_json() {
        let json = r#"{"IsMalware":true,"Name":"AI.97.50","MalwareScore":0.975,"Path":"/tmp/a.exe"}"#;
        let verdict: ScanVerdict = serde_json::from_str(json).unwrap();
        assert!(verdict.is_malware);
        assert_eq!(verdict.name, "AI.97.50");
        assert!(!verdict.is_error());

        let json = r#"{"IsMalware":false,"Name":"File too big!","MalwareScore":-1,"Path":"/tmp/b.iso"}"#;
        let verdict: ScanVerdict = serde_json::from_str(json).unwrap();
        assert_eq!(verdict.failure_reason(), Some("File too big!"));

        let result = ScanResult::from(verdict);
        assert!(!result.success);
        assert!(result.verdict().is_none());
        assert_eq!(result.error.as_deref(), Some("File too big!"));
        assert_eq!(result.scanned_path, "/tmp/b.iso");
    }

    #[test]
    fn test_settings_json_defaults_and_renames() {
        let json = r#"{
            "EnableSignatures": true,
            "EnableHeuristics": false,
            "EnableAIScan": true,
            "HeuristicsLevel": 2,
            "AILevel": 25,
            "MaxScanLength": null,
            "CheckSDKUpdates": false,
            "DatabaseFolder": "Database",
            "DatabaseVersion": { "AIModel": 7, "MainDB": 20240101, "HeurDB2": 3 }
        }"#;
        let settings: EngineSettings = serde_json::from_str(json).unwrap();
        assert!(!settings.enable_heuristics);
        assert_eq!(settings.ai_level, 25);
        assert!(!settings.check_sdk_updates);
        assert_eq!(settings.database_version.ai_model, 7);
        assert_eq!(settings.database_version.main_db, 20240101);
        assert_eq!(settings.database_version.heur_db2, 3);
        assert_eq!(settings.database_version.daily_db, 0);
        // 缺省字段取引擎默认值
        assert_eq!(settings.max_ai_scan_length, Some(20_971_520.0));
        assert!((settings.ai_threshold() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_update_status_classify() {
        assert_eq!(UpdateStatus::classify("Database was updated!"), UpdateStatus::Updated);
        assert_eq!(UpdateStatus::classify("Database is up-to-date!\n"), UpdateStatus::UpToDate);
        assert_eq!(
            UpdateStatus::classify("There is a new SDK version available!"),
            UpdateStatus::NewSdkVersion
        );
        assert_eq!(
            UpdateStatus::classify("mirror offline"),
            UpdateStatus::Other("mirror offline".to_string())
        );
    }

    #[test]
    fn test_folder_summary_counts() {
        let started = Utc::now();
        let results = vec![
            ScanResult {
                success: true,
                error: None,
                is_malware: true,
                detection_name: Some("Malware".to_string()),
                malware_score: 1.0,
                scanned_path: "/a".to_string(),
            },
            ScanResult {
                success: true,
                error: None,
                is_malware: false,
                detection_name: Some("Safe".to_string()),
                malware_score: 0.0,
                scanned_path: "/b".to_string(),
            },
            ScanResult::failed("/c", "File not found!"),
        ];
        let summary = FolderScanSummary::from_results(started, &results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.threats, 1);
        assert_eq!(summary.failures, 1);
        assert!(summary.elapsed_ms() >= 0);
    }
}
