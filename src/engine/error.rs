// 绑定层错误类型
//
// 引擎自身的业务错误（文件不存在、病毒库损坏等）通过结果记录的
// success/error 字段返回，这里只描述绑定层本身的失败。

use std::path::PathBuf;

/// Xvirus 绑定错误
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    /// 动态库无法加载，后续任何调用都无法进行
    #[error("failed to load engine library {}: {source}", path.display())]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// 动态库缺少导出符号，整个绑定不可用
    #[error("engine library does not export `{symbol}`: {source}")]
    SymbolNotFound {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// 路径无法编码为引擎使用的宽字符串
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// scanFolder 返回了空指针
    #[error("folder scan of {} returned no results", .0.display())]
    FolderScanFailed(PathBuf),

    /// 引擎报告的操作失败（来自 ActionResult.error）
    #[error("engine error: {0}")]
    Engine(String),

    /// 字符串传输格式无法解析
    #[error("malformed engine report: {0}")]
    MalformedReport(#[from] serde_json::Error),

    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BindingError::Engine("Database folder not found!".to_string());
        assert_eq!(err.to_string(), "engine error: Database folder not found!");

        let err = BindingError::FolderScanFailed(PathBuf::from("/srv/samples"));
        assert_eq!(err.to_string(), "folder scan of /srv/samples returned no results");
    }

    #[test]
    fn test_malformed_report_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: BindingError = json_err.into();
        assert!(matches!(err, BindingError::MalformedReport(_)));
        assert!(err.to_string().starts_with("malformed engine report"));
    }
}
