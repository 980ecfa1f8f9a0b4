// 宽字符串编解码
//
// 引擎在所有平台上都以 UTF-16 (NUL 结尾) 传递字符串。
// 传入方向：Rust 字符串/路径 -> 以 0 结尾的 u16 缓冲区
// 传出方向：引擎返回的 *const u16 -> 立即复制为 String

use std::path::Path;

use super::error::BindingError;

/// 引擎使用的宽字符单元
pub type WideChar = u16;

/// 以 NUL 结尾的 UTF-16 缓冲区，调用期间保持存活
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideString(Vec<WideChar>);

impl WideString {
    /// 从 UTF-8 字符串编码，内部含 NUL 时返回错误
    pub fn new(s: &str) -> Result<Self, BindingError> {
        if s.contains('\0') {
            return Err(BindingError::InvalidPath(format!(
                "{:?} contains an interior NUL",
                s
            )));
        }
        let mut buf: Vec<WideChar> = s.encode_utf16().collect();
        buf.push(0);
        Ok(Self(buf))
    }

    /// 从文件系统路径编码
    #[cfg(windows)]
    pub fn from_path(path: &Path) -> Result<Self, BindingError> {
        use std::os::windows::ffi::OsStrExt;

        let mut buf: Vec<WideChar> = path.as_os_str().encode_wide().collect();
        if buf.contains(&0) {
            return Err(BindingError::InvalidPath(format!(
                "{} contains an interior NUL",
                path.display()
            )));
        }
        buf.push(0);
        Ok(Self(buf))
    }

    /// 从文件系统路径编码（非 UTF-8 路径无法无损表示，直接拒绝）
    #[cfg(not(windows))]
    pub fn from_path(path: &Path) -> Result<Self, BindingError> {
        let s = path.to_str().ok_or_else(|| {
            BindingError::InvalidPath(format!("{} is not valid UTF-8", path.display()))
        })?;
        Self::new(s)
    }

    pub fn as_ptr(&self) -> *const WideChar {
        self.0.as_ptr()
    }
}

/// 读取引擎返回的宽字符串并复制为 String
///
/// 空指针返回 None，不成对的代理项会被替换为 U+FFFD。
///
/// # Safety
/// `ptr` 必须为空，或指向一段以 0 结尾、在本次调用期间有效的 UTF-16 序列。
pub unsafe fn read_wide(ptr: *const WideChar) -> Option<String> {
    if ptr.is_null() {
        return None;
    }

    let mut len = 0usize;
    while *ptr.add(len) != 0 {
        len += 1;
    }

    let units = std::slice::from_raw_parts(ptr, len);
    Some(String::from_utf16_lossy(units))
}
