// Xvirus 引擎绑定模块
//
// 此模块提供 Xvirus 原生引擎的 Rust 动态绑定，包括：
// - 动态库加载与导出符号解析
// - 请求/响应记录布局与宽字符串编组
// - 引擎单例生命周期管理

pub mod error;
pub mod ffi;
pub mod library;
pub mod manager;
pub mod types;
pub mod wide;


pub use error::BindingError;
pub use library::{count_folder_files, EngineApi, NativeEngine};
pub use manager::{EngineManager, EngineState};
pub use types::*;
