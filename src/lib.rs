// xvirus-binding/src/lib.rs
//
// 模块声明，导出所有子模块

pub mod engine;
pub mod env;
pub mod models;
pub mod services;

// 重新导出常用类型和常量
pub use engine::{BindingError, EngineApi, EngineManager, EngineState, NativeEngine};
pub use env::SdkEnv;
pub use models::config::EngineConfig;
pub use services::EngineService;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
