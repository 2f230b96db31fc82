//! 云适配器核心定义
//!
//! 包含错误类型、配置、日志、领域模型以及各层之间的抽象接口。

pub mod cancel;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use cancel::Cancellation;
pub use errors::{AdaptorError, AdaptorResult};
