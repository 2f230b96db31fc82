pub mod log_config;
pub mod log_level;

pub use log_config::{init_logging, LogConfig, LogFormat};
pub use log_level::LogLevel;
