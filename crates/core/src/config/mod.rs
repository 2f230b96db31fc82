//! 配置管理
//!
//! 配置只来自环境变量（`TEST_MODE`、`LOG_LEVEL`、`DB_TYPE`、`DB_PATH`、
//! `MYSQL_*`、`NSQ*`、`CONFIG_DIR` 等），在启动时加载一次并通过构造函数
//! 注入各个组件。

pub mod models;

pub use models::{AppConfig, DatabaseConfig, DatabaseType, MessageQueueConfig};
