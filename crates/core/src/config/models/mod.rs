pub mod app_config;
pub mod database;
pub mod message_queue;

pub use app_config::AppConfig;
pub use database::{DatabaseConfig, DatabaseType};
pub use message_queue::MessageQueueConfig;
