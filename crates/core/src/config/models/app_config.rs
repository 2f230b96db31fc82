use std::collections::HashMap;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment};
use serde::{Deserialize, Serialize};

use super::{
    database::{DatabaseConfig, DatabaseType},
    message_queue::MessageQueueConfig,
};
use crate::logging::{LogConfig, LogFormat, LogLevel};
use crate::models::DEFAULT_KUBERNETES_VERSION;

/// 环境变量的扁平视图，键名为小写的环境变量名
#[derive(Debug, Deserialize)]
struct EnvSettings {
    #[serde(default)]
    test_mode: bool,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_log_format")]
    log_format: String,
    #[serde(default)]
    db_type: String,
    #[serde(default = "default_db_path")]
    db_path: String,
    #[serde(default = "default_mysql_host")]
    mysql_host: String,
    #[serde(default = "default_mysql_port")]
    mysql_port: u16,
    #[serde(default = "default_mysql_user")]
    mysql_user: String,
    #[serde(default)]
    mysql_pass: String,
    #[serde(default = "default_mysql_db")]
    mysql_db: String,
    nsqd_server: Option<String>,
    nsq_lookupd_server: Option<String>,
    #[serde(default = "default_config_dir")]
    config_dir: String,
    #[serde(default = "default_worker_concurrency")]
    worker_concurrency: usize,
    #[serde(default = "default_describe_concurrency")]
    describe_concurrency: usize,
    #[serde(default = "default_kubernetes_version")]
    default_kubernetes_version: String,
    metrics_listen: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_db_path() -> String {
    DatabaseConfig::default().sqlite_path
}

fn default_mysql_host() -> String {
    DatabaseConfig::default().mysql_host
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_mysql_user() -> String {
    "root".to_string()
}

fn default_mysql_db() -> String {
    "console".to_string()
}

fn default_config_dir() -> String {
    "/tmp".to_string()
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_describe_concurrency() -> usize {
    8
}

fn default_kubernetes_version() -> String {
    DEFAULT_KUBERNETES_VERSION.to_string()
}

/// System configuration
///
/// 进程启动时从环境变量加载一次，之后通过构造函数传递给各组件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub test_mode: bool,
    pub log: LogConfig,
    pub database: DatabaseConfig,
    pub message_queue: MessageQueueConfig,
    /// 状态目录根路径
    pub config_dir: String,
    pub worker_concurrency: usize,
    pub describe_concurrency: usize,
    pub default_kubernetes_version: String,
    pub metrics_listen: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            test_mode: false,
            log: LogConfig::default(),
            database: DatabaseConfig::default(),
            message_queue: MessageQueueConfig::default(),
            config_dir: default_config_dir(),
            worker_concurrency: default_worker_concurrency(),
            describe_concurrency: default_describe_concurrency(),
            default_kubernetes_version: default_kubernetes_version(),
            metrics_listen: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from process environment variables
    pub fn load() -> Result<Self> {
        Self::from_environment(Environment::default())
    }

    /// Load configuration from an explicit variable map (tests)
    pub fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        Self::from_environment(Environment::default().source(Some(vars)))
    }

    fn from_environment(environment: Environment) -> Result<Self> {
        let settings: EnvSettings = ConfigBuilder::builder()
            .add_source(environment)
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        let defaults = DatabaseConfig::default();
        let config = AppConfig {
            test_mode: settings.test_mode,
            log: LogConfig {
                level: settings
                    .log_level
                    .parse::<LogLevel>()
                    .map_err(|e| anyhow::anyhow!(e.to_string()))?,
                format: LogFormat::parse(&settings.log_format)?,
            },
            database: DatabaseConfig {
                db_type: DatabaseType::parse(&settings.db_type)?,
                sqlite_path: settings.db_path,
                mysql_host: settings.mysql_host,
                mysql_port: settings.mysql_port,
                mysql_user: settings.mysql_user,
                mysql_pass: settings.mysql_pass,
                mysql_db: settings.mysql_db,
                ..defaults
            },
            message_queue: MessageQueueConfig {
                nsqd_server: settings
                    .nsqd_server
                    .unwrap_or_else(|| MessageQueueConfig::default().nsqd_server),
                nsq_lookupd_server: settings
                    .nsq_lookupd_server
                    .unwrap_or_else(|| MessageQueueConfig::default().nsq_lookupd_server),
            },
            config_dir: settings.config_dir,
            worker_concurrency: settings.worker_concurrency,
            describe_concurrency: settings.describe_concurrency,
            default_kubernetes_version: settings.default_kubernetes_version,
            metrics_listen: settings.metrics_listen.filter(|s| !s.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        let mut redacted = self.clone();
        if !redacted.database.mysql_pass.is_empty() {
            redacted.database.mysql_pass = "***".to_string();
        }
        toml::to_string_pretty(&redacted).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;

        if self.config_dir.is_empty() {
            return Err(anyhow::anyhow!("CONFIG_DIR不能为空"));
        }
        if self.worker_concurrency == 0 {
            return Err(anyhow::anyhow!("WORKER_CONCURRENCY必须大于0"));
        }
        if self.describe_concurrency == 0 {
            return Err(anyhow::anyhow!("DESCRIBE_CONCURRENCY必须大于0"));
        }
        if self.default_kubernetes_version.is_empty() {
            return Err(anyhow::anyhow!("DEFAULT_KUBERNETES_VERSION不能为空"));
        }

        Ok(())
    }
}
