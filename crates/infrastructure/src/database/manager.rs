use std::sync::Arc;
use std::time::Duration;

use adaptor_core::{
    config::{DatabaseConfig, DatabaseType},
    traits::{CustomClusterRepository, RkeClusterRepository, TaskEventRepository, TaskRepository},
    AdaptorError, AdaptorResult,
};
use tracing::{info, warn};

use super::mysql::{
    self, MySqlCustomClusterRepository, MySqlRkeClusterRepository, MySqlTaskEventRepository,
    MySqlTaskRepository,
};
use super::sqlite::{
    self, SqliteCustomClusterRepository, SqliteRkeClusterRepository, SqliteTaskEventRepository,
    SqliteTaskRepository,
};

/// Database connection pool enum
pub enum DatabasePool {
    SQLite(sqlx::SqlitePool),
    MySql(sqlx::MySqlPool),
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> AdaptorResult<Self> {
        let url = config.url();
        match config.db_type {
            DatabaseType::Sqlite => {
                // 内存库的每个连接都是独立数据库，只能使用单连接
                let max_connections = if url == "sqlite::memory:" {
                    1
                } else {
                    config.max_connections
                };
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect(&url)
                    .await?;
                Ok(DatabasePool::SQLite(pool))
            }
            DatabaseType::MySql => {
                let pool = sqlx::mysql::MySqlPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&url)
                    .await?;
                Ok(DatabasePool::MySql(pool))
            }
        }
    }

    pub fn database_type(&self) -> DatabaseType {
        match self {
            DatabasePool::SQLite(_) => DatabaseType::Sqlite,
            DatabasePool::MySql(_) => DatabaseType::MySql,
        }
    }

    pub async fn health_check(&self) -> AdaptorResult<()> {
        match self {
            DatabasePool::SQLite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::MySql(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::SQLite(pool) => pool.close().await,
            DatabasePool::MySql(pool) => pool.close().await,
        }
    }
}

/// Unified database manager
///
/// 启动时建立连接池并执行建表，之后通过工厂方法为各层提供仓储实现。
pub struct DatabaseManager {
    pool: DatabasePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> AdaptorResult<Self> {
        let pool = DatabasePool::new(config).await?;
        Ok(Self { pool })
    }

    /// 连接数据库，失败时按固定间隔重试，耗尽后返回最后一次错误
    pub async fn connect_with_retry(
        config: &DatabaseConfig,
        attempts: u32,
        delay: Duration,
    ) -> AdaptorResult<Self> {
        let attempts = attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match Self::new(config).await {
                Ok(manager) => {
                    info!(
                        "数据库连接成功: {} (第{}次尝试)",
                        config.redacted_url(),
                        attempt
                    );
                    return Ok(manager);
                }
                Err(e) => {
                    warn!(
                        "数据库连接失败 ({}/{}): {}，{}秒后重试",
                        attempt,
                        attempts,
                        e,
                        delay.as_secs()
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AdaptorError::Internal("数据库连接失败".to_string())))
    }

    /// 测试使用的内存库，已完成建表
    pub async fn in_memory() -> AdaptorResult<Self> {
        let config = DatabaseConfig {
            sqlite_path: ":memory:".to_string(),
            ..DatabaseConfig::default()
        };
        let manager = Self::new(&config).await?;
        manager.run_migrations().await?;
        Ok(manager)
    }

    pub fn database_type(&self) -> DatabaseType {
        self.pool.database_type()
    }

    pub async fn run_migrations(&self) -> AdaptorResult<()> {
        match &self.pool {
            DatabasePool::SQLite(pool) => sqlite::run_migrations(pool).await,
            DatabasePool::MySql(pool) => mysql::run_migrations(pool).await,
        }
    }

    pub async fn health_check(&self) -> AdaptorResult<()> {
        self.pool.health_check().await
    }

    pub async fn close(&self) {
        self.pool.close().await
    }

    pub fn rke_cluster_repository(&self) -> Arc<dyn RkeClusterRepository> {
        match &self.pool {
            DatabasePool::SQLite(pool) => Arc::new(SqliteRkeClusterRepository::new(pool.clone())),
            DatabasePool::MySql(pool) => Arc::new(MySqlRkeClusterRepository::new(pool.clone())),
        }
    }

    pub fn custom_cluster_repository(&self) -> Arc<dyn CustomClusterRepository> {
        match &self.pool {
            DatabasePool::SQLite(pool) => {
                Arc::new(SqliteCustomClusterRepository::new(pool.clone()))
            }
            DatabasePool::MySql(pool) => Arc::new(MySqlCustomClusterRepository::new(pool.clone())),
        }
    }

    pub fn task_repository(&self) -> Arc<dyn TaskRepository> {
        match &self.pool {
            DatabasePool::SQLite(pool) => Arc::new(SqliteTaskRepository::new(pool.clone())),
            DatabasePool::MySql(pool) => Arc::new(MySqlTaskRepository::new(pool.clone())),
        }
    }

    pub fn task_event_repository(&self) -> Arc<dyn TaskEventRepository> {
        match &self.pool {
            DatabasePool::SQLite(pool) => Arc::new(SqliteTaskEventRepository::new(pool.clone())),
            DatabasePool::MySql(pool) => Arc::new(MySqlTaskEventRepository::new(pool.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_database_manager() {
        let db_manager = DatabaseManager::in_memory().await.unwrap();
        assert_eq!(db_manager.database_type(), DatabaseType::Sqlite);
        assert!(db_manager.health_check().await.is_ok());

        // 重复执行迁移不会失败
        assert!(db_manager.run_migrations().await.is_ok());

        let _ = db_manager.rke_cluster_repository();
        let _ = db_manager.custom_cluster_repository();
        let _ = db_manager.task_repository();
        let _ = db_manager.task_event_repository();

        db_manager.close().await;
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        let config = DatabaseConfig {
            sqlite_path: "/nonexistent-dir/adaptor/test.db".to_string(),
            ..DatabaseConfig::default()
        };
        let result =
            DatabaseManager::connect_with_retry(&config, 2, Duration::from_millis(10)).await;
        assert!(result.is_err());
    }
}
