pub mod mysql_cluster_repository;
pub mod mysql_event_repository;
pub mod mysql_task_repository;

pub use mysql_cluster_repository::{MySqlCustomClusterRepository, MySqlRkeClusterRepository};
pub use mysql_event_repository::MySqlTaskEventRepository;
pub use mysql_task_repository::MySqlTaskRepository;

use adaptor_core::AdaptorResult;
use sqlx::MySqlPool;
use tracing::debug;

/// 创建 `adaptor_*` 表，唯一索引随建表语句一起声明
pub async fn run_migrations(pool: &MySqlPool) -> AdaptorResult<()> {
    debug!("Running MySQL database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS adaptor_rke_clusters (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            eid VARCHAR(64) NOT NULL,
            name VARCHAR(64) NOT NULL,
            clusterID VARCHAR(64) NOT NULL,
            apiURL TEXT NOT NULL,
            kubeConfig LONGTEXT NOT NULL,
            networkMode VARCHAR(32) NOT NULL DEFAULT '',
            serviceCIDR VARCHAR(64) NOT NULL DEFAULT '',
            podCIDR VARCHAR(64) NOT NULL DEFAULT '',
            kubernetesVersion VARCHAR(64) NOT NULL DEFAULT '',
            rainbondInit BOOLEAN NOT NULL DEFAULT FALSE,
            createLogPath VARCHAR(255) NOT NULL DEFAULT '',
            nodeList TEXT NOT NULL,
            stats VARCHAR(32) NOT NULL DEFAULT 'initial',
            rkeConfig LONGTEXT NOT NULL,
            created_at DATETIME(6) NOT NULL,
            updated_at DATETIME(6) NOT NULL,
            UNIQUE KEY uk_rke_eid_name (eid, name),
            UNIQUE KEY uk_rke_eid_cluster (eid, clusterID)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS adaptor_custom_clusters (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            eid VARCHAR(64) NOT NULL,
            name VARCHAR(64) NOT NULL,
            clusterID VARCHAR(64) NOT NULL,
            kubeConfig LONGTEXT NOT NULL,
            eip VARCHAR(255) NULL,
            created_at DATETIME(6) NOT NULL,
            UNIQUE KEY uk_custom_eid_name (eid, name)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#,
    )
    .execute(pool)
    .await?;

    for table in ["adaptor_create_kubernetes_task", "adaptor_init_rainbond_task"] {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
                eid VARCHAR(64) NOT NULL,
                task_id VARCHAR(64) NOT NULL,
                provider_name VARCHAR(32) NOT NULL DEFAULT '',
                clusterID VARCHAR(64) NOT NULL DEFAULT '',
                status VARCHAR(16) NOT NULL DEFAULT 'pending',
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL,
                UNIQUE KEY uk_task (eid, task_id),
                KEY idx_task_cluster (clusterID)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
            "#
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS adaptor_update_kubernetes_task (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            eid VARCHAR(64) NOT NULL,
            task_id VARCHAR(64) NOT NULL,
            provider_name VARCHAR(32) NOT NULL DEFAULT '',
            clusterID VARCHAR(64) NOT NULL DEFAULT '',
            status VARCHAR(16) NOT NULL DEFAULT 'pending',
            version BIGINT NOT NULL DEFAULT 0,
            rkeConfig LONGTEXT NOT NULL,
            created_at DATETIME(6) NOT NULL,
            updated_at DATETIME(6) NOT NULL,
            UNIQUE KEY uk_update_task (eid, task_id),
            UNIQUE KEY uk_update_cluster_version (clusterID, version)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS adaptor_task_events (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            eid VARCHAR(64) NOT NULL,
            task_id VARCHAR(64) NOT NULL,
            event_id VARCHAR(64) NOT NULL,
            step_type VARCHAR(64) NOT NULL,
            message VARCHAR(512) NOT NULL DEFAULT '',
            status VARCHAR(16) NOT NULL,
            reason VARCHAR(255) NOT NULL DEFAULT '',
            created_at DATETIME(6) NOT NULL,
            UNIQUE KEY uk_task_event_step (eid, task_id, step_type)
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
        "#,
    )
    .execute(pool)
    .await?;

    debug!("Successfully completed MySQL database migrations");
    Ok(())
}
