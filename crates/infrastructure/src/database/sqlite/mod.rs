pub mod sqlite_cluster_repository;
pub mod sqlite_event_repository;
pub mod sqlite_task_repository;

pub use sqlite_cluster_repository::{SqliteCustomClusterRepository, SqliteRkeClusterRepository};
pub use sqlite_event_repository::SqliteTaskEventRepository;
pub use sqlite_task_repository::SqliteTaskRepository;

use adaptor_core::AdaptorResult;
use sqlx::SqlitePool;
use tracing::debug;

/// 创建 `adaptor_*` 表及唯一索引
pub async fn run_migrations(pool: &SqlitePool) -> AdaptorResult<()> {
    debug!("Running SQLite database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS adaptor_rke_clusters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            eid TEXT NOT NULL,
            name TEXT NOT NULL,
            clusterID TEXT NOT NULL,
            apiURL TEXT NOT NULL DEFAULT '',
            kubeConfig TEXT NOT NULL DEFAULT '',
            networkMode TEXT NOT NULL DEFAULT '',
            serviceCIDR TEXT NOT NULL DEFAULT '',
            podCIDR TEXT NOT NULL DEFAULT '',
            kubernetesVersion TEXT NOT NULL DEFAULT '',
            rainbondInit BOOLEAN NOT NULL DEFAULT 0,
            createLogPath TEXT NOT NULL DEFAULT '',
            nodeList TEXT NOT NULL DEFAULT '',
            stats TEXT NOT NULL DEFAULT 'initial',
            rkeConfig TEXT NOT NULL DEFAULT '',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS adaptor_custom_clusters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            eid TEXT NOT NULL,
            name TEXT NOT NULL,
            clusterID TEXT NOT NULL,
            kubeConfig TEXT NOT NULL DEFAULT '',
            eip TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    for table in ["adaptor_create_kubernetes_task", "adaptor_init_rainbond_task"] {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                eid TEXT NOT NULL,
                task_id TEXT NOT NULL,
                provider_name TEXT NOT NULL DEFAULT '',
                clusterID TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        ))
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS adaptor_update_kubernetes_task (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            eid TEXT NOT NULL,
            task_id TEXT NOT NULL,
            provider_name TEXT NOT NULL DEFAULT '',
            clusterID TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            version INTEGER NOT NULL DEFAULT 0,
            rkeConfig TEXT NOT NULL DEFAULT '',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS adaptor_task_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            eid TEXT NOT NULL,
            task_id TEXT NOT NULL,
            event_id TEXT NOT NULL,
            step_type TEXT NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL,
            reason TEXT NOT NULL DEFAULT '',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        "CREATE UNIQUE INDEX IF NOT EXISTS uk_rke_eid_name ON adaptor_rke_clusters(eid, name)",
        "CREATE UNIQUE INDEX IF NOT EXISTS uk_rke_eid_cluster ON adaptor_rke_clusters(eid, clusterID)",
        "CREATE UNIQUE INDEX IF NOT EXISTS uk_custom_eid_name ON adaptor_custom_clusters(eid, name)",
        "CREATE UNIQUE INDEX IF NOT EXISTS uk_create_task ON adaptor_create_kubernetes_task(eid, task_id)",
        "CREATE UNIQUE INDEX IF NOT EXISTS uk_init_task ON adaptor_init_rainbond_task(eid, task_id)",
        "CREATE UNIQUE INDEX IF NOT EXISTS uk_update_task ON adaptor_update_kubernetes_task(eid, task_id)",
        "CREATE UNIQUE INDEX IF NOT EXISTS uk_update_cluster_version ON adaptor_update_kubernetes_task(clusterID, version)",
        "CREATE UNIQUE INDEX IF NOT EXISTS uk_task_event_step ON adaptor_task_events(eid, task_id, step_type)",
        "CREATE INDEX IF NOT EXISTS idx_create_task_cluster ON adaptor_create_kubernetes_task(clusterID)",
        "CREATE INDEX IF NOT EXISTS idx_init_task_cluster ON adaptor_init_rainbond_task(clusterID)",
    ];

    for index_sql in indexes {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("Successfully completed SQLite database migrations");
    Ok(())
}
