use adaptor_core::{
    models::{Task, TaskKind, TaskStatus},
    traits::TaskRepository,
    AdaptorError, AdaptorResult,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

use crate::database::{insert_error, queries};

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(kind: TaskKind, row: &SqliteRow) -> AdaptorResult<Task> {
        let status: String = row.try_get("status")?;
        let (version, rke_config) = match kind {
            TaskKind::UpdateKubernetes => (
                Some(row.try_get::<i64, _>("version")?),
                Some(row.try_get::<String, _>("rkeConfig")?),
            ),
            _ => (None, None),
        };

        Ok(Task {
            kind,
            eid: row.try_get("eid")?,
            task_id: row.try_get("task_id")?,
            provider_name: row.try_get("provider_name")?,
            cluster_id: row.try_get("clusterID")?,
            status: status.parse::<TaskStatus>()?,
            version,
            rke_config,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(
        kind = %task.kind,
        eid = %task.eid,
        cluster_id = %task.cluster_id,
    ))]
    async fn create_task(&self, task: &Task) -> AdaptorResult<Task> {
        let mut created = task.clone();
        if created.task_id.is_empty() {
            created.task_id = queries::new_id();
        }

        if created.kind == TaskKind::UpdateKubernetes && created.version.is_none() {
            created.version = Some(self.max_update_version(&created.cluster_id).await? + 1);
        }

        let sql = queries::insert_task(created.kind);
        let query = sqlx::query(&sql)
            .bind(&created.eid)
            .bind(&created.task_id)
            .bind(&created.provider_name)
            .bind(&created.cluster_id)
            .bind(created.status.as_str());

        let query = if created.kind == TaskKind::UpdateKubernetes {
            query
                .bind(created.version.unwrap_or(1))
                .bind(created.rke_config.clone().unwrap_or_default())
        } else {
            query
        };

        query
            .bind(created.created_at)
            .bind(created.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(e, &created.task_id))?;

        debug!("创建任务成功: {} ({})", created.task_id, created.kind);
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_task(
        &self,
        eid: &str,
        kind: TaskKind,
        task_id: &str,
    ) -> AdaptorResult<Option<Task>> {
        let row = sqlx::query(&queries::select_task(kind))
            .bind(eid)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::row_to_task(kind, &row)).transpose()
    }

    #[instrument(skip(self))]
    async fn get_last_task(
        &self,
        eid: &str,
        kind: TaskKind,
        provider: &str,
    ) -> AdaptorResult<Option<Task>> {
        let row = sqlx::query(&queries::select_last_task(kind))
            .bind(eid)
            .bind(provider)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::row_to_task(kind, &row)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_active_by_cluster(&self, cluster_id: &str) -> AdaptorResult<Vec<Task>> {
        let mut tasks = Vec::new();
        for kind in TaskKind::ALL {
            let rows = sqlx::query(&queries::select_active_tasks(kind))
                .bind(cluster_id)
                .fetch_all(&self.pool)
                .await?;
            for row in &rows {
                tasks.push(Self::row_to_task(kind, row)?);
            }
        }
        Ok(tasks)
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        eid: &str,
        kind: TaskKind,
        task_id: &str,
        status: TaskStatus,
    ) -> AdaptorResult<()> {
        let result = sqlx::query(&queries::update_task_status(kind))
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(eid)
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AdaptorError::TaskNotFound(task_id.to_string()));
        }
        debug!("任务 {} 状态更新为 {}", task_id, status);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn max_update_version(&self, cluster_id: &str) -> AdaptorResult<i64> {
        let version: i64 = sqlx::query_scalar(&queries::max_update_version())
            .bind(cluster_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    #[instrument(skip(self))]
    async fn fail_unfinished_tasks(&self) -> AdaptorResult<u64> {
        let now = Utc::now();
        let mut affected = 0;
        for kind in TaskKind::ALL {
            affected += sqlx::query(&queries::fail_unfinished_tasks(kind))
                .bind(now)
                .execute(&self.pool)
                .await?
                .rows_affected();
        }
        debug!("{} 个未结束的任务已标记为失败", affected);
        Ok(affected)
    }
}
