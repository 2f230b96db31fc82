use adaptor_core::{
    models::{EventStatus, TaskEvent},
    traits::TaskEventRepository,
    AdaptorError, AdaptorResult,
};
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

use crate::database::queries;

pub struct SqliteTaskEventRepository {
    pool: SqlitePool,
}

impl SqliteTaskEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_event(row: &SqliteRow) -> AdaptorResult<TaskEvent> {
        let status: String = row.try_get("status")?;
        Ok(TaskEvent {
            eid: row.try_get("eid")?,
            task_id: row.try_get("task_id")?,
            event_id: row.try_get("event_id")?,
            step_type: row.try_get("step_type")?,
            message: row.try_get("message")?,
            status: status.parse::<EventStatus>()?,
            reason: row.try_get("reason")?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// 更新非成功状态的记录，返回记录是否已存在
    async fn update_existing(&self, event: &TaskEvent) -> AdaptorResult<bool> {
        let result = sqlx::query(&queries::update_event_unless_success())
            .bind(event.truncated_message())
            .bind(event.status.as_str())
            .bind(&event.reason)
            .bind(&event.eid)
            .bind(&event.task_id)
            .bind(&event.step_type)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let existing = self
            .get_event(&event.eid, &event.task_id, &event.step_type)
            .await?;
        Ok(existing.is_some())
    }
}

#[async_trait]
impl TaskEventRepository for SqliteTaskEventRepository {
    #[instrument(skip(self, event), fields(
        task_id = %event.task_id,
        step = %event.step_type,
        status = %event.status,
    ))]
    async fn emit_event(&self, event: &TaskEvent) -> AdaptorResult<()> {
        if self.update_existing(event).await? {
            return Ok(());
        }

        let event_id = if event.event_id.is_empty() {
            queries::new_id()
        } else {
            event.event_id.clone()
        };

        let inserted = sqlx::query(&queries::insert_event())
            .bind(&event.eid)
            .bind(&event.task_id)
            .bind(&event_id)
            .bind(&event.step_type)
            .bind(event.truncated_message())
            .bind(event.status.as_str())
            .bind(&event.reason)
            .bind(event.created_at)
            .execute(&self.pool)
            .await
            .map_err(AdaptorError::from);

        match inserted {
            Ok(_) => Ok(()),
            // 并发写入同一步骤时另一方先插入，退回到更新路径
            Err(AdaptorError::NameConflict(_)) => {
                debug!("事件记录已被并发插入，改为更新");
                self.update_existing(event).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn get_event(
        &self,
        eid: &str,
        task_id: &str,
        step_type: &str,
    ) -> AdaptorResult<Option<TaskEvent>> {
        let row = sqlx::query(&queries::select_event())
            .bind(eid)
            .bind(task_id)
            .bind(step_type)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::row_to_event(&row)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_events(&self, eid: &str, task_id: &str) -> AdaptorResult<Vec<TaskEvent>> {
        let rows = sqlx::query(&queries::list_events())
            .bind(eid)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_event).collect()
    }
}
