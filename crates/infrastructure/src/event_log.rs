use std::sync::Arc;

use adaptor_core::{
    models::{EventStatus, TaskEvent},
    traits::{EventSink, TaskEventRepository},
};
use async_trait::async_trait;
use tracing::{info, warn};

/// 将生命周期步骤写入任务事件表
///
/// 写入失败只记录日志，不影响正在执行的安装流程。
pub struct TaskEventSink {
    events: Arc<dyn TaskEventRepository>,
    eid: String,
    task_id: String,
}

impl TaskEventSink {
    pub fn new(events: Arc<dyn TaskEventRepository>, eid: &str, task_id: &str) -> Self {
        Self {
            events,
            eid: eid.to_string(),
            task_id: task_id.to_string(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

#[async_trait]
impl EventSink for TaskEventSink {
    async fn emit_with_reason(&self, step: &str, message: &str, status: EventStatus, reason: &str) {
        let event = TaskEvent::new(&self.eid, &self.task_id, step, status)
            .with_message(message)
            .with_reason(reason);

        info!(
            task_id = %self.task_id,
            step = step,
            status = %status,
            "{message}"
        );

        if let Err(e) = self.events.emit_event(&event).await {
            warn!(
                task_id = %self.task_id,
                step = step,
                "写入任务事件失败: {e}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use adaptor_core::models::steps;
    use adaptor_core::AdaptorError;

    #[tokio::test]
    async fn test_sink_writes_events() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let events = db.task_event_repository();
        let sink = TaskEventSink::new(events.clone(), "e1", "t1");

        sink.emit(steps::INIT_CLUSTER_CONFIG, "", EventStatus::Start).await;
        sink.emit(steps::INIT_CLUSTER_CONFIG, "c1", EventStatus::Success).await;
        sink.emit_error(steps::INSTALL_KUBERNETES, &AdaptorError::ClusterNodeEmpty)
            .await;

        let init = events
            .get_event("e1", "t1", steps::INIT_CLUSTER_CONFIG)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(init.status, EventStatus::Success);
        assert_eq!(init.message, "c1");

        let install = events
            .get_event("e1", "t1", steps::INSTALL_KUBERNETES)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(install.status, EventStatus::Failure);
        assert_eq!(install.reason, "7006");
    }
}
