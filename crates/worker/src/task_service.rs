//! 任务服务
//!
//! 负责创建三类任务并投递到工作池。同一集群同一时间只允许一个未结束的任务：
//! 提供商下最近的任务或集群上任意任务未结束时，创建请求以
//! `LastTaskNotComplete` 拒绝。检查与写入在同一把锁内完成，并发请求只有一个能通过。

use std::sync::Arc;

use adaptor_core::{
    models::{RkeConfig, Task, TaskEvent, TaskKind, TaskStatus},
    traits::{TaskEventRepository, TaskRepository},
    AdaptorError, AdaptorResult,
};
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

use crate::message::{
    CreateKubernetesMessage, InitRainbondMessage, TaskMessage, UpdateKubernetesMessage,
};
use crate::pool::TaskPublisher;

#[derive(Debug, Clone, Default)]
pub struct CreateKubernetesTaskRequest {
    pub provider: String,
    pub cluster_id: String,
    pub rke_config: Option<RkeConfig>,
    pub kubernetes_version: String,
}

pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    events: Arc<dyn TaskEventRepository>,
    publisher: TaskPublisher,
    admission: Mutex<()>,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        events: Arc<dyn TaskEventRepository>,
        publisher: TaskPublisher,
    ) -> Self {
        Self {
            tasks,
            events,
            publisher,
            admission: Mutex::new(()),
        }
    }

    #[instrument(skip(self, request), fields(provider = %request.provider, cluster_id = %request.cluster_id))]
    pub async fn create_kubernetes_task(
        &self,
        eid: &str,
        request: CreateKubernetesTaskRequest,
    ) -> AdaptorResult<Task> {
        let task = self
            .admit(Task::new(
                TaskKind::CreateKubernetes,
                eid,
                &request.provider,
                &request.cluster_id,
            ))
            .await?;
        let message = TaskMessage::CreateKubernetes(CreateKubernetesMessage {
            eid: eid.to_string(),
            task_id: task.task_id.clone(),
            provider: request.provider,
            cluster_id: request.cluster_id,
            rke_config: request.rke_config,
            kubernetes_version: request.kubernetes_version,
        });
        self.dispatch(task, message).await
    }

    #[instrument(skip(self))]
    pub async fn create_init_rainbond_task(
        &self,
        eid: &str,
        provider: &str,
        cluster_id: &str,
    ) -> AdaptorResult<Task> {
        let task = self
            .admit(Task::new(TaskKind::InitRainbond, eid, provider, cluster_id))
            .await?;
        let message = TaskMessage::InitRainbond(InitRainbondMessage {
            eid: eid.to_string(),
            task_id: task.task_id.clone(),
            provider: provider.to_string(),
            cluster_id: cluster_id.to_string(),
        });
        self.dispatch(task, message).await
    }

    /// 版本号取集群当前最大版本加一，并发写入同一版本时返回 `NameConflict`
    #[instrument(skip(self, rke_config))]
    pub async fn create_update_kubernetes_task(
        &self,
        eid: &str,
        provider: &str,
        cluster_id: &str,
        rke_config: RkeConfig,
    ) -> AdaptorResult<Task> {
        let mut task = Task::new(TaskKind::UpdateKubernetes, eid, provider, cluster_id);
        task.rke_config = Some(rke_config.to_yaml()?);
        let task = self.admit(task).await?;

        let message = TaskMessage::UpdateKubernetes(UpdateKubernetesMessage {
            eid: eid.to_string(),
            task_id: task.task_id.clone(),
            provider: provider.to_string(),
            cluster_id: cluster_id.to_string(),
            rke_config,
        });
        self.dispatch(task, message).await
    }

    pub async fn get_task(&self, eid: &str, kind: TaskKind, task_id: &str) -> AdaptorResult<Task> {
        self.tasks
            .get_task(eid, kind, task_id)
            .await?
            .ok_or_else(|| AdaptorError::TaskNotFound(task_id.to_string()))
    }

    /// 任务的全部步骤事件，不保证顺序
    pub async fn get_task_events(&self, eid: &str, task_id: &str) -> AdaptorResult<Vec<TaskEvent>> {
        self.events.list_events(eid, task_id).await
    }

    pub async fn get_last_task(
        &self,
        eid: &str,
        kind: TaskKind,
        provider: &str,
    ) -> AdaptorResult<Option<Task>> {
        self.tasks.get_last_task(eid, kind, provider).await
    }

    /// 在准入锁内检查未结束的任务并写入新任务
    async fn admit(&self, mut task: Task) -> AdaptorResult<Task> {
        let _guard = self.admission.lock().await;
        self.ensure_no_active_task(&task.eid, task.kind, &task.provider_name, &task.cluster_id)
            .await?;
        if task.kind == TaskKind::UpdateKubernetes {
            task.version = Some(self.tasks.max_update_version(&task.cluster_id).await? + 1);
        }
        self.tasks.create_task(&task).await
    }

    async fn ensure_no_active_task(
        &self,
        eid: &str,
        kind: TaskKind,
        provider: &str,
        cluster_id: &str,
    ) -> AdaptorResult<()> {
        if let Some(last) = self.tasks.get_last_task(eid, kind, provider).await? {
            if last.is_active() {
                counter!("task_rejected_total", "kind" => kind.to_string()).increment(1);
                return Err(AdaptorError::LastTaskNotComplete(last.task_id));
            }
        }
        if let Some(active) = self
            .tasks
            .list_active_by_cluster(cluster_id)
            .await?
            .into_iter()
            .next()
        {
            counter!("task_rejected_total", "kind" => kind.to_string()).increment(1);
            return Err(AdaptorError::LastTaskNotComplete(active.task_id));
        }
        Ok(())
    }

    async fn dispatch(&self, task: Task, message: TaskMessage) -> AdaptorResult<Task> {
        if let Err(e) = self.publisher.publish(message).await {
            error!(task_id = %task.task_id, "投递任务失败: {}", e);
            self.tasks
                .update_status(&task.eid, task.kind, &task.task_id, TaskStatus::Failure)
                .await?;
            return Err(e);
        }
        counter!("task_created_total", "kind" => task.kind.to_string()).increment(1);
        info!(task_id = %task.task_id, kind = %task.kind, "任务已创建");
        Ok(task)
    }
}
