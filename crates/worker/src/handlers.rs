//! 任务处理器
//!
//! 每个处理器负责一种任务：将任务置为 `running`，调用对应提供商的适配器，
//! 根据结果写入 `success` 或 `failure`。适配器返回的错误会转换为失败事件，
//! 不会向工作池传播。

use std::sync::Arc;

use adaptor_cluster::{AdaptorFactory, CreateKubernetesRequest, ExpansionNodeRequest};
use adaptor_core::{
    models::{steps, EventStatus, KubernetesCluster, TaskKind, TaskStatus},
    traits::{EventSink, TaskEventRepository, TaskRepository},
    AdaptorError, AdaptorResult, Cancellation,
};
use adaptor_infrastructure::TaskEventSink;
use async_trait::async_trait;
use metrics::counter;
use tracing::{error, info, warn};

use crate::message::TaskMessage;
use crate::pool::TaskHandler;

/// 区域初始化配置检查步骤
pub const CHECK_REGION_CONFIG: &str = "CheckRegionConfig";

/// 单个任务的执行记录
struct TaskRun {
    tasks: Arc<dyn TaskRepository>,
    kind: TaskKind,
    eid: String,
    task_id: String,
    sink: TaskEventSink,
}

impl TaskRun {
    async fn start(
        tasks: Arc<dyn TaskRepository>,
        events: Arc<dyn TaskEventRepository>,
        kind: TaskKind,
        eid: &str,
        task_id: &str,
    ) -> Self {
        let run = Self {
            tasks,
            kind,
            eid: eid.to_string(),
            task_id: task_id.to_string(),
            sink: TaskEventSink::new(events, eid, task_id),
        };
        run.set_status(TaskStatus::Running).await;
        run
    }

    async fn set_status(&self, status: TaskStatus) {
        if let Err(e) = self
            .tasks
            .update_status(&self.eid, self.kind, &self.task_id, status)
            .await
        {
            error!(task_id = %self.task_id, "更新任务状态为 {} 失败: {}", status, e);
        }
    }

    /// 写入最终状态；`failed_step` 用于记录适配器直接返回的错误
    async fn complete(self, result: AdaptorResult<Option<KubernetesCluster>>, failed_step: &str) {
        let status = match result {
            Ok(Some(cluster)) => {
                info!(task_id = %self.task_id, cluster_id = %cluster.cluster_id, "任务执行成功");
                TaskStatus::Success
            }
            Ok(None) => TaskStatus::Failure,
            Err(e) => {
                warn!(task_id = %self.task_id, "任务执行失败: {}", e);
                self.sink.emit_error(failed_step, &e).await;
                TaskStatus::Failure
            }
        };
        self.set_status(status).await;
        counter!(
            "worker_tasks_completed_total",
            "kind" => self.kind.to_string(),
            "status" => status.as_str()
        )
        .increment(1);
    }
}

fn unexpected(kind: TaskKind, message: &TaskMessage) {
    error!(
        task_id = %message.task_id(),
        "{} 处理器收到了 {} 类型的消息",
        kind,
        message.kind()
    );
}

pub struct CreateKubernetesHandler {
    adaptors: AdaptorFactory,
    tasks: Arc<dyn TaskRepository>,
    events: Arc<dyn TaskEventRepository>,
}

impl CreateKubernetesHandler {
    pub fn new(
        adaptors: AdaptorFactory,
        tasks: Arc<dyn TaskRepository>,
        events: Arc<dyn TaskEventRepository>,
    ) -> Self {
        Self {
            adaptors,
            tasks,
            events,
        }
    }
}

#[async_trait]
impl TaskHandler for CreateKubernetesHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::CreateKubernetes
    }

    async fn handle(&self, message: TaskMessage, cancel: Cancellation) {
        let message = match message {
            TaskMessage::CreateKubernetes(message) => message,
            other => {
                unexpected(self.kind(), &other);
                return;
            }
        };
        let run = TaskRun::start(
            self.tasks.clone(),
            self.events.clone(),
            self.kind(),
            &message.eid,
            &message.task_id,
        )
        .await;

        let request = CreateKubernetesRequest {
            eid: message.eid,
            cluster_name: message.cluster_id,
            rke_config: message.rke_config,
            kubernetes_version: message.kubernetes_version,
        };
        let result = match self.adaptors.get(&message.provider) {
            Ok(adaptor) => {
                adaptor
                    .create_rainbond_kubernetes(&request, &run.sink, &cancel)
                    .await
            }
            Err(e) => Err(e),
        };
        run.complete(result, steps::INIT_CLUSTER_CONFIG).await;
    }
}

pub struct UpdateKubernetesHandler {
    adaptors: AdaptorFactory,
    tasks: Arc<dyn TaskRepository>,
    events: Arc<dyn TaskEventRepository>,
}

impl UpdateKubernetesHandler {
    pub fn new(
        adaptors: AdaptorFactory,
        tasks: Arc<dyn TaskRepository>,
        events: Arc<dyn TaskEventRepository>,
    ) -> Self {
        Self {
            adaptors,
            tasks,
            events,
        }
    }
}

#[async_trait]
impl TaskHandler for UpdateKubernetesHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::UpdateKubernetes
    }

    async fn handle(&self, message: TaskMessage, cancel: Cancellation) {
        let message = match message {
            TaskMessage::UpdateKubernetes(message) => message,
            other => {
                unexpected(self.kind(), &other);
                return;
            }
        };
        let run = TaskRun::start(
            self.tasks.clone(),
            self.events.clone(),
            self.kind(),
            &message.eid,
            &message.task_id,
        )
        .await;

        let request = ExpansionNodeRequest {
            eid: message.eid,
            cluster_id: message.cluster_id,
            rke_config: message.rke_config,
        };
        let result = match self.adaptors.get(&message.provider) {
            Ok(adaptor) => adaptor.expansion_node(&request, &run.sink, &cancel).await,
            Err(e) => Err(e),
        };
        run.complete(result, steps::INIT_CLUSTER_CONFIG).await;
    }
}

/// 区域初始化任务
///
/// 区域安装由外部安装器完成，这里只检查集群可初始化并记录初始化所需的节点信息。
pub struct InitRainbondHandler {
    adaptors: AdaptorFactory,
    tasks: Arc<dyn TaskRepository>,
    events: Arc<dyn TaskEventRepository>,
}

impl InitRainbondHandler {
    pub fn new(
        adaptors: AdaptorFactory,
        tasks: Arc<dyn TaskRepository>,
        events: Arc<dyn TaskEventRepository>,
    ) -> Self {
        Self {
            adaptors,
            tasks,
            events,
        }
    }

    async fn check(
        &self,
        provider: &str,
        eid: &str,
        cluster_id: &str,
        sink: &dyn EventSink,
        cancel: &Cancellation,
    ) -> AdaptorResult<Option<KubernetesCluster>> {
        sink.emit(CHECK_REGION_CONFIG, "开始检查集群", EventStatus::Start)
            .await;
        let adaptor = self.adaptors.get(provider)?;
        let cluster = cancel
            .run(adaptor.describe_cluster(eid, cluster_id))
            .await?;
        if cluster.parameters.disable_rainbond_init {
            return Err(AdaptorError::ConfigInvalid(cluster.parameters.message));
        }
        let init_config = adaptor.get_rainbond_init_config(eid, cluster_id).await?;
        sink.emit(
            CHECK_REGION_CONFIG,
            &serde_json::to_string(&init_config)?,
            EventStatus::Success,
        )
        .await;
        Ok(Some(cluster))
    }
}

#[async_trait]
impl TaskHandler for InitRainbondHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::InitRainbond
    }

    async fn handle(&self, message: TaskMessage, cancel: Cancellation) {
        let message = match message {
            TaskMessage::InitRainbond(message) => message,
            other => {
                unexpected(self.kind(), &other);
                return;
            }
        };
        let run = TaskRun::start(
            self.tasks.clone(),
            self.events.clone(),
            self.kind(),
            &message.eid,
            &message.task_id,
        )
        .await;
        let result = self
            .check(
                &message.provider,
                &message.eid,
                &message.cluster_id,
                &run.sink,
                &cancel,
            )
            .await;
        run.complete(result, CHECK_REGION_CONFIG).await;
    }
}
