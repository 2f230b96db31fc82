//! 任务消息
//!
//! 任务创建后以消息形式投递给工作池，消息体可以序列化为JSON，
//! 由外部传输层（如NSQ消费者）直接投递。

use adaptor_core::{models::RkeConfig, models::TaskKind, AdaptorResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKubernetesMessage {
    pub eid: String,
    #[serde(rename = "taskID")]
    pub task_id: String,
    pub provider: String,
    #[serde(rename = "clusterID")]
    pub cluster_id: String,
    #[serde(default)]
    pub rke_config: Option<RkeConfig>,
    #[serde(default)]
    pub kubernetes_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKubernetesMessage {
    pub eid: String,
    #[serde(rename = "taskID")]
    pub task_id: String,
    pub provider: String,
    #[serde(rename = "clusterID")]
    pub cluster_id: String,
    pub rke_config: RkeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRainbondMessage {
    pub eid: String,
    #[serde(rename = "taskID")]
    pub task_id: String,
    pub provider: String,
    #[serde(rename = "clusterID")]
    pub cluster_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum TaskMessage {
    CreateKubernetes(CreateKubernetesMessage),
    UpdateKubernetes(UpdateKubernetesMessage),
    InitRainbond(InitRainbondMessage),
}

impl TaskMessage {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskMessage::CreateKubernetes(_) => TaskKind::CreateKubernetes,
            TaskMessage::UpdateKubernetes(_) => TaskKind::UpdateKubernetes,
            TaskMessage::InitRainbond(_) => TaskKind::InitRainbond,
        }
    }

    pub fn eid(&self) -> &str {
        match self {
            TaskMessage::CreateKubernetes(m) => &m.eid,
            TaskMessage::UpdateKubernetes(m) => &m.eid,
            TaskMessage::InitRainbond(m) => &m.eid,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            TaskMessage::CreateKubernetes(m) => &m.task_id,
            TaskMessage::UpdateKubernetes(m) => &m.task_id,
            TaskMessage::InitRainbond(m) => &m.task_id,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            TaskMessage::CreateKubernetes(m) => &m.provider,
            TaskMessage::UpdateKubernetes(m) => &m.provider,
            TaskMessage::InitRainbond(m) => &m.provider,
        }
    }

    pub fn to_json(&self) -> AdaptorResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(body: &str) -> AdaptorResult<Self> {
        Ok(serde_json::from_str(body)?)
    }
}
