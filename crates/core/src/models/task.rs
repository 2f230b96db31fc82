use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AdaptorError;

/// 任务类型，每种类型对应一张独立的数据表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CreateKubernetes,
    InitRainbond,
    UpdateKubernetes,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::CreateKubernetes,
        TaskKind::InitRainbond,
        TaskKind::UpdateKubernetes,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            TaskKind::CreateKubernetes => "adaptor_create_kubernetes_task",
            TaskKind::InitRainbond => "adaptor_init_rainbond_task",
            TaskKind::UpdateKubernetes => "adaptor_update_kubernetes_task",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::CreateKubernetes => "create_kubernetes",
            TaskKind::InitRainbond => "init_rainbond",
            TaskKind::UpdateKubernetes => "update_kubernetes",
        };
        f.write_str(name)
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failure => "failure",
        }
    }

    /// 终态任务不会再被调度
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = AdaptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" | "" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "success" => Ok(TaskStatus::Success),
            "failure" => Ok(TaskStatus::Failure),
            other => Err(AdaptorError::Serialization(format!(
                "无效的任务状态: {other}"
            ))),
        }
    }
}

/// 长时间运行的集群操作任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub kind: TaskKind,
    pub eid: String,
    pub task_id: String,
    pub provider_name: String,
    pub cluster_id: String,
    pub status: TaskStatus,
    /// 仅 UpdateKubernetes 使用的乐观并发版本号
    pub version: Option<i64>,
    /// 仅 UpdateKubernetes 使用，本次提交的 cluster.yml
    pub rke_config: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(kind: TaskKind, eid: &str, provider_name: &str, cluster_id: &str) -> Self {
        let now = Utc::now();
        Self {
            kind,
            eid: eid.to_string(),
            task_id: String::new(),
            provider_name: provider_name.to_string(),
            cluster_id: cluster_id.to_string(),
            status: TaskStatus::Pending,
            version: None,
            rke_config: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_status() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failure.is_terminal());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("running".parse::<TaskStatus>().unwrap(), TaskStatus::Running);
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = Task::new(TaskKind::CreateKubernetes, "e1", "rke", "c1");
        assert!(task.is_active());
        assert!(task.task_id.is_empty());
        assert_eq!(task.kind.table_name(), "adaptor_create_kubernetes_task");
    }
}
