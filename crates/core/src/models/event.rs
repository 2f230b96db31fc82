use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AdaptorError;

/// 事件消息写入时的最大字节数
pub const MAX_EVENT_MESSAGE_LEN: usize = 512;

/// 任务步骤名称
pub mod steps {
    pub const INIT_CLUSTER_CONFIG: &str = "InitClusterConfig";
    pub const INSTALL_KUBERNETES: &str = "InstallKubernetes";
    pub const UPDATE_KUBERNETES: &str = "UpdateKubernetes";
}

/// 步骤事件状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Start,
    Success,
    Failure,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Start => "start",
            EventStatus::Success => "success",
            EventStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = AdaptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(EventStatus::Start),
            "success" => Ok(EventStatus::Success),
            "failure" => Ok(EventStatus::Failure),
            other => Err(AdaptorError::Serialization(format!(
                "无效的事件状态: {other}"
            ))),
        }
    }
}

/// 任务步骤事件，以 (eid, task_id, step_type) 为键进行覆盖写入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub eid: String,
    pub task_id: String,
    pub event_id: String,
    pub step_type: String,
    pub message: String,
    pub status: EventStatus,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl TaskEvent {
    pub fn new(eid: &str, task_id: &str, step_type: &str, status: EventStatus) -> Self {
        Self {
            eid: eid.to_string(),
            task_id: task_id.to_string(),
            event_id: String::new(),
            step_type: step_type.to_string(),
            message: String::new(),
            status,
            reason: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// 写入前截断后的消息
    pub fn truncated_message(&self) -> &str {
        truncate_message(&self.message, MAX_EVENT_MESSAGE_LEN)
    }
}

/// 按字节数截断，保证不会切断UTF-8字符
pub fn truncate_message(message: &str, max_len: usize) -> &str {
    if message.len() <= max_len {
        return message;
    }
    let mut end = max_len;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}
