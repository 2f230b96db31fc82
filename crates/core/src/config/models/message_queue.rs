use serde::{Deserialize, Serialize};

/// NSQ消息总线地址，订阅者本身由外部组件实现
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQueueConfig {
    pub nsqd_server: String,
    pub nsq_lookupd_server: String,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            nsqd_server: "127.0.0.1:4150".to_string(),
            nsq_lookupd_server: "127.0.0.1:4161".to_string(),
        }
    }
}
