//! 任务执行层
//!
//! - `task_service` - 任务创建与互斥检查
//! - `message` - 投递给工作池的任务消息
//! - `pool` - 有界工作池
//! - `handlers` - 各类任务的处理器

pub mod handlers;
pub mod message;
pub mod pool;
pub mod task_service;

pub use handlers::{CreateKubernetesHandler, InitRainbondHandler, UpdateKubernetesHandler};
pub use message::{
    CreateKubernetesMessage, InitRainbondMessage, TaskMessage, UpdateKubernetesMessage,
};
pub use pool::{TaskHandler, TaskPublisher, WorkerPool, WorkerPoolHandle};
pub use task_service::{CreateKubernetesTaskRequest, TaskService};
