//! 云适配器基础设施层
//!
//! - `database` - SQLite/MySQL 仓储实现
//! - `state_dir` - 集群状态目录
//! - `kube_client` - 基于kubeconfig的集群客户端
//! - `event_log` - 任务事件写入
//! - `ssh` - SSH密钥与连通性检查

pub mod database;
pub mod event_log;
pub mod kube_client;
pub mod ssh;
pub mod state_dir;

pub use database::{DatabaseManager, DatabasePool};
pub use event_log::TaskEventSink;
pub use kube_client::{parse_kube_config, KubeRsClientFactory, KubeRsClusterApi};
pub use ssh::SshKeyManager;
pub use state_dir::{ClusterPaths, StateDirectory};
