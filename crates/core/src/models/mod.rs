//! # 数据模型
//!
//! 云适配器的核心数据结构：
//!
//! - [`RkeCluster`] / [`CustomCluster`] - 集群存储记录
//! - [`KubernetesCluster`] - 存储记录与实时探测结果合并后的描述视图
//! - [`Task`] / [`TaskEvent`] - 长时间运行操作的任务与步骤事件
//! - [`RkeConfig`] - 声明式集群定义（`cluster.yml`）
//!
//! ## 状态流转
//!
//! ```text
//! 集群: Initial → Installing → Running / InstallFailed
//! 任务: pending → running → success / failure
//! 事件: start → success（锁定） / failure（可被覆盖）
//! ```

pub mod cluster;
pub mod event;
pub mod rke_config;
pub mod task;

pub use cluster::*;
pub use event::*;
pub use rke_config::*;
pub use task::*;
