//! 数据仓储层接口定义
//!
//! - `RkeClusterRepository` - RKE集群记录
//! - `CustomClusterRepository` - 导入的自定义集群
//! - `TaskRepository` - 三类任务表
//! - `TaskEventRepository` - 按步骤覆盖写入的任务事件
//!
//! 所有实现都以企业ID（eid）作为租户边界。读操作不加悲观锁，
//! 调用方需要容忍读取期间记录被更新。

use async_trait::async_trait;

use crate::models::{CustomCluster, RkeCluster, Task, TaskEvent, TaskKind, TaskStatus};
use crate::AdaptorResult;

/// RKE集群仓储接口
#[async_trait]
pub trait RkeClusterRepository: Send + Sync {
    /// 创建集群记录，名称或企业ID为空时失败；(eid, name) 重复时返回 `NameConflict`；
    /// cluster_id 为空时自动生成
    async fn create(&self, cluster: &RkeCluster) -> AdaptorResult<RkeCluster>;

    /// 按名称或 cluster_id 查询，不存在时返回 `ClusterNotFound`
    async fn get(&self, eid: &str, name_or_id: &str) -> AdaptorResult<RkeCluster>;

    /// 按创建时间倒序列出企业下的所有集群
    async fn list(&self, eid: &str) -> AdaptorResult<Vec<RkeCluster>>;

    /// 全量覆盖更新
    async fn update(&self, cluster: &RkeCluster) -> AdaptorResult<()>;

    async fn delete(&self, eid: &str, name_or_id: &str) -> AdaptorResult<()>;
}

/// 自定义集群仓储接口
#[async_trait]
pub trait CustomClusterRepository: Send + Sync {
    async fn create(&self, cluster: &CustomCluster) -> AdaptorResult<CustomCluster>;
    async fn get(&self, eid: &str, name_or_id: &str) -> AdaptorResult<CustomCluster>;
    async fn list(&self, eid: &str) -> AdaptorResult<Vec<CustomCluster>>;
    async fn delete(&self, eid: &str, name_or_id: &str) -> AdaptorResult<()>;
}

/// 任务仓储接口
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 创建任务，task_id 为空时自动生成；(eid, task_id) 已存在时返回 `NameConflict`
    async fn create_task(&self, task: &Task) -> AdaptorResult<Task>;

    async fn get_task(&self, eid: &str, kind: TaskKind, task_id: &str)
        -> AdaptorResult<Option<Task>>;

    /// 指定提供商下最近创建的任务
    async fn get_last_task(
        &self,
        eid: &str,
        kind: TaskKind,
        provider: &str,
    ) -> AdaptorResult<Option<Task>>;

    /// 集群上所有未结束的任务（跨任务类型）
    async fn list_active_by_cluster(&self, cluster_id: &str) -> AdaptorResult<Vec<Task>>;

    async fn update_status(
        &self,
        eid: &str,
        kind: TaskKind,
        task_id: &str,
        status: TaskStatus,
    ) -> AdaptorResult<()>;

    /// 集群当前最大的更新版本号，没有记录时为0
    async fn max_update_version(&self, cluster_id: &str) -> AdaptorResult<i64>;

    /// 将所有未结束的任务标记为失败，返回受影响的行数
    async fn fail_unfinished_tasks(&self) -> AdaptorResult<u64>;
}

/// 任务事件仓储接口
#[async_trait]
pub trait TaskEventRepository: Send + Sync {
    /// 按 (eid, task_id, step_type) 覆盖写入。消息截断到512字节；
    /// 已处于 success 状态的记录不会被修改
    async fn emit_event(&self, event: &TaskEvent) -> AdaptorResult<()>;

    async fn get_event(
        &self,
        eid: &str,
        task_id: &str,
        step_type: &str,
    ) -> AdaptorResult<Option<TaskEvent>>;

    /// 不保证顺序，调用方按 step_type 分组
    async fn list_events(&self, eid: &str, task_id: &str) -> AdaptorResult<Vec<TaskEvent>>;
}
