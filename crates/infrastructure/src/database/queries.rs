//! 两种后端共用的SQL语句
//!
//! SQLite 与 MySQL 都使用 `?` 作为占位符，因此查询语句可以共享，
//! 只有建表语句按后端分别维护。

use adaptor_core::models::TaskKind;

pub const RKE_CLUSTER_TABLE: &str = "adaptor_rke_clusters";
pub const CUSTOM_CLUSTER_TABLE: &str = "adaptor_custom_clusters";
pub const TASK_EVENT_TABLE: &str = "adaptor_task_events";

pub const RKE_CLUSTER_COLUMNS: &str = "eid, name, clusterID, apiURL, kubeConfig, networkMode, \
     serviceCIDR, podCIDR, kubernetesVersion, rainbondInit, createLogPath, nodeList, stats, \
     rkeConfig, created_at, updated_at";

pub const CUSTOM_CLUSTER_COLUMNS: &str = "eid, name, clusterID, kubeConfig, eip, created_at";

pub const TASK_EVENT_COLUMNS: &str =
    "eid, task_id, event_id, step_type, message, status, reason, created_at";

pub fn insert_rke_cluster() -> String {
    format!(
        "INSERT INTO {RKE_CLUSTER_TABLE} ({RKE_CLUSTER_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
}

pub fn select_rke_cluster() -> String {
    format!(
        "SELECT {RKE_CLUSTER_COLUMNS} FROM {RKE_CLUSTER_TABLE} \
         WHERE eid = ? AND (name = ? OR clusterID = ?) LIMIT 1"
    )
}

pub fn list_rke_clusters() -> String {
    format!(
        "SELECT {RKE_CLUSTER_COLUMNS} FROM {RKE_CLUSTER_TABLE} \
         WHERE eid = ? ORDER BY created_at DESC, id DESC"
    )
}

pub fn update_rke_cluster() -> String {
    format!(
        "UPDATE {RKE_CLUSTER_TABLE} SET name = ?, apiURL = ?, kubeConfig = ?, networkMode = ?, \
         serviceCIDR = ?, podCIDR = ?, kubernetesVersion = ?, rainbondInit = ?, createLogPath = ?, \
         nodeList = ?, stats = ?, rkeConfig = ?, updated_at = ? \
         WHERE eid = ? AND clusterID = ?"
    )
}

pub fn delete_rke_cluster() -> String {
    format!("DELETE FROM {RKE_CLUSTER_TABLE} WHERE eid = ? AND (name = ? OR clusterID = ?)")
}

pub fn insert_custom_cluster() -> String {
    format!(
        "INSERT INTO {CUSTOM_CLUSTER_TABLE} ({CUSTOM_CLUSTER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)"
    )
}

pub fn select_custom_cluster() -> String {
    format!(
        "SELECT {CUSTOM_CLUSTER_COLUMNS} FROM {CUSTOM_CLUSTER_TABLE} \
         WHERE eid = ? AND (name = ? OR clusterID = ?) LIMIT 1"
    )
}

pub fn list_custom_clusters() -> String {
    format!(
        "SELECT {CUSTOM_CLUSTER_COLUMNS} FROM {CUSTOM_CLUSTER_TABLE} \
         WHERE eid = ? ORDER BY created_at DESC, id DESC"
    )
}

pub fn delete_custom_cluster() -> String {
    format!("DELETE FROM {CUSTOM_CLUSTER_TABLE} WHERE eid = ? AND (name = ? OR clusterID = ?)")
}

/// 任务表的列，更新任务额外携带版本号与集群定义
pub fn task_columns(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::UpdateKubernetes => {
            "eid, task_id, provider_name, clusterID, status, version, rkeConfig, created_at, updated_at"
        }
        _ => "eid, task_id, provider_name, clusterID, status, created_at, updated_at",
    }
}

pub fn insert_task(kind: TaskKind) -> String {
    let placeholders = match kind {
        TaskKind::UpdateKubernetes => "?, ?, ?, ?, ?, ?, ?, ?, ?",
        _ => "?, ?, ?, ?, ?, ?, ?",
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        kind.table_name(),
        task_columns(kind)
    )
}

pub fn select_task(kind: TaskKind) -> String {
    format!(
        "SELECT {} FROM {} WHERE eid = ? AND task_id = ? LIMIT 1",
        task_columns(kind),
        kind.table_name()
    )
}

pub fn select_last_task(kind: TaskKind) -> String {
    format!(
        "SELECT {} FROM {} WHERE eid = ? AND provider_name = ? \
         ORDER BY created_at DESC, id DESC LIMIT 1",
        task_columns(kind),
        kind.table_name()
    )
}

pub fn select_active_tasks(kind: TaskKind) -> String {
    format!(
        "SELECT {} FROM {} WHERE clusterID = ? AND status IN ('pending', 'running')",
        task_columns(kind),
        kind.table_name()
    )
}

pub fn update_task_status(kind: TaskKind) -> String {
    format!(
        "UPDATE {} SET status = ?, updated_at = ? WHERE eid = ? AND task_id = ?",
        kind.table_name()
    )
}

pub fn fail_unfinished_tasks(kind: TaskKind) -> String {
    format!(
        "UPDATE {} SET status = 'failure', updated_at = ? WHERE status IN ('pending', 'running')",
        kind.table_name()
    )
}

pub fn max_update_version() -> String {
    format!(
        "SELECT COALESCE(MAX(version), 0) FROM {} WHERE clusterID = ?",
        TaskKind::UpdateKubernetes.table_name()
    )
}

/// 成功状态的事件行不会被更新
pub fn update_event_unless_success() -> String {
    format!(
        "UPDATE {TASK_EVENT_TABLE} SET message = ?, status = ?, reason = ? \
         WHERE eid = ? AND task_id = ? AND step_type = ? AND status <> 'success'"
    )
}

pub fn insert_event() -> String {
    format!(
        "INSERT INTO {TASK_EVENT_TABLE} ({TASK_EVENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    )
}

pub fn select_event() -> String {
    format!(
        "SELECT {TASK_EVENT_COLUMNS} FROM {TASK_EVENT_TABLE} \
         WHERE eid = ? AND task_id = ? AND step_type = ? LIMIT 1"
    )
}

pub fn list_events() -> String {
    format!("SELECT {TASK_EVENT_COLUMNS} FROM {TASK_EVENT_TABLE} WHERE eid = ? AND task_id = ?")
}

/// 生成不带连字符的ID
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
