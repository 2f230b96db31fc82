use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rke_config::RkeNode;
use crate::{AdaptorError, AdaptorResult};

/// RKE集群持久化状态
///
/// ```text
/// Initial → Installing → Running ⇄ Offline
///              ↓
///        InstallFailed → (重试) Initial
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    Initial,
    Installing,
    Running,
    Offline,
    #[serde(rename = "installfailed")]
    InstallFailed,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::Initial => "initial",
            ClusterState::Installing => "installing",
            ClusterState::Running => "running",
            ClusterState::Offline => "offline",
            ClusterState::InstallFailed => "installfailed",
        }
    }

    /// 是否已经具备可用的集群凭据
    pub fn is_provisioned(&self) -> bool {
        matches!(self, ClusterState::Running | ClusterState::Offline)
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterState {
    type Err = AdaptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" | "" => Ok(ClusterState::Initial),
            "installing" => Ok(ClusterState::Installing),
            "running" => Ok(ClusterState::Running),
            "offline" => Ok(ClusterState::Offline),
            "installfailed" => Ok(ClusterState::InstallFailed),
            other => Err(AdaptorError::Serialization(format!(
                "无效的集群状态: {other}"
            ))),
        }
    }
}

/// RKE集群记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RkeCluster {
    pub eid: String,
    pub name: String,
    pub cluster_id: String,
    pub api_url: String,
    pub kube_config: String,
    pub network_mode: String,
    pub service_cidr: String,
    pub pod_cidr: String,
    pub kubernetes_version: String,
    pub rainbond_init: bool,
    pub create_log_path: String,
    /// 声明的节点列表（JSON），仅为兼容旧数据保留
    pub node_list: String,
    pub state: ClusterState,
    /// 最近一次使用的 cluster.yml 内容
    pub rke_config: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RkeCluster {
    pub fn new(eid: &str, name: &str) -> Self {
        let now = Utc::now();
        Self {
            eid: eid.to_string(),
            name: name.to_string(),
            cluster_id: String::new(),
            api_url: String::new(),
            kube_config: String::new(),
            network_mode: String::new(),
            service_cidr: String::new(),
            pod_cidr: String::new(),
            kubernetes_version: String::new(),
            rainbond_init: false,
            create_log_path: String::new(),
            node_list: String::new(),
            state: ClusterState::Initial,
            rke_config: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 反序列化节点列表，空内容视为没有节点
    pub fn nodes(&self) -> AdaptorResult<Vec<RkeNode>> {
        if self.node_list.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&self.node_list)?)
    }

    pub fn set_nodes(&mut self, nodes: &[RkeNode]) -> AdaptorResult<()> {
        self.node_list = serde_json::to_string(nodes)?;
        Ok(())
    }

    /// Running/Offline 状态必须携带 kubeconfig 与 API 地址
    pub fn validate(&self) -> AdaptorResult<()> {
        check_path_segment("集群名称", &self.name)?;
        check_path_segment("企业ID", &self.eid)?;
        if self.state.is_provisioned() && (self.kube_config.is_empty() || self.api_url.is_empty())
        {
            return Err(AdaptorError::invalid_params(format!(
                "集群 {} 处于 {} 状态但缺少kubeconfig或API地址",
                self.name, self.state
            )));
        }
        Ok(())
    }

    pub fn matches(&self, name_or_id: &str) -> bool {
        self.name == name_or_id || self.cluster_id == name_or_id
    }
}

/// 校验名称只包含一级普通目录名
///
/// 集群名称与企业ID会拼接进状态目录路径，`..`、`.`、分隔符与绝对路径都会被拒绝。
pub fn check_path_segment(field: &str, value: &str) -> AdaptorResult<()> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == value => Ok(()),
        _ => Err(AdaptorError::invalid_params(format!(
            "{field}不能作为目录名: {value:?}"
        ))),
    }
}

/// 通过上传kubeconfig导入的自定义集群
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCluster {
    pub eid: String,
    pub name: String,
    pub cluster_id: String,
    pub kube_config: String,
    /// 逗号分隔的EIP列表
    pub eip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CustomCluster {
    pub fn new(eid: &str, name: &str, kube_config: &str) -> Self {
        Self {
            eid: eid.to_string(),
            name: name.to_string(),
            cluster_id: String::new(),
            kube_config: kube_config.to_string(),
            eip: None,
            created_at: Utc::now(),
        }
    }

    pub fn eips(&self) -> Vec<String> {
        self.eip
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// 描述结果中的附加参数，供界面展示不可初始化的原因
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterParameters {
    #[serde(rename = "DisableRainbondInit")]
    pub disable_rainbond_init: bool,
    #[serde(rename = "Message", skip_serializing_if = "String::is_empty", default)]
    pub message: String,
}

impl ClusterParameters {
    pub fn disable(&mut self, message: impl Into<String>) {
        self.disable_rainbond_init = true;
        self.message = message.into();
    }
}

/// 集群描述视图（存储记录 + 实时探测信息）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesCluster {
    pub name: String,
    pub cluster_id: String,
    pub cluster_type: String,
    pub created_at: DateTime<Utc>,
    pub master_url: String,
    pub state: ClusterState,
    pub kubernetes_version: String,
    pub current_version: String,
    pub size: usize,
    pub eip: Vec<String>,
    pub rainbond_init: bool,
    pub create_log_path: String,
    pub network_mode: String,
    pub service_cidr: String,
    pub pod_cidr: String,
    pub parameters: ClusterParameters,
}

impl KubernetesCluster {
    pub fn from_rke(cluster: &RkeCluster) -> Self {
        Self {
            name: cluster.name.clone(),
            cluster_id: cluster.cluster_id.clone(),
            cluster_type: "rke".to_string(),
            created_at: cluster.created_at,
            master_url: cluster.api_url.clone(),
            state: cluster.state,
            kubernetes_version: cluster.kubernetes_version.clone(),
            current_version: String::new(),
            size: cluster.nodes().map(|n| n.len()).unwrap_or_default(),
            eip: Vec::new(),
            rainbond_init: cluster.rainbond_init,
            create_log_path: cluster.create_log_path.clone(),
            network_mode: cluster.network_mode.clone(),
            service_cidr: cluster.service_cidr.clone(),
            pod_cidr: cluster.pod_cidr.clone(),
            parameters: ClusterParameters::default(),
        }
    }

    pub fn from_custom(cluster: &CustomCluster) -> Self {
        Self {
            name: cluster.name.clone(),
            cluster_id: cluster.cluster_id.clone(),
            cluster_type: "custom".to_string(),
            created_at: cluster.created_at,
            master_url: String::new(),
            state: ClusterState::Running,
            kubernetes_version: String::new(),
            current_version: String::new(),
            size: 0,
            eip: cluster.eips(),
            rainbond_init: false,
            create_log_path: String::new(),
            network_mode: String::new(),
            service_cidr: String::new(),
            pod_cidr: String::new(),
            parameters: ClusterParameters::default(),
        }
    }
}

/// 初始化Rainbond区域所需的集群信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RainbondInitConfig {
    pub cluster_id: String,
    pub eip: Vec<String>,
    pub gateway_nodes: Vec<String>,
    pub chaos_nodes: Vec<String>,
    pub etcd_endpoints: Vec<String>,
}
