use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::{AdaptorError, AdaptorResult};

/// 未指定版本时安装的Kubernetes版本（RKE引擎格式）
pub const DEFAULT_KUBERNETES_VERSION: &str = "v1.23.10-rancher1";

/// 默认SSH用户
pub const DEFAULT_SSH_USER: &str = "docker";

/// 节点角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Controlplane,
    Etcd,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Controlplane => "controlplane",
            NodeRole::Etcd => "etcd",
            NodeRole::Worker => "worker",
        }
    }
}

/// 节点污点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    pub effect: String,
}

/// 声明式节点定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RkeNode {
    pub address: String,
    /// SSH端口，为空时使用22
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub port: String,
    #[serde(default)]
    pub role: Vec<NodeRole>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname_override: String,
    #[serde(
        rename = "internal_address",
        alias = "internal_ip",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub internal_ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_key_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_socket: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,
}

impl RkeNode {
    pub fn new(address: &str, roles: &[NodeRole]) -> Self {
        Self {
            address: address.to_string(),
            port: "22".to_string(),
            role: roles.to_vec(),
            hostname_override: address.to_string(),
            internal_ip: String::new(),
            external_ip: String::new(),
            user: DEFAULT_SSH_USER.to_string(),
            ssh_key_path: String::new(),
            docker_socket: String::new(),
            labels: BTreeMap::new(),
            taints: Vec::new(),
        }
    }

    pub fn has_role(&self, role: NodeRole) -> bool {
        self.role.contains(&role)
    }

    /// 节点唯一名称，优先使用 hostname_override
    pub fn node_name(&self) -> &str {
        if self.hostname_override.is_empty() {
            &self.address
        } else {
            &self.hostname_override
        }
    }

    /// 对外访问地址，优先使用外网IP
    pub fn public_address(&self) -> &str {
        if self.external_ip.is_empty() {
            &self.address
        } else {
            &self.external_ip
        }
    }

    pub fn ssh_port(&self) -> AdaptorResult<u16> {
        if self.port.is_empty() {
            return Ok(22);
        }
        match self.port.parse::<u16>() {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(AdaptorError::ClusterNodePortInvalid(format!(
                "{}:{}",
                self.address, self.port
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtcdService {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

/// 自定义加密配置（RKE不支持对其轮换密钥）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretsEncryptionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_config: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KubeApiService {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_cluster_ip_range: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_node_port_range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_encryption_config: Option<SecretsEncryptionConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeControllerService {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_cidr: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_cluster_ip_range: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeletService {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_dns_server: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_binds: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RkeServices {
    #[serde(default)]
    pub etcd: EtcdService,
    #[serde(default)]
    pub kube_api: KubeApiService,
    #[serde(default)]
    pub kube_controller: KubeControllerService,
    #[serde(default)]
    pub kubelet: KubeletService,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plugin: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeStrategy {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub max_unavailable_worker: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub max_unavailable_controlplane: String,
    #[serde(default)]
    pub drain: bool,
}

/// 证书轮换参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotateCertificates {
    #[serde(default)]
    pub ca_certificates: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
}

impl RotateCertificates {
    /// 服务列表为空或轮换CA时表示轮换全部服务
    pub fn rotates_all(&self) -> bool {
        self.services.is_empty() || self.ca_certificates
    }

    pub fn includes(&self, service: &str) -> bool {
        self.rotates_all() || self.services.iter().any(|s| s == service)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreConfig {
    #[serde(default)]
    pub restore: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snapshot_name: String,
}

/// 声明式RKE集群定义，序列化为 cluster.yml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RkeConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,
    #[serde(default)]
    pub nodes: Vec<RkeNode>,
    #[serde(default)]
    pub services: RkeServices,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubernetes_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_key_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub addons: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addons_include: Vec<String>,
    #[serde(default)]
    pub ignore_docker_version: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_strategy: Option<UpgradeStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate_certificates: Option<RotateCertificates>,
    #[serde(default)]
    pub rotate_encryption_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore: Option<RestoreConfig>,
}

impl RkeConfig {
    pub fn from_yaml(content: &str) -> AdaptorResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> AdaptorResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn nodes_with_role(&self, role: NodeRole) -> impl Iterator<Item = &RkeNode> {
        self.nodes.iter().filter(move |n| n.has_role(role))
    }

    pub fn pod_cidr(&self) -> &str {
        &self.services.kube_controller.cluster_cidr
    }

    pub fn service_cidr(&self) -> &str {
        if self.services.kube_api.service_cluster_ip_range.is_empty() {
            &self.services.kube_controller.service_cluster_ip_range
        } else {
            &self.services.kube_api.service_cluster_ip_range
        }
    }

    pub fn is_restore(&self) -> bool {
        self.restore.as_ref().map(|r| r.restore).unwrap_or(false)
    }

    pub fn secrets_encryption(&self) -> Option<&SecretsEncryptionConfig> {
        self.services.kube_api.secrets_encryption_config.as_ref()
    }

    /// 节点集合校验，同时要求存在 worker、controlplane、etcd 三种角色
    pub fn validate_nodes(&self) -> AdaptorResult<()> {
        validate_nodes(&self.nodes)
    }
}

/// 校验节点集合
pub fn validate_nodes(nodes: &[RkeNode]) -> AdaptorResult<()> {
    if nodes.is_empty() {
        return Err(AdaptorError::ClusterNodeEmpty);
    }

    let roles: BTreeSet<NodeRole> = nodes.iter().flat_map(|n| n.role.iter().copied()).collect();
    for required in [NodeRole::Worker, NodeRole::Controlplane, NodeRole::Etcd] {
        if !roles.contains(&required) {
            return Err(AdaptorError::ClusterNodeRoleMiss {
                role: required.as_str().to_string(),
            });
        }
    }

    let etcd_count = nodes.iter().filter(|n| n.has_role(NodeRole::Etcd)).count();
    if etcd_count % 2 == 0 {
        return Err(AdaptorError::EtcdNodeNotOddNumber(etcd_count));
    }

    for node in nodes {
        if node.address.parse::<IpAddr>().is_err() {
            return Err(AdaptorError::ClusterNodeIpInvalid(node.address.clone()));
        }
        if !node.internal_ip.is_empty() && node.internal_ip.parse::<IpAddr>().is_err() {
            return Err(AdaptorError::ClusterNodeIpInvalid(node.internal_ip.clone()));
        }
        node.ssh_port()?;
    }

    Ok(())
}
