use std::collections::BTreeSet;

use adaptor_core::{
    models::{NodeRole, RkeConfig, RkeNode},
    AdaptorError, AdaptorResult,
};

use crate::log::EngineLog;
use crate::state::{CertificateBundle, RkeState, CA_CERT_NAME, KUBE_ADMIN_CERT_NAME};

/// Kubernetes API 端口
pub const KUBE_API_PORT: u16 = 6443;

/// 单次运行中的集群对象
///
/// 由期望配置初始化，引擎原语在其上填充证书、不可达节点、滚动升级参数等信息。
#[derive(Debug, Clone)]
pub struct KubeCluster {
    pub config: RkeConfig,
    pub control_plane_hosts: Vec<RkeNode>,
    pub etcd_hosts: Vec<RkeNode>,
    pub worker_hosts: Vec<RkeNode>,
    /// 无法建立连接而被跳过的节点
    pub inactive_hosts: Vec<RkeNode>,
    pub certificates: CertificateBundle,
    pub encryption_config: String,
    /// 加密配置变化后需要重写所有Secret
    pub rewrite_secrets: bool,
    pub max_unavailable_for_worker_nodes: usize,
    pub max_unavailable_for_control_nodes: usize,
    /// 本次新加入的节点（按 hostname_override），升级时不参与驱逐与状态检查
    pub new_hosts: BTreeSet<String>,
    pub log: EngineLog,
}

impl KubeCluster {
    pub fn new(config: RkeConfig, encryption_config: &str, log: EngineLog) -> Self {
        let by_role = |role: NodeRole| -> Vec<RkeNode> {
            config.nodes_with_role(role).cloned().collect()
        };
        Self {
            control_plane_hosts: by_role(NodeRole::Controlplane),
            etcd_hosts: by_role(NodeRole::Etcd),
            worker_hosts: by_role(NodeRole::Worker),
            inactive_hosts: Vec::new(),
            certificates: CertificateBundle::new(),
            encryption_config: encryption_config.to_string(),
            rewrite_secrets: false,
            max_unavailable_for_worker_nodes: 1,
            max_unavailable_for_control_nodes: 1,
            new_hosts: BTreeSet::new(),
            config,
            log,
        }
    }

    /// 由状态文件中的某一侧状态构建集群对象，没有配置时返回 None
    pub fn from_state(state: &RkeState, log: EngineLog) -> Option<Self> {
        let config = state.rke_config.clone()?;
        let mut cluster = Self::new(config, &state.encryption_config, log);
        cluster.certificates = state.certificates_bundle.clone();
        Some(cluster)
    }

    pub fn to_state(&self) -> RkeState {
        RkeState {
            rke_config: Some(self.config.clone()),
            certificates_bundle: self.certificates.clone(),
            encryption_config: self.encryption_config.clone(),
        }
    }

    /// `https://<第一个控制节点地址>:6443`
    pub fn api_url(&self) -> AdaptorResult<String> {
        let host = self.control_plane_hosts.first().ok_or_else(|| {
            AdaptorError::ClusterNodeRoleMiss {
                role: NodeRole::Controlplane.as_str().to_string(),
            }
        })?;
        Ok(format!("https://{}:{}", host.address, KUBE_API_PORT))
    }

    /// 管理员客户端证书与CA证书（PEM）
    pub fn admin_credentials(&self) -> AdaptorResult<AdminCredentials> {
        let ca = self
            .certificates
            .get(CA_CERT_NAME)
            .ok_or_else(|| AdaptorError::engine(format!("证书 {CA_CERT_NAME} 不存在")))?;
        let admin = self
            .certificates
            .get(KUBE_ADMIN_CERT_NAME)
            .ok_or_else(|| AdaptorError::engine(format!("证书 {KUBE_ADMIN_CERT_NAME} 不存在")))?;
        Ok(AdminCredentials {
            ca_cert: ca.certificate_pem.clone(),
            client_cert: admin.certificate_pem.clone(),
            client_key: admin.key_pem.clone(),
        })
    }

    /// 按地址去重后的全部节点，顺序为 etcd、controlplane、worker
    pub fn all_hosts(&self) -> Vec<RkeNode> {
        let mut seen = BTreeSet::new();
        self.etcd_hosts
            .iter()
            .chain(self.control_plane_hosts.iter())
            .chain(self.worker_hosts.iter())
            .filter(|h| seen.insert(h.address.clone()))
            .cloned()
            .collect()
    }

    pub fn host_names(&self) -> BTreeSet<String> {
        self.config
            .nodes
            .iter()
            .map(|n| n.node_name().to_string())
            .collect()
    }

    pub fn is_inactive(&self, address: &str) -> bool {
        self.inactive_hosts.iter().any(|h| h.address == address)
    }

    pub fn mark_inactive(&mut self, host: &RkeNode) {
        if !self.is_inactive(&host.address) {
            self.inactive_hosts.push(host.clone());
        }
    }
}

/// 生成kubeconfig所需的证书材料
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminCredentials {
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
}

/// cluster_up 的结果
#[derive(Debug, Clone)]
pub struct UpOutcome {
    pub api_url: String,
    pub credentials: AdminCredentials,
    pub certificates: CertificateBundle,
}
