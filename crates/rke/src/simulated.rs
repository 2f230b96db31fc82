//! 不连接任何主机的模拟引擎
//!
//! `TEST_MODE=true` 时由服务使用，测试中用于注入不可达节点、原语失败和
//! 滚动升级提示，并记录原语调用顺序。

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use adaptor_core::{
    models::{NodeRole, RkeConfig, RkeNode},
    AdaptorError, AdaptorResult,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use tracing::debug;

use crate::cluster::KubeCluster;
use crate::engine::RkeEngine;
use crate::log::EngineLog;
use crate::options::ExternalFlags;
use crate::state::{
    CertificateBundle, CertificatePki, FullState, RkeState, CA_CERT_NAME, KUBE_ADMIN_CERT_NAME,
};

const SERVICE_CERT_NAMES: [&str; 5] = [
    "kube-apiserver",
    "kube-controller-manager",
    "kube-scheduler",
    "kube-proxy",
    "kube-node",
];

#[derive(Debug, Default)]
pub struct SimulatedEngine {
    unreachable_hosts: BTreeSet<String>,
    failures: HashMap<String, String>,
    control_plane_message: Option<String>,
    worker_plane_message: Option<String>,
    legacy_kube_api: bool,
    save_state_failures: AtomicU32,
    calls: Mutex<Vec<String>>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// etcd/controlplane 节点不可达时隧道失败，worker 节点被记为 inactive
    pub fn with_unreachable_host(mut self, address: &str) -> Self {
        self.unreachable_hosts.insert(address.to_string());
        self
    }

    /// 指定原语（方法名）调用时返回错误
    pub fn fail_on(mut self, primitive: &str, message: &str) -> Self {
        self.failures
            .insert(primitive.to_string(), message.to_string());
        self
    }

    pub fn with_max_unavailable_messages(
        mut self,
        control_plane: Option<&str>,
        worker_plane: Option<&str>,
    ) -> Self {
        self.control_plane_message = control_plane.map(str::to_string);
        self.worker_plane_message = worker_plane.map(str::to_string);
        self
    }

    pub fn with_legacy_kube_api(mut self, legacy: bool) -> Self {
        self.legacy_kube_api = legacy;
        self
    }

    /// 保存状态到集群时前 n 次失败
    pub fn with_save_state_failures(self, failures: u32) -> Self {
        self.save_state_failures.store(failures, Ordering::SeqCst);
        self
    }

    /// 已调用的原语名称，按调用顺序
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn was_called(&self, primitive: &str) -> bool {
        self.calls().iter().any(|c| c == primitive)
    }

    fn record(&self, primitive: &str) -> AdaptorResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(primitive.to_string());
        }
        debug!("模拟引擎调用: {}", primitive);
        match self.failures.get(primitive) {
            Some(message) => Err(AdaptorError::engine(message.clone())),
            None => Ok(()),
        }
    }
}

fn synthetic_pem(kind: &str, name: &str) -> String {
    let body = STANDARD.encode(format!(
        "simulated {} for {} issued at {}",
        kind.to_lowercase(),
        name,
        Utc::now().to_rfc3339()
    ));
    format!("-----BEGIN {kind}-----\n{body}\n-----END {kind}-----\n")
}

fn synthetic_certificate(name: &str) -> CertificatePki {
    CertificatePki {
        certificate_pem: synthetic_pem("CERTIFICATE", name),
        key_pem: synthetic_pem("RSA PRIVATE KEY", name),
        name: name.to_string(),
        common_name: name.to_string(),
        ..Default::default()
    }
}

fn etcd_cert_name(node: &RkeNode) -> String {
    format!("kube-etcd-{}", node.address.replace(['.', ':'], "-"))
}

/// 集群需要的全部证书名称
fn certificate_names(config: &RkeConfig) -> Vec<String> {
    let mut names: Vec<String> = [CA_CERT_NAME, KUBE_ADMIN_CERT_NAME]
        .into_iter()
        .chain(SERVICE_CERT_NAMES)
        .map(str::to_string)
        .collect();
    names.extend(config.nodes_with_role(NodeRole::Etcd).map(etcd_cert_name));
    names
}

/// 补齐缺失的证书，已有证书保持不变
fn fill_certificates(config: &RkeConfig, bundle: &mut CertificateBundle) {
    for name in certificate_names(config) {
        bundle
            .entry(name.clone())
            .or_insert_with(|| synthetic_certificate(&name));
    }
}

fn synthetic_encryption_config() -> String {
    let secret = STANDARD.encode(Utc::now().timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    format!(
        "apiVersion: apiserver.config.k8s.io/v1\nkind: EncryptionConfiguration\nresources:\n- resources:\n  - secrets\n  providers:\n  - aescbc:\n      keys:\n      - name: key-{}\n        secret: {}\n  - identity: {{}}\n",
        Utc::now().format("%Y%m%d%H%M%S"),
        secret
    )
}

fn encryption_enabled(config: &RkeConfig) -> bool {
    config
        .secrets_encryption()
        .map(|e| e.enabled)
        .unwrap_or(false)
}

/// "10%" 按比例向下取整、至少为1；纯数字按个数
fn parse_max_unavailable(value: &str, default: &str, total: usize) -> AdaptorResult<usize> {
    let value = if value.is_empty() { default } else { value };
    let parsed = match value.strip_suffix('%') {
        Some(percent) => {
            let percent: usize = percent.trim().parse().map_err(|_| {
                AdaptorError::ConfigInvalid(format!("max_unavailable 配置无效: {value}"))
            })?;
            total * percent / 100
        }
        None => value.trim().parse().map_err(|_| {
            AdaptorError::ConfigInvalid(format!("max_unavailable 配置无效: {value}"))
        })?,
    };
    Ok(parsed.max(1))
}

#[async_trait]
impl RkeEngine for SimulatedEngine {
    async fn rebuild_full_state(
        &self,
        config: &RkeConfig,
        old_state: Option<&FullState>,
        _flags: &ExternalFlags,
        log: &EngineLog,
    ) -> AdaptorResult<FullState> {
        self.record("rebuild_full_state")?;

        let mut state = old_state.cloned().unwrap_or_default();
        let mut certificates = state.desired_state.certificates_bundle.clone();
        fill_certificates(config, &mut certificates);

        let mut encryption_config = state.desired_state.encryption_config.clone();
        if !encryption_enabled(config) {
            encryption_config.clear();
        } else if encryption_config.is_empty() {
            encryption_config = synthetic_encryption_config();
        }

        state.desired_state = RkeState {
            rke_config: Some(config.clone()),
            certificates_bundle: certificates,
            encryption_config,
        };
        log.info("Rebuilding and updating local kube config").await;
        Ok(state)
    }

    async fn tunnel_hosts(&self, cluster: &mut KubeCluster) -> AdaptorResult<()> {
        self.record("tunnel_hosts")?;
        for host in cluster.all_hosts() {
            if !self.unreachable_hosts.contains(&host.address) {
                cluster
                    .log
                    .info(format!("[dialer] Setup tunnel for host [{}]", host.address))
                    .await;
                continue;
            }
            let message = format!(
                "Failed to set up SSH tunneling for host [{}]: dial tcp {}:{}: connect: no route to host",
                host.address,
                host.address,
                host.ssh_port().unwrap_or(22)
            );
            if host.has_role(NodeRole::Etcd) || host.has_role(NodeRole::Controlplane) {
                return Err(AdaptorError::engine(message));
            }
            cluster.log.warn(&message).await;
            cluster.mark_inactive(&host);
        }
        Ok(())
    }

    async fn get_cluster_state(
        &self,
        cluster: &KubeCluster,
        full_state: &FullState,
    ) -> AdaptorResult<Option<KubeCluster>> {
        self.record("get_cluster_state")?;
        Ok(KubeCluster::from_state(
            &full_state.current_state,
            cluster.log.clone(),
        ))
    }

    async fn check_cluster_ports(
        &self,
        _cluster: &KubeCluster,
        _current: Option<&KubeCluster>,
    ) -> AdaptorResult<()> {
        self.record("check_cluster_ports")
    }

    async fn set_up_authentication(
        &self,
        cluster: &mut KubeCluster,
        current: Option<&KubeCluster>,
        full_state: &FullState,
    ) -> AdaptorResult<()> {
        self.record("set_up_authentication")?;
        let mut certificates = match current {
            Some(current) if !current.certificates.is_empty() => current.certificates.clone(),
            _ => full_state.desired_state.certificates_bundle.clone(),
        };
        fill_certificates(&cluster.config, &mut certificates);
        cluster.certificates = certificates;
        Ok(())
    }

    async fn set_up_hosts(&self, cluster: &KubeCluster) -> AdaptorResult<()> {
        self.record("set_up_hosts")?;
        cluster
            .log
            .info("[certificates] Deploying kubernetes certificates to Cluster nodes")
            .await;
        Ok(())
    }

    async fn reconcile_cluster(
        &self,
        cluster: &mut KubeCluster,
        current: Option<&KubeCluster>,
        _flags: &ExternalFlags,
    ) -> AdaptorResult<()> {
        self.record("reconcile_cluster")?;
        let Some(current) = current else {
            return Ok(());
        };
        let desired = cluster.host_names();
        for removed in current.host_names().difference(&desired) {
            cluster
                .log
                .info(format!("[reconcile] Removing host [{removed}] from cluster"))
                .await;
        }
        Ok(())
    }

    async fn calculate_max_unavailable(
        &self,
        cluster: &KubeCluster,
    ) -> AdaptorResult<(usize, usize)> {
        self.record("calculate_max_unavailable")?;
        let strategy = cluster.config.upgrade_strategy.clone().unwrap_or_default();
        let workers = parse_max_unavailable(
            &strategy.max_unavailable_worker,
            "10%",
            cluster.worker_hosts.len(),
        )?;
        let controls = parse_max_unavailable(
            &strategy.max_unavailable_controlplane,
            "1",
            cluster.control_plane_hosts.len(),
        )?;
        Ok((workers, controls))
    }

    async fn reconcile_encryption_provider_file(
        &self,
        cluster: &mut KubeCluster,
        current: Option<&KubeCluster>,
    ) -> AdaptorResult<()> {
        self.record("reconcile_encryption_provider_file")?;
        let enabled = encryption_enabled(&cluster.config);
        let was_enabled = current
            .map(|c| !c.encryption_config.is_empty())
            .unwrap_or(false);

        if enabled && cluster.encryption_config.is_empty() {
            cluster.encryption_config = synthetic_encryption_config();
        } else if !enabled {
            cluster.encryption_config.clear();
        }
        cluster.rewrite_secrets = current.is_some() && enabled != was_enabled;
        Ok(())
    }

    async fn pre_pull_k8s_images(&self, cluster: &KubeCluster) -> AdaptorResult<()> {
        self.record("pre_pull_k8s_images")?;
        cluster
            .log
            .info("Pre-pulling kubernetes images")
            .await;
        Ok(())
    }

    async fn deploy_control_plane(
        &self,
        cluster: &KubeCluster,
        _reconcile: bool,
    ) -> AdaptorResult<Option<String>> {
        self.record("deploy_control_plane")?;
        cluster
            .log
            .info("[controlPlane] Successfully started Controller Plane..")
            .await;
        Ok(self.control_plane_message.clone())
    }

    async fn deploy_worker_plane(
        &self,
        cluster: &KubeCluster,
        _reconcile: bool,
    ) -> AdaptorResult<Option<String>> {
        self.record("deploy_worker_plane")?;
        cluster
            .log
            .info("[workerPlane] Successfully started Worker Plane..")
            .await;
        Ok(self.worker_plane_message.clone())
    }

    async fn apply_authz_resources(&self, _cluster: &KubeCluster) -> AdaptorResult<()> {
        self.record("apply_authz_resources")
    }

    async fn save_full_state_to_kubernetes(
        &self,
        _cluster: &KubeCluster,
        _full_state: &FullState,
    ) -> AdaptorResult<()> {
        self.record("save_full_state_to_kubernetes")?;
        let remaining = self.save_state_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.save_state_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(AdaptorError::engine("failed to save state configmap"));
        }
        Ok(())
    }

    async fn clean_dead_logs(&self, _cluster: &KubeCluster) -> AdaptorResult<()> {
        self.record("clean_dead_logs")
    }

    async fn sync_labels_and_taints(
        &self,
        _cluster: &KubeCluster,
        _current: Option<&KubeCluster>,
    ) -> AdaptorResult<()> {
        self.record("sync_labels_and_taints")
    }

    async fn configure_cluster(&self, cluster: &KubeCluster) -> AdaptorResult<()> {
        self.record("configure_cluster")?;
        cluster
            .log
            .info(format!(
                "[addons] Setting up network plugin: {}",
                cluster.config.network.plugin
            ))
            .await;
        Ok(())
    }

    async fn rewrite_secrets(&self, _cluster: &KubeCluster) -> AdaptorResult<()> {
        self.record("rewrite_secrets")
    }

    async fn restart_etcd_plane(&self, _cluster: &KubeCluster) -> AdaptorResult<()> {
        self.record("restart_etcd_plane")
    }

    async fn restart_control_plane(&self, _cluster: &KubeCluster) -> AdaptorResult<()> {
        self.record("restart_control_plane")
    }

    async fn restart_worker_plane(
        &self,
        cluster: &KubeCluster,
        hosts: &[RkeNode],
    ) -> AdaptorResult<()> {
        self.record("restart_worker_plane")?;
        cluster
            .log
            .info(format!("[workerPlane] Restarting {} hosts", hosts.len()))
            .await;
        Ok(())
    }

    async fn restart_cluster_pods(&self, _cluster: &KubeCluster) -> AdaptorResult<()> {
        self.record("restart_cluster_pods")
    }

    async fn is_legacy_kube_api(&self, _cluster: &KubeCluster) -> AdaptorResult<bool> {
        self.record("is_legacy_kube_api")?;
        Ok(self.legacy_kube_api)
    }

    async fn rotate_certificates(
        &self,
        cluster: &mut KubeCluster,
        full_state: &FullState,
    ) -> AdaptorResult<()> {
        self.record("rotate_certificates")?;
        let rotate = cluster.config.rotate_certificates.clone().unwrap_or_default();
        let mut certificates = full_state.desired_state.certificates_bundle.clone();

        for name in certificate_names(&cluster.config) {
            let service = if name.starts_with("kube-etcd") {
                "etcd"
            } else {
                name.as_str()
            };
            let regenerate = if name == CA_CERT_NAME {
                rotate.ca_certificates
            } else {
                rotate.includes(service)
            };
            if regenerate || !certificates.contains_key(&name) {
                certificates.insert(name.clone(), synthetic_certificate(&name));
            }
        }
        cluster.certificates = certificates;
        Ok(())
    }

    async fn rotate_encryption_key(
        &self,
        cluster: &mut KubeCluster,
        _full_state: &FullState,
        state_path: &Path,
    ) -> AdaptorResult<()> {
        self.record("rotate_encryption_key")?;
        let rotated = synthetic_encryption_config();
        cluster.encryption_config = rotated.clone();

        let mut state = FullState::read(state_path).await?;
        state.current_state.encryption_config = rotated;
        state.write(state_path).await?;
        cluster
            .log
            .info("Secrets encryption key rotated")
            .await;
        Ok(())
    }

    async fn generate_service_csrs(&self, cluster: &mut KubeCluster) -> AdaptorResult<()> {
        self.record("generate_service_csrs")?;
        for name in certificate_names(&cluster.config) {
            if name == CA_CERT_NAME {
                continue;
            }
            let pki = cluster
                .certificates
                .entry(name.clone())
                .or_insert_with(|| CertificatePki {
                    name: name.clone(),
                    common_name: name.clone(),
                    ..Default::default()
                });
            if pki.csr_pem.is_empty() {
                pki.csr_pem = synthetic_pem("CERTIFICATE REQUEST", &name);
            }
            if pki.key_pem.is_empty() {
                pki.key_pem = synthetic_pem("RSA PRIVATE KEY", &name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_unavailable() {
        assert_eq!(parse_max_unavailable("", "10%", 5).unwrap(), 1);
        assert_eq!(parse_max_unavailable("50%", "10%", 6).unwrap(), 3);
        assert_eq!(parse_max_unavailable("2", "1", 6).unwrap(), 2);
        assert!(parse_max_unavailable("many", "1", 6).is_err());
    }

    #[test]
    fn test_certificate_names_include_etcd_hosts() {
        let config = RkeConfig {
            nodes: vec![
                RkeNode::new("10.0.0.1", &[NodeRole::Etcd]),
                RkeNode::new("10.0.0.2", &[NodeRole::Worker]),
            ],
            ..Default::default()
        };
        let names = certificate_names(&config);
        assert!(names.contains(&"kube-etcd-10-0-0-1".to_string()));
        assert!(!names.contains(&"kube-etcd-10-0-0-2".to_string()));
        assert!(names.contains(&CA_CERT_NAME.to_string()));
    }

    #[tokio::test]
    async fn test_failure_injection_records_call() {
        let engine = SimulatedEngine::new().fail_on("set_up_hosts", "boom");
        let cluster = KubeCluster::new(RkeConfig::default(), "", EngineLog::discard());
        let err = engine.set_up_hosts(&cluster).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(engine.calls(), vec!["set_up_hosts"]);
    }
}
