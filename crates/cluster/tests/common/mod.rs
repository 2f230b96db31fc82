#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use adaptor_core::{
    models::{EventStatus, NodeRole, RkeConfig, RkeNode},
    traits::{EventSink, KubeClientFactory, KubeClusterApi},
    AdaptorError, AdaptorResult,
};
use async_trait::async_trait;

/// 模拟的集群API
#[derive(Debug, Clone)]
pub struct FakeCluster {
    pub version: Result<String, String>,
    pub nodes: usize,
    pub region_installed: bool,
    pub node_delay: Option<Duration>,
}

impl FakeCluster {
    pub fn healthy(version: &str, nodes: usize, region_installed: bool) -> Self {
        Self {
            version: Ok(version.to_string()),
            nodes,
            region_installed,
            node_delay: None,
        }
    }
}

#[async_trait]
impl KubeClusterApi for FakeCluster {
    async fn server_version(&self) -> AdaptorResult<String> {
        self.version.clone().map_err(AdaptorError::kube)
    }

    async fn node_count(&self) -> AdaptorResult<usize> {
        if let Some(delay) = self.node_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.nodes)
    }

    async fn config_map_exists(&self, namespace: &str, name: &str) -> AdaptorResult<bool> {
        Ok(self.region_installed && namespace == "rbd-system" && name == "region-config")
    }
}

/// 按kubeconfig中包含的标记返回对应的模拟集群，找不到时连接失败
#[derive(Default)]
pub struct FakeKubeFactory {
    clusters: Vec<(String, FakeCluster)>,
}

impl FakeKubeFactory {
    pub fn with(mut self, marker: &str, cluster: FakeCluster) -> Self {
        self.clusters.push((marker.to_string(), cluster));
        self
    }
}

#[async_trait]
impl KubeClientFactory for FakeKubeFactory {
    async fn connect(&self, kube_config: &str) -> AdaptorResult<Arc<dyn KubeClusterApi>> {
        if kube_config.trim().is_empty() {
            return Err(AdaptorError::KubeConfigEmpty);
        }
        self.clusters
            .iter()
            .find(|(marker, _)| kube_config.contains(marker.as_str()))
            .map(|(_, cluster)| Arc::new(cluster.clone()) as Arc<dyn KubeClusterApi>)
            .ok_or_else(|| AdaptorError::kube("invalid kubeconfig"))
    }
}

/// 记录所有上报的事件
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, EventStatus, String, String)>>,
}

impl RecordingSink {
    pub fn steps(&self) -> Vec<(String, EventStatus)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(step, status, _, _)| (step.clone(), *status))
            .collect()
    }

    pub fn last_message(&self) -> String {
        self.events
            .lock()
            .unwrap()
            .last()
            .map(|(_, _, message, _)| message.clone())
            .unwrap_or_default()
    }

    pub fn last_reason(&self) -> String {
        self.events
            .lock()
            .unwrap()
            .last()
            .map(|(_, _, _, reason)| reason.clone())
            .unwrap_or_default()
    }

    pub fn message_of(&self, step: &str, status: EventStatus) -> Option<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(s, st, _, _)| s == step && *st == status)
            .map(|(_, _, message, _)| message.clone())
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit_with_reason(&self, step: &str, message: &str, status: EventStatus, reason: &str) {
        self.events.lock().unwrap().push((
            step.to_string(),
            status,
            message.to_string(),
            reason.to_string(),
        ));
    }
}

pub fn all_roles() -> Vec<NodeRole> {
    vec![NodeRole::Controlplane, NodeRole::Etcd, NodeRole::Worker]
}

pub fn three_node_config() -> RkeConfig {
    let mut config = RkeConfig {
        cluster_name: "demo".to_string(),
        nodes: vec![
            RkeNode::new("10.0.0.1", &all_roles()),
            RkeNode::new("10.0.0.2", &all_roles()),
            RkeNode::new("10.0.0.3", &all_roles()),
        ],
        ..Default::default()
    };
    config.network.plugin = "calico".to_string();
    config.services.kube_controller.cluster_cidr = "10.42.0.0/16".to_string();
    config.services.kube_api.service_cluster_ip_range = "10.43.0.0/16".to_string();
    config
}

pub const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- cluster:
    server: https://172.16.0.10:6443
    insecure-skip-tls-verify: true
  name: imported
contexts:
- context:
    cluster: imported
    user: admin
  name: imported
current-context: imported
users:
- name: admin
  user:
    token: abc
"#;
