use std::sync::Arc;

use adaptor_core::{
    models::{
        KubernetesCluster, NodeRole, RainbondInitConfig, RkeCluster, RkeConfig, RkeNode,
    },
    traits::{EventSink, RkeClusterRepository},
    AdaptorError, AdaptorResult, Cancellation,
};
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::adaptor::{ClusterAdaptor, CreateClusterRequest, RKE_PROVIDER};
use crate::lifecycle::{CreateKubernetesRequest, ExpansionNodeRequest, RkeLifecycle};
use crate::health::HealthChecker;

const ETCD_CLIENT_PORT: u16 = 2379;

pub struct RkeAdaptor {
    clusters: Arc<dyn RkeClusterRepository>,
    lifecycle: Arc<RkeLifecycle>,
    health: Arc<HealthChecker>,
}

impl RkeAdaptor {
    pub fn new(
        clusters: Arc<dyn RkeClusterRepository>,
        lifecycle: Arc<RkeLifecycle>,
        health: Arc<HealthChecker>,
    ) -> Self {
        Self {
            clusters,
            lifecycle,
            health,
        }
    }

    async fn describe(&self, cluster: &RkeCluster) -> AdaptorResult<KubernetesCluster> {
        self.health
            .check(KubernetesCluster::from_rke(cluster), &cluster.kube_config)
            .await
            .into_result()
    }
}

/// 节点规划：优先使用保存的 cluster.yml，其次是节点列表
fn planned_nodes(cluster: &RkeCluster) -> AdaptorResult<Vec<RkeNode>> {
    if !cluster.rke_config.trim().is_empty() {
        return Ok(RkeConfig::from_yaml(&cluster.rke_config)?.nodes);
    }
    cluster.nodes()
}

fn init_config_from_nodes(cluster_id: &str, nodes: &[RkeNode]) -> RainbondInitConfig {
    let addresses = |role: NodeRole| -> Vec<String> {
        nodes
            .iter()
            .filter(|n| n.has_role(role))
            .map(|n| n.public_address().to_string())
            .collect()
    };
    let gateway_nodes = addresses(NodeRole::Controlplane);
    let etcd_endpoints = nodes
        .iter()
        .filter(|n| n.has_role(NodeRole::Etcd))
        .map(|n| {
            let host = if n.internal_ip.is_empty() {
                &n.address
            } else {
                &n.internal_ip
            };
            format!("https://{host}:{ETCD_CLIENT_PORT}")
        })
        .collect();

    RainbondInitConfig {
        cluster_id: cluster_id.to_string(),
        eip: gateway_nodes.clone(),
        gateway_nodes,
        chaos_nodes: addresses(NodeRole::Worker),
        etcd_endpoints,
    }
}

#[async_trait]
impl ClusterAdaptor for RkeAdaptor {
    fn provider(&self) -> &'static str {
        RKE_PROVIDER
    }

    async fn cluster_list(&self, eid: &str) -> AdaptorResult<Vec<KubernetesCluster>> {
        let clusters = self.clusters.list(eid).await?;
        let targets = clusters
            .iter()
            .map(|c| (KubernetesCluster::from_rke(c), c.kube_config.clone()))
            .collect();
        Ok(self.health.check_all(targets).await)
    }

    async fn describe_cluster(
        &self,
        eid: &str,
        cluster_id: &str,
    ) -> AdaptorResult<KubernetesCluster> {
        let cluster = self.clusters.get(eid, cluster_id).await?;
        self.describe(&cluster).await
    }

    #[instrument(skip(self))]
    async fn delete_cluster(&self, eid: &str, cluster_id: &str) -> AdaptorResult<()> {
        let cluster = self.clusters.get(eid, cluster_id).await?;
        let report = self
            .health
            .check(KubernetesCluster::from_rke(&cluster), &cluster.kube_config)
            .await;
        if report.cluster.rainbond_init {
            return Err(AdaptorError::ClusterNotAllowDelete(cluster.cluster_id));
        }
        self.clusters.delete(eid, &cluster.cluster_id).await?;
        info!("已删除RKE集群记录: {}", cluster.name);
        Ok(())
    }

    async fn get_kube_config(&self, eid: &str, cluster_id: &str) -> AdaptorResult<String> {
        let cluster = self.clusters.get(eid, cluster_id).await?;
        if cluster.kube_config.is_empty() {
            return Err(AdaptorError::KubeConfigEmpty);
        }
        Ok(cluster.kube_config)
    }

    async fn get_rainbond_init_config(
        &self,
        eid: &str,
        cluster_id: &str,
    ) -> AdaptorResult<RainbondInitConfig> {
        let cluster = self.clusters.get(eid, cluster_id).await?;
        let nodes = planned_nodes(&cluster)?;
        Ok(init_config_from_nodes(&cluster.cluster_id, &nodes))
    }

    async fn create_rainbond_kubernetes(
        &self,
        request: &CreateKubernetesRequest,
        sink: &dyn EventSink,
        cancel: &Cancellation,
    ) -> AdaptorResult<Option<KubernetesCluster>> {
        Ok(self
            .lifecycle
            .create_rainbond_kubernetes(request, sink, cancel)
            .await
            .map(|c| KubernetesCluster::from_rke(&c)))
    }

    async fn expansion_node(
        &self,
        request: &ExpansionNodeRequest,
        sink: &dyn EventSink,
        cancel: &Cancellation,
    ) -> AdaptorResult<Option<KubernetesCluster>> {
        Ok(self
            .lifecycle
            .expansion_node(request, sink, cancel)
            .await
            .map(|c| KubernetesCluster::from_rke(&c)))
    }

    #[instrument(skip(self, request), fields(eid = %request.eid, name = %request.name))]
    async fn create_cluster(
        &self,
        request: &CreateClusterRequest,
    ) -> AdaptorResult<KubernetesCluster> {
        let mut cluster = RkeCluster::new(&request.eid, &request.name);
        cluster.validate()?;
        if let Some(rke_config) = &request.rke_config {
            rke_config.validate_nodes()?;
            cluster.set_nodes(&rke_config.nodes)?;
            cluster.rke_config = rke_config.to_yaml()?;
        }
        let created = self.clusters.create(&cluster).await?;
        info!(cluster_id = %created.cluster_id, "已登记RKE集群");
        Ok(KubernetesCluster::from_rke(&created))
    }
}
