use std::sync::Arc;

use adaptor_core::{
    models::{CustomCluster, KubernetesCluster, RainbondInitConfig},
    traits::{CustomClusterRepository, EventSink},
    AdaptorError, AdaptorResult, Cancellation,
};
use adaptor_infrastructure::parse_kube_config;
use async_trait::async_trait;
use tracing::info;

use crate::adaptor::{ClusterAdaptor, CreateClusterRequest, CUSTOM_PROVIDER};
use crate::lifecycle::{CreateKubernetesRequest, ExpansionNodeRequest};
use crate::health::HealthChecker;

/// 通过kubeconfig导入的集群，只保存凭据
pub struct CustomAdaptor {
    clusters: Arc<dyn CustomClusterRepository>,
    health: Arc<HealthChecker>,
}

impl CustomAdaptor {
    pub fn new(clusters: Arc<dyn CustomClusterRepository>, health: Arc<HealthChecker>) -> Self {
        Self { clusters, health }
    }
}

#[async_trait]
impl ClusterAdaptor for CustomAdaptor {
    fn provider(&self) -> &'static str {
        CUSTOM_PROVIDER
    }

    async fn cluster_list(&self, eid: &str) -> AdaptorResult<Vec<KubernetesCluster>> {
        let clusters = self.clusters.list(eid).await?;
        let targets = clusters
            .iter()
            .map(|c| (KubernetesCluster::from_custom(c), c.kube_config.clone()))
            .collect();
        Ok(self.health.check_all(targets).await)
    }

    async fn describe_cluster(
        &self,
        eid: &str,
        cluster_id: &str,
    ) -> AdaptorResult<KubernetesCluster> {
        let cluster = self.clusters.get(eid, cluster_id).await?;
        self.health
            .check(KubernetesCluster::from_custom(&cluster), &cluster.kube_config)
            .await
            .into_result()
    }

    async fn delete_cluster(&self, eid: &str, cluster_id: &str) -> AdaptorResult<()> {
        let cluster = self.clusters.get(eid, cluster_id).await?;
        let report = self
            .health
            .check(KubernetesCluster::from_custom(&cluster), &cluster.kube_config)
            .await;
        if report.cluster.rainbond_init {
            return Err(AdaptorError::ClusterNotAllowDelete(cluster.cluster_id));
        }
        self.clusters.delete(eid, &cluster.cluster_id).await?;
        info!("已删除自定义集群记录: {}", cluster.name);
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
        Ok(RainbondInitConfig {
            cluster_id: cluster.cluster_id.clone(),
            eip: cluster.eips(),
            ..Default::default()
        })
    }

    async fn create_rainbond_kubernetes(
        &self,
        _request: &CreateKubernetesRequest,
        _sink: &dyn EventSink,
        _cancel: &Cancellation,
    ) -> AdaptorResult<Option<KubernetesCluster>> {
        Err(AdaptorError::NotSupportReinstall)
    }

    async fn expansion_node(
        &self,
        _request: &ExpansionNodeRequest,
        _sink: &dyn EventSink,
        _cancel: &Cancellation,
    ) -> AdaptorResult<Option<KubernetesCluster>> {
        Err(AdaptorError::NotSupportUpdateKubernetes)
    }

    async fn create_cluster(
        &self,
        request: &CreateClusterRequest,
    ) -> AdaptorResult<KubernetesCluster> {
        if request.kube_config.trim().is_empty() {
            return Err(AdaptorError::KubeConfigEmpty);
        }
        parse_kube_config(&request.kube_config)?;

        let mut cluster = CustomCluster::new(&request.eid, &request.name, &request.kube_config);
        cluster.eip = request.eip.clone();
        let created = self.clusters.create(&cluster).await?;
        info!(cluster_id = %created.cluster_id, "已导入自定义集群");
        Ok(KubernetesCluster::from_custom(&created))
    }
}
