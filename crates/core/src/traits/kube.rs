use std::sync::Arc;

use async_trait::async_trait;

use crate::AdaptorResult;

/// 健康探测所需的Kubernetes API子集
#[async_trait]
pub trait KubeClusterApi: Send + Sync {
    /// `/version` 中的 gitVersion，例如 `v1.22.3`
    async fn server_version(&self) -> AdaptorResult<String>;

    async fn node_count(&self) -> AdaptorResult<usize>;

    async fn config_map_exists(&self, namespace: &str, name: &str) -> AdaptorResult<bool>;
}

/// 根据kubeconfig文本构建集群客户端
#[async_trait]
pub trait KubeClientFactory: Send + Sync {
    async fn connect(&self, kube_config: &str) -> AdaptorResult<Arc<dyn KubeClusterApi>>;
}
