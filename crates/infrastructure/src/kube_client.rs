use std::sync::Arc;

use adaptor_core::{
    traits::{KubeClientFactory, KubeClusterApi},
    AdaptorError, AdaptorResult,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Node};
use kube::{
    api::ListParams,
    config::{KubeConfigOptions, Kubeconfig},
    Api, Client, Config,
};
use tracing::debug;

/// 基于 kube-rs 的集群客户端
pub struct KubeRsClusterApi {
    client: Client,
}

impl KubeRsClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClusterApi for KubeRsClusterApi {
    async fn server_version(&self) -> AdaptorResult<String> {
        let info = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| AdaptorError::KubeApiUnreachable(e.to_string()))?;
        let value = serde_json::to_value(&info)?;
        Ok(value
            .get("gitVersion")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn node_count(&self) -> AdaptorResult<usize> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| AdaptorError::kube(format!("获取节点列表失败: {e}")))?;
        Ok(list.items.len())
    }

    async fn config_map_exists(&self, namespace: &str, name: &str) -> AdaptorResult<bool> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let found = config_maps
            .get_opt(name)
            .await
            .map_err(|e| AdaptorError::kube(format!("查询ConfigMap {namespace}/{name} 失败: {e}")))?;
        Ok(found.is_some())
    }
}

/// 从存储的kubeconfig文本构建客户端
#[derive(Debug, Default, Clone)]
pub struct KubeRsClientFactory;

#[async_trait]
impl KubeClientFactory for KubeRsClientFactory {
    async fn connect(&self, kube_config: &str) -> AdaptorResult<Arc<dyn KubeClusterApi>> {
        if kube_config.trim().is_empty() {
            return Err(AdaptorError::KubeConfigEmpty);
        }

        let kubeconfig = Kubeconfig::from_yaml(kube_config)
            .map_err(|e| AdaptorError::kube(format!("解析kubeconfig失败: {e}")))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| AdaptorError::kube(format!("加载kubeconfig失败: {e}")))?;
        debug!("创建集群客户端: {}", config.cluster_url);

        let client = Client::try_from(config)
            .map_err(|e| AdaptorError::kube(format!("创建集群客户端失败: {e}")))?;
        Ok(Arc::new(KubeRsClusterApi::new(client)))
    }
}

/// 校验kubeconfig文本能否被解析
pub fn parse_kube_config(kube_config: &str) -> AdaptorResult<()> {
    if kube_config.trim().is_empty() {
        return Err(AdaptorError::KubeConfigEmpty);
    }
    Kubeconfig::from_yaml(kube_config)
        .map(|_| ())
        .map_err(|e| AdaptorError::ConfigInvalid(format!("kubeconfig格式错误: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- cluster:
    server: https://10.0.0.1:6443
    insecure-skip-tls-verify: true
  name: demo
contexts:
- context:
    cluster: demo
    user: admin
  name: demo
current-context: demo
users:
- name: admin
  user:
    token: abc
"#;

    #[test]
    fn test_parse_kube_config() {
        assert!(parse_kube_config(KUBECONFIG).is_ok());
        assert!(matches!(
            parse_kube_config("  "),
            Err(AdaptorError::KubeConfigEmpty)
        ));
        assert!(matches!(
            parse_kube_config("clusters: 42"),
            Err(AdaptorError::ConfigInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_factory_rejects_empty_config() {
        let factory = KubeRsClientFactory;
        let result = factory.connect("").await;
        assert!(matches!(result, Err(AdaptorError::KubeConfigEmpty)));
    }

    #[tokio::test]
    async fn test_factory_builds_client_without_network() {
        let factory = KubeRsClientFactory;
        assert!(factory.connect(KUBECONFIG).await.is_ok());
    }
}
