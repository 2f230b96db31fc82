//! 集群健康探测
//!
//! 使用存储的kubeconfig访问集群API，补充版本、节点数量与Rainbond安装状态。

use std::sync::Arc;
use std::time::Duration;

use adaptor_core::{
    models::{ClusterState, KubernetesCluster},
    traits::{KubeClientFactory, KubeClusterApi},
    AdaptorError,
};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

/// Rainbond 区域配置所在命名空间
pub const REGION_NAMESPACE: &str = "rbd-system";
/// 存在即表示集群已安装Rainbond
pub const REGION_CONFIG_NAME: &str = "region-config";

/// 支持的最低版本（含）
pub const MIN_SUPPORTED_VERSION: Version = Version::new(1, 19, 0);
/// 支持的最高版本（不含）
pub const MAX_SUPPORTED_VERSION: Version = Version::new(1, 26, 0);

const VERSION_TIMEOUT: Duration = Duration::from_secs(3);
const NODE_LIST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// 解析 `v1.22.3`、`v1.23.10-rancher1` 这类版本号，忽略预发布与构建后缀
    pub fn parse(version: &str) -> Option<Self> {
        let core = version.trim().trim_start_matches('v');
        let core = core.split(['-', '+']).next()?;
        let mut parts = core.split('.').map(|p| p.parse::<u64>());
        let major = parts.next()?.ok()?;
        let minor = parts.next()?.ok()?;
        let patch = match parts.next() {
            Some(patch) => patch.ok()?,
            None => 0,
        };
        Some(Self::new(major, minor, patch))
    }

    pub fn is_supported(&self) -> bool {
        *self >= MIN_SUPPORTED_VERSION && *self < MAX_SUPPORTED_VERSION
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// 一次探测的结果
///
/// 即使探测失败，`cluster` 中也保留已获取到的信息，`error` 为失败原因。
#[derive(Debug)]
pub struct HealthReport {
    pub cluster: KubernetesCluster,
    pub error: Option<AdaptorError>,
}

impl HealthReport {
    fn ok(cluster: KubernetesCluster) -> Self {
        Self {
            cluster,
            error: None,
        }
    }

    fn failed(cluster: KubernetesCluster, error: AdaptorError) -> Self {
        Self {
            cluster,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<KubernetesCluster, AdaptorError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.cluster),
        }
    }
}

pub struct HealthChecker {
    kube: Arc<dyn KubeClientFactory>,
    concurrency: usize,
    version_timeout: Duration,
    node_list_timeout: Duration,
}

impl HealthChecker {
    pub fn new(kube: Arc<dyn KubeClientFactory>, concurrency: usize) -> Self {
        Self {
            kube,
            concurrency: concurrency.max(1),
            version_timeout: VERSION_TIMEOUT,
            node_list_timeout: NODE_LIST_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, version: Duration, node_list: Duration) -> Self {
        self.version_timeout = version;
        self.node_list_timeout = node_list;
        self
    }

    /// 探测单个集群
    ///
    /// 没有kubeconfig的集群（尚未安装完成）原样返回，不做探测。
    pub async fn check(&self, mut cluster: KubernetesCluster, kube_config: &str) -> HealthReport {
        if kube_config.trim().is_empty() {
            return HealthReport::ok(cluster);
        }

        let api = match self.kube.connect(kube_config).await {
            Ok(api) => api,
            Err(e) => {
                warn!("集群 {} 创建客户端失败: {}", cluster.cluster_id, e);
                cluster.parameters.disable("无法创建集群通信客户端");
                return HealthReport::failed(cluster, e);
            }
        };

        let version = match tokio::time::timeout(self.version_timeout, api.server_version()).await {
            Ok(Ok(version)) => version,
            Ok(Err(e)) => {
                debug!("集群 {} 获取版本失败: {}", cluster.cluster_id, e);
                cluster.parameters.disable("无法访问集群API，请检查集群状态");
                cluster.state = ClusterState::Offline;
                return HealthReport::ok(cluster);
            }
            Err(_) => {
                debug!("集群 {} 获取版本超时", cluster.cluster_id);
                cluster.parameters.disable("访问集群API超时，请检查集群状态");
                cluster.state = ClusterState::Offline;
                return HealthReport::ok(cluster);
            }
        };

        cluster.current_version = version.clone();
        if !Version::parse(&version)
            .map(|v| v.is_supported())
            .unwrap_or(false)
        {
            cluster.parameters.disable(format!(
                "当前集群版本为 {}，Rainbond 仅支持 {} 及以上、{} 以下的Kubernetes版本",
                version, MIN_SUPPORTED_VERSION, MAX_SUPPORTED_VERSION
            ));
        }

        match self.count_nodes(api.as_ref()).await {
            Ok(size) => cluster.size = size,
            Err(e) => {
                debug!("集群 {} 获取节点失败: {}", cluster.cluster_id, e);
                cluster.parameters.disable("无法获取集群节点列表");
                return HealthReport::ok(cluster);
            }
        }

        cluster.state = ClusterState::Running;
        match api
            .config_map_exists(REGION_NAMESPACE, REGION_CONFIG_NAME)
            .await
        {
            Ok(exists) => cluster.rainbond_init = exists,
            Err(e) => warn!("集群 {} 查询区域配置失败: {}", cluster.cluster_id, e),
        }

        HealthReport::ok(cluster)
    }

    async fn count_nodes(&self, api: &dyn KubeClusterApi) -> Result<usize, AdaptorError> {
        tokio::time::timeout(self.node_list_timeout, api.node_count())
            .await
            .map_err(|_| AdaptorError::Timeout("获取节点列表".to_string()))?
    }

    /// 并发探测多个集群，失败的集群记录日志后忽略
    ///
    /// 结果顺序不固定。
    pub async fn check_all(
        &self,
        clusters: Vec<(KubernetesCluster, String)>,
    ) -> Vec<KubernetesCluster> {
        stream::iter(clusters)
            .map(|(cluster, kube_config)| async move {
                self.check(cluster, &kube_config).await
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|report| async move {
                match report.into_result() {
                    Ok(cluster) => Some(cluster),
                    Err(e) => {
                        warn!("探测集群失败: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(Version::parse("v1.22.3"), Some(Version::new(1, 22, 3)));
        assert_eq!(
            Version::parse("v1.23.10-rancher1"),
            Some(Version::new(1, 23, 10))
        );
        assert_eq!(Version::parse("v1.24.4+k3s1"), Some(Version::new(1, 24, 4)));
        assert_eq!(Version::parse("1.20"), Some(Version::new(1, 20, 0)));
        assert_eq!(Version::parse("latest"), None);
    }

    #[test]
    fn test_supported_range() {
        assert!(!Version::new(1, 18, 9).is_supported());
        assert!(Version::new(1, 19, 0).is_supported());
        assert!(Version::new(1, 25, 99).is_supported());
        assert!(!Version::new(1, 26, 0).is_supported());
        assert_eq!(MIN_SUPPORTED_VERSION.to_string(), "v1.19.0");
    }
}
