//! 集群提供商适配接口
//!
//! `rke` 与 `custom` 两种提供商实现同一组能力，由 [`AdaptorFactory`] 按名称选择。

use std::sync::Arc;

use adaptor_core::{
    models::{KubernetesCluster, RainbondInitConfig, RkeConfig},
    traits::EventSink,
    AdaptorError, AdaptorResult, Cancellation,
};
use async_trait::async_trait;

use crate::custom_adaptor::CustomAdaptor;
use crate::lifecycle::{CreateKubernetesRequest, ExpansionNodeRequest};
use crate::rke_adaptor::RkeAdaptor;

pub const RKE_PROVIDER: &str = "rke";
pub const CUSTOM_PROVIDER: &str = "custom";

/// 登记新集群的请求
#[derive(Debug, Clone, Default)]
pub struct CreateClusterRequest {
    pub eid: String,
    pub name: String,
    /// rke 提供商可选，提前保存节点规划
    pub rke_config: Option<RkeConfig>,
    /// custom 提供商必填
    pub kube_config: String,
    /// custom 提供商可选，逗号分隔
    pub eip: Option<String>,
}

#[async_trait]
pub trait ClusterAdaptor: Send + Sync {
    fn provider(&self) -> &'static str;

    /// 企业下的全部集群，探测失败的集群不出现在结果中
    async fn cluster_list(&self, eid: &str) -> AdaptorResult<Vec<KubernetesCluster>>;

    async fn describe_cluster(&self, eid: &str, cluster_id: &str)
        -> AdaptorResult<KubernetesCluster>;

    /// 已安装Rainbond的集群拒绝删除
    async fn delete_cluster(&self, eid: &str, cluster_id: &str) -> AdaptorResult<()>;

    async fn get_kube_config(&self, eid: &str, cluster_id: &str) -> AdaptorResult<String>;

    async fn get_rainbond_init_config(
        &self,
        eid: &str,
        cluster_id: &str,
    ) -> AdaptorResult<RainbondInitConfig>;

    /// 安装过程中的错误只通过事件上报，返回 `Ok(None)`
    async fn create_rainbond_kubernetes(
        &self,
        request: &CreateKubernetesRequest,
        sink: &dyn EventSink,
        cancel: &Cancellation,
    ) -> AdaptorResult<Option<KubernetesCluster>>;

    async fn expansion_node(
        &self,
        request: &ExpansionNodeRequest,
        sink: &dyn EventSink,
        cancel: &Cancellation,
    ) -> AdaptorResult<Option<KubernetesCluster>>;

    async fn create_cluster(&self, request: &CreateClusterRequest)
        -> AdaptorResult<KubernetesCluster>;
}

#[derive(Clone)]
pub struct AdaptorFactory {
    rke: Arc<RkeAdaptor>,
    custom: Arc<CustomAdaptor>,
}

impl AdaptorFactory {
    pub fn new(rke: Arc<RkeAdaptor>, custom: Arc<CustomAdaptor>) -> Self {
        Self { rke, custom }
    }

    pub fn get(&self, provider: &str) -> AdaptorResult<Arc<dyn ClusterAdaptor>> {
        match provider {
            RKE_PROVIDER => Ok(self.rke.clone() as Arc<dyn ClusterAdaptor>),
            CUSTOM_PROVIDER => Ok(self.custom.clone() as Arc<dyn ClusterAdaptor>),
            other => Err(AdaptorError::ProviderNotSupported(other.to_string())),
        }
    }
}
