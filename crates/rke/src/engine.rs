//! 安装引擎接口
//!
//! 每个方法对应引擎的一个阻塞原语（建立SSH隧道、拉取镜像、部署组件等）。
//! 编排逻辑位于 [`crate::up`]、[`crate::rotate`] 与 [`crate::csr`]，
//! 它们只通过此接口驱动引擎。

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use adaptor_core::{
    models::{RkeConfig, RkeNode},
    AdaptorResult, Cancellation,
};
use async_trait::async_trait;

use crate::cluster::KubeCluster;
use crate::log::EngineLog;
use crate::options::{ExternalFlags, RetryPolicy};
use crate::state::FullState;

#[async_trait]
pub trait RkeEngine: Send + Sync {
    /// 由期望配置与旧状态生成新的完整状态（包括缺失的证书）
    async fn rebuild_full_state(
        &self,
        config: &RkeConfig,
        old_state: Option<&FullState>,
        flags: &ExternalFlags,
        log: &EngineLog,
    ) -> AdaptorResult<FullState>;

    /// 与所有节点建立隧道，无法连接的worker节点记入 inactive_hosts
    async fn tunnel_hosts(&self, cluster: &mut KubeCluster) -> AdaptorResult<()>;

    /// 读取集群当前状态，首次安装时返回 None
    async fn get_cluster_state(
        &self,
        cluster: &KubeCluster,
        full_state: &FullState,
    ) -> AdaptorResult<Option<KubeCluster>>;

    async fn check_cluster_ports(
        &self,
        cluster: &KubeCluster,
        current: Option<&KubeCluster>,
    ) -> AdaptorResult<()>;

    /// 生成或加载集群PKI
    async fn set_up_authentication(
        &self,
        cluster: &mut KubeCluster,
        current: Option<&KubeCluster>,
        full_state: &FullState,
    ) -> AdaptorResult<()>;

    async fn set_up_hosts(&self, cluster: &KubeCluster) -> AdaptorResult<()>;

    /// 对比当前与期望集群，移除多余节点并调整组件
    async fn reconcile_cluster(
        &self,
        cluster: &mut KubeCluster,
        current: Option<&KubeCluster>,
        flags: &ExternalFlags,
    ) -> AdaptorResult<()>;

    /// 返回 (worker, controlplane) 滚动升级时允许同时不可用的节点数
    async fn calculate_max_unavailable(&self, cluster: &KubeCluster)
        -> AdaptorResult<(usize, usize)>;

    async fn reconcile_encryption_provider_file(
        &self,
        cluster: &mut KubeCluster,
        current: Option<&KubeCluster>,
    ) -> AdaptorResult<()>;

    async fn pre_pull_k8s_images(&self, cluster: &KubeCluster) -> AdaptorResult<()>;

    /// 部分节点升级失败但未超过上限时返回提示信息
    async fn deploy_control_plane(
        &self,
        cluster: &KubeCluster,
        reconcile: bool,
    ) -> AdaptorResult<Option<String>>;

    async fn deploy_worker_plane(
        &self,
        cluster: &KubeCluster,
        reconcile: bool,
    ) -> AdaptorResult<Option<String>>;

    async fn apply_authz_resources(&self, cluster: &KubeCluster) -> AdaptorResult<()>;

    /// 将完整状态保存为集群内的ConfigMap
    async fn save_full_state_to_kubernetes(
        &self,
        cluster: &KubeCluster,
        full_state: &FullState,
    ) -> AdaptorResult<()>;

    async fn clean_dead_logs(&self, cluster: &KubeCluster) -> AdaptorResult<()>;

    async fn sync_labels_and_taints(
        &self,
        cluster: &KubeCluster,
        current: Option<&KubeCluster>,
    ) -> AdaptorResult<()>;

    /// 部署网络、DNS、Ingress等插件
    async fn configure_cluster(&self, cluster: &KubeCluster) -> AdaptorResult<()>;

    async fn rewrite_secrets(&self, cluster: &KubeCluster) -> AdaptorResult<()>;

    async fn restart_etcd_plane(&self, cluster: &KubeCluster) -> AdaptorResult<()>;

    async fn restart_control_plane(&self, cluster: &KubeCluster) -> AdaptorResult<()>;

    async fn restart_worker_plane(
        &self,
        cluster: &KubeCluster,
        hosts: &[RkeNode],
    ) -> AdaptorResult<()>;

    async fn restart_cluster_pods(&self, cluster: &KubeCluster) -> AdaptorResult<()>;

    /// kube-apiserver 是否仍在使用旧的参数格式
    async fn is_legacy_kube_api(&self, cluster: &KubeCluster) -> AdaptorResult<bool>;

    /// 按 rotate_certificates 参数重新签发证书
    async fn rotate_certificates(
        &self,
        cluster: &mut KubeCluster,
        full_state: &FullState,
    ) -> AdaptorResult<()>;

    /// 轮换Secret加密密钥，过程中会改写状态文件
    async fn rotate_encryption_key(
        &self,
        cluster: &mut KubeCluster,
        full_state: &FullState,
        state_path: &Path,
    ) -> AdaptorResult<()>;

    /// 为缺少CSR的服务证书生成CSR与私钥
    async fn generate_service_csrs(&self, cluster: &mut KubeCluster) -> AdaptorResult<()>;
}

/// 一次引擎调用链共享的上下文
#[derive(Clone)]
pub struct EngineContext {
    pub engine: Arc<dyn RkeEngine>,
    pub cancel: Cancellation,
    /// 保存状态到集群的重试策略
    pub save_state_retry: RetryPolicy,
}

impl EngineContext {
    pub fn new(engine: Arc<dyn RkeEngine>, cancel: Cancellation) -> Self {
        Self {
            engine,
            cancel,
            save_state_retry: RetryPolicy::default(),
        }
    }

    pub fn with_save_state_retry(mut self, retry: RetryPolicy) -> Self {
        self.save_state_retry = retry;
        self
    }

    /// 在取消令牌的保护下执行一个引擎原语
    pub async fn call<F, T>(&self, fut: F) -> AdaptorResult<T>
    where
        F: Future<Output = AdaptorResult<T>>,
    {
        self.cancel.run(fut).await
    }
}
