//! RKE集群生命周期
//!
//! 两个入口，均由任务处理器在后台调用：
//!
//! - [`RkeLifecycle::create_rainbond_kubernetes`]：`InitClusterConfig → InstallKubernetes`
//! - [`RkeLifecycle::expansion_node`]：`InitClusterConfig → UpdateKubernetes`
//!
//! 每个步骤只通过 [`EventSink`] 上报 `start` 与 `success`/`failure` 事件，
//! 错误不会返回给调用方，失败时集群记录被置为 `InstallFailed`。

use std::sync::Arc;
use std::time::Instant;

use adaptor_core::{
    models::{steps, ClusterState, EventStatus, RkeCluster, RkeConfig, DEFAULT_KUBERNETES_VERSION},
    traits::{EventSink, RkeClusterRepository},
    AdaptorError, AdaptorResult, Cancellation,
};
use adaptor_infrastructure::{ClusterPaths, StateDirectory};
use adaptor_rke::{
    cluster_init, cluster_up, EngineContext, EngineLog, ExternalFlags, RetryPolicy, RkeEngine,
    UpOutcome,
};
use metrics::{counter, histogram};
use tracing::{error, info, instrument, warn};

use crate::kubeconfig::build_kube_config;

/// 扩容时找不到状态文件的提示
pub const STATE_FILE_MISSING: &str = "state file not exist, can not support expansion node";

/// 创建集群请求
#[derive(Debug, Clone)]
pub struct CreateKubernetesRequest {
    pub eid: String,
    pub cluster_name: String,
    pub rke_config: Option<RkeConfig>,
    /// 为空时使用配置中的版本或默认版本
    pub kubernetes_version: String,
}

/// 扩容/升级请求
#[derive(Debug, Clone)]
pub struct ExpansionNodeRequest {
    pub eid: String,
    pub cluster_id: String,
    pub rke_config: RkeConfig,
}

/// InitClusterConfig 阶段的产物
struct PreparedCluster {
    flags: ExternalFlags,
    log: EngineLog,
    purged: bool,
}

pub struct RkeLifecycle {
    clusters: Arc<dyn RkeClusterRepository>,
    state_dir: StateDirectory,
    engine: Arc<dyn RkeEngine>,
    default_kubernetes_version: String,
    save_state_retry: RetryPolicy,
}

impl RkeLifecycle {
    pub fn new(
        clusters: Arc<dyn RkeClusterRepository>,
        state_dir: StateDirectory,
        engine: Arc<dyn RkeEngine>,
    ) -> Self {
        Self {
            clusters,
            state_dir,
            engine,
            default_kubernetes_version: DEFAULT_KUBERNETES_VERSION.to_string(),
            save_state_retry: RetryPolicy::default(),
        }
    }

    pub fn with_default_kubernetes_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        if !version.is_empty() {
            self.default_kubernetes_version = version;
        }
        self
    }

    pub fn with_save_state_retry(mut self, retry: RetryPolicy) -> Self {
        self.save_state_retry = retry;
        self
    }

    pub fn state_dir(&self) -> &StateDirectory {
        &self.state_dir
    }

    fn context(&self, cancel: &Cancellation) -> EngineContext {
        EngineContext::new(self.engine.clone(), cancel.clone())
            .with_save_state_retry(self.save_state_retry)
    }

    /// 首次安装集群
    #[instrument(skip_all, fields(eid = %request.eid, cluster_name = %request.cluster_name))]
    pub async fn create_rainbond_kubernetes(
        &self,
        request: &CreateKubernetesRequest,
        sink: &dyn EventSink,
        cancel: &Cancellation,
    ) -> Option<RkeCluster> {
        let step = steps::INIT_CLUSTER_CONFIG;
        sink.emit(step, "开始初始化集群配置", EventStatus::Start).await;

        let mut cluster = match self.clusters.get(&request.eid, &request.cluster_name).await {
            Ok(cluster) => cluster,
            Err(e) => {
                sink.emit_error(step, &e).await;
                return None;
            }
        };
        if cluster.state.is_provisioned() {
            sink.emit_error(step, &AdaptorError::NotSupportReinstall).await;
            return None;
        }
        info!(cluster_id = %cluster.cluster_id, "开始创建Kubernetes集群");

        let ctx = self.context(cancel);
        let started = Instant::now();
        let prepared = match self.init_cluster_config(&ctx, &mut cluster, request).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.fail(&mut cluster, step, &e, sink).await;
                record_result("create", "failure", started);
                return None;
            }
        };
        let message = if prepared.purged {
            "集群配置初始化完成，已清理上次安装残留的状态文件与证书"
        } else {
            "集群配置初始化完成"
        };
        sink.emit(step, message, EventStatus::Success).await;

        let step = steps::INSTALL_KUBERNETES;
        sink.emit(step, "开始安装Kubernetes集群", EventStatus::Start)
            .await;
        match self.up(&ctx, &prepared).await {
            Ok(outcome) => {
                let result = self.finish(cluster, &outcome, step, sink, &prepared.log).await;
                record_result("create", if result.is_some() { "success" } else { "failure" }, started);
                result
            }
            Err(e) => {
                prepared.log.warn(e.to_string()).await;
                self.fail(&mut cluster, step, &e, sink).await;
                record_result("create", "failure", started);
                None
            }
        }
    }

    /// 扩容或升级已安装的集群
    #[instrument(skip_all, fields(eid = %request.eid, cluster_id = %request.cluster_id))]
    pub async fn expansion_node(
        &self,
        request: &ExpansionNodeRequest,
        sink: &dyn EventSink,
        cancel: &Cancellation,
    ) -> Option<RkeCluster> {
        let step = steps::INIT_CLUSTER_CONFIG;
        sink.emit(step, "开始更新集群配置", EventStatus::Start).await;

        let mut cluster = match self.clusters.get(&request.eid, &request.cluster_id).await {
            Ok(cluster) => cluster,
            Err(e) => {
                sink.emit_error(step, &e).await;
                return None;
            }
        };
        if let Err(e) = request.rke_config.validate_nodes() {
            sink.emit_error(step, &e).await;
            return None;
        }

        match self
            .state_dir
            .find_state_file(&request.eid, &cluster.name)
            .await
        {
            Ok(Some(state_file)) => info!("使用状态文件: {}", state_file.display()),
            Ok(None) => {
                warn!(cluster_name = %cluster.name, "集群状态文件不存在，无法扩容");
                sink.emit_with_reason(
                    step,
                    STATE_FILE_MISSING,
                    EventStatus::Failure,
                    &AdaptorError::RkeConfigLost.code().to_string(),
                )
                .await;
                return None;
            }
            Err(e) => {
                sink.emit_error(step, &e).await;
                return None;
            }
        }

        let ctx = self.context(cancel);
        let started = Instant::now();
        let prepared = match self
            .update_cluster_config(&ctx, &mut cluster, request)
            .await
        {
            Ok(prepared) => prepared,
            Err(e) => {
                self.fail(&mut cluster, step, &e, sink).await;
                record_result("expansion", "failure", started);
                return None;
            }
        };
        sink.emit(step, "集群配置更新完成", EventStatus::Success)
            .await;

        let step = steps::UPDATE_KUBERNETES;
        sink.emit(step, "开始更新Kubernetes集群", EventStatus::Start)
            .await;
        match self.up(&ctx, &prepared).await {
            Ok(outcome) => {
                let result = self.finish(cluster, &outcome, step, sink, &prepared.log).await;
                record_result("expansion", if result.is_some() { "success" } else { "failure" }, started);
                result
            }
            Err(e) => {
                prepared.log.warn(e.to_string()).await;
                self.fail(&mut cluster, step, &e, sink).await;
                record_result("expansion", "failure", started);
                None
            }
        }
    }

    async fn init_cluster_config(
        &self,
        ctx: &EngineContext,
        cluster: &mut RkeCluster,
        request: &CreateKubernetesRequest,
    ) -> AdaptorResult<PreparedCluster> {
        let mut rke_config = request
            .rke_config
            .clone()
            .ok_or_else(|| AdaptorError::ConfigInvalid("缺少RKE集群配置".to_string()))?;
        rke_config.validate_nodes()?;

        // 上次安装失败或进程在安装中退出时，节点上的证书可能已与状态文件不一致，这里直接重新生成
        match cluster.state {
            ClusterState::InstallFailed => {
                warn!(cluster_name = %cluster.name, "上次安装失败，清理状态目录后重试");
            }
            ClusterState::Installing => {
                warn!(cluster_name = %cluster.name, "上次安装未完成，清理状态目录后重试");
            }
            _ => {}
        }
        let purged = self.state_dir.purge(&cluster.eid, &cluster.name).await?;
        cluster.state = ClusterState::Initial;

        let paths = self.state_dir.ensure(&cluster.eid, &cluster.name).await?;
        rke_config.kubernetes_version = self.resolve_version(&[
            &request.kubernetes_version,
            &rke_config.kubernetes_version,
        ]);
        let yaml = rke_config.to_yaml()?;
        self.state_dir.write_cluster_config(&paths, &yaml).await?;

        let log = EngineLog::open(&paths.log_file).await?;
        record_config(cluster, &rke_config, &yaml, &paths)?;
        cluster.state = ClusterState::Installing;
        self.clusters.update(cluster).await?;

        let flags = ExternalFlags::new(&paths.config_file);
        if let Err(e) = cluster_init(ctx, &rke_config, &flags, &log).await {
            log.warn(format!("Failed to initiate cluster: {e}")).await;
            return Err(e);
        }
        Ok(PreparedCluster {
            flags,
            log,
            purged,
        })
    }

    async fn update_cluster_config(
        &self,
        ctx: &EngineContext,
        cluster: &mut RkeCluster,
        request: &ExpansionNodeRequest,
    ) -> AdaptorResult<PreparedCluster> {
        let paths = self.state_dir.ensure(&cluster.eid, &cluster.name).await?;
        self.state_dir.adopt_legacy_state(&cluster.eid, &paths).await?;

        let mut rke_config = request.rke_config.clone();
        rke_config.kubernetes_version = self.resolve_version(&[
            &rke_config.kubernetes_version,
            &cluster.kubernetes_version,
        ]);
        let yaml = rke_config.to_yaml()?;

        let backup = self.state_dir.backup_cluster_config(&paths).await?;
        if let Err(e) = self.state_dir.write_cluster_config(&paths, &yaml).await {
            if let Err(restore) = self.state_dir.restore_cluster_config(&paths).await {
                error!("恢复集群配置失败: {}", restore);
            }
            return Err(e);
        }

        self.state_dir.rotate_log(&paths).await?;
        let log = EngineLog::open(&paths.log_file).await?;
        record_config(cluster, &rke_config, &yaml, &paths)?;
        self.clusters.update(cluster).await?;

        let flags = ExternalFlags::new(&paths.config_file);
        if let Err(e) = cluster_init(ctx, &rke_config, &flags, &log).await {
            if let Some(backup) = backup {
                warn!(
                    cluster_name = %cluster.name,
                    "集群配置初始化失败，新配置保持生效，原配置备份位于 {}",
                    backup.display()
                );
            }
            log.warn(format!("Failed to initiate cluster: {e}")).await;
            return Err(e);
        }
        Ok(PreparedCluster {
            flags,
            log,
            purged: false,
        })
    }

    async fn up(&self, ctx: &EngineContext, prepared: &PreparedCluster) -> AdaptorResult<UpOutcome> {
        cluster_up(ctx, &prepared.flags, &prepared.log).await
    }

    /// 写入kubeconfig与API地址，集群进入 Running
    async fn finish(
        &self,
        mut cluster: RkeCluster,
        outcome: &UpOutcome,
        step: &str,
        sink: &dyn EventSink,
        log: &EngineLog,
    ) -> Option<RkeCluster> {
        let kube_config = match build_kube_config(&cluster.name, &outcome.api_url, &outcome.credentials) {
            Ok(kube_config) => kube_config,
            Err(e) => {
                self.fail(&mut cluster, step, &e, sink).await;
                return None;
            }
        };
        cluster.kube_config = kube_config;
        cluster.api_url = outcome.api_url.clone();
        cluster.state = ClusterState::Running;

        if let Err(e) = self.clusters.update(&cluster).await {
            self.fail(&mut cluster, step, &e, sink).await;
            return None;
        }

        log.info("Cluster provisioned successfully").await;
        info!(cluster_id = %cluster.cluster_id, api_url = %cluster.api_url, "Kubernetes集群已就绪");
        sink.emit(step, &cluster.cluster_id, EventStatus::Success)
            .await;
        Some(cluster)
    }

    async fn fail(&self, cluster: &mut RkeCluster, step: &str, err: &AdaptorError, sink: &dyn EventSink) {
        error!(cluster_name = %cluster.name, step = step, "集群操作失败: {}", err);
        cluster.state = ClusterState::InstallFailed;
        if let Err(e) = self.clusters.update(cluster).await {
            error!(cluster_name = %cluster.name, "更新集群状态失败: {}", e);
        }
        sink.emit_error(step, err).await;
    }

    fn resolve_version(&self, candidates: &[&String]) -> String {
        candidates
            .iter()
            .find(|v| !v.is_empty())
            .map(|v| v.to_string())
            .unwrap_or_else(|| self.default_kubernetes_version.clone())
    }
}

fn record_config(
    cluster: &mut RkeCluster,
    rke_config: &RkeConfig,
    yaml: &str,
    paths: &ClusterPaths,
) -> AdaptorResult<()> {
    cluster.pod_cidr = rke_config.pod_cidr().to_string();
    cluster.service_cidr = rke_config.service_cidr().to_string();
    cluster.network_mode = rke_config.network.plugin.clone();
    cluster.kubernetes_version = rke_config.kubernetes_version.clone();
    cluster.set_nodes(&rke_config.nodes)?;
    cluster.create_log_path = paths.log_file.display().to_string();
    cluster.rke_config = yaml.to_string();
    Ok(())
}

fn record_result(operation: &'static str, result: &'static str, started: Instant) {
    counter!("cluster_lifecycle_operations_total", "operation" => operation, "result" => result)
        .increment(1);
    histogram!("cluster_lifecycle_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}
