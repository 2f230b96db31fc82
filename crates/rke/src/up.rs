use adaptor_core::{AdaptorError, AdaptorResult};
use tracing::{info, warn};

use crate::cluster::{KubeCluster, UpOutcome};
use crate::engine::EngineContext;
use crate::log::EngineLog;
use crate::options::ExternalFlags;
use crate::rotate::{rotate_certificates, rotate_encryption_key};
use crate::state::FullState;

/// 安装或升级集群
///
/// 读取状态文件后按期望配置分派：证书轮换、加密密钥轮换，或完整的
/// up-reconcile 流程。部分节点因滚动升级上限被跳过时，集群本身已可用，
/// 但仍返回拼接后的错误信息，调用方可以重试扩容把它们纳入集群。
pub async fn cluster_up(
    ctx: &EngineContext,
    flags: &ExternalFlags,
    log: &EngineLog,
) -> AdaptorResult<UpOutcome> {
    let state_path = flags.state_file_path();
    let full_state = FullState::read(&state_path).await?;
    let desired_config = full_state
        .desired_state
        .rke_config
        .clone()
        .ok_or(AdaptorError::RkeConfigLost)?;

    let encryption_config = full_state.effective_encryption_config().to_string();
    let mut cluster = KubeCluster::new(desired_config, &encryption_config, log.clone());

    if cluster.config.rotate_certificates.is_some() {
        return rotate_certificates(ctx, cluster, flags, full_state).await;
    }
    if cluster.config.rotate_encryption_key {
        return rotate_encryption_key(ctx, cluster, flags, full_state).await;
    }

    log.info("Building Kubernetes cluster").await;
    let engine = &ctx.engine;

    ctx.call(engine.tunnel_hosts(&mut cluster)).await?;

    let current = ctx
        .call(engine.get_cluster_state(&cluster, &full_state))
        .await?;
    let first_install = current.is_none();

    if !flags.disable_port_check {
        ctx.call(engine.check_cluster_ports(&cluster, current.as_ref()))
            .await?;
    }

    ctx.call(engine.set_up_authentication(&mut cluster, current.as_ref(), &full_state))
        .await?;

    cluster.api_url()?;
    let credentials = cluster.admin_credentials()?;

    ctx.call(engine.set_up_hosts(&cluster)).await?;

    let reconcile = !first_install && !cluster.config.is_restore();
    if let Some(current) = current.as_ref().filter(|_| reconcile) {
        let known = current.host_names();
        cluster.new_hosts = cluster
            .host_names()
            .into_iter()
            .filter(|name| !known.contains(name))
            .collect();

        let (workers, controls) = ctx
            .call(engine.calculate_max_unavailable(&cluster))
            .await?;
        cluster.max_unavailable_for_worker_nodes = workers;
        cluster.max_unavailable_for_control_nodes = controls;
        info!(
            "新增节点: {:?}, 最大不可用 worker={} controlplane={}",
            cluster.new_hosts, workers, controls
        );
    }

    ctx.call(engine.reconcile_cluster(&mut cluster, current.as_ref(), flags))
        .await?;

    // 控制节点可能在调和过程中发生变化
    let api_url = cluster.api_url()?;
    let credentials = cluster.admin_credentials().unwrap_or(credentials);

    ctx.call(engine.reconcile_encryption_provider_file(&mut cluster, current.as_ref()))
        .await?;

    ctx.call(engine.pre_pull_k8s_images(&cluster)).await?;

    let control_message = ctx
        .call(engine.deploy_control_plane(&cluster, reconcile))
        .await?;

    ctx.call(engine.apply_authz_resources(&cluster)).await?;

    let mut full_state = full_state;
    full_state.current_state = cluster.to_state();
    full_state.write(&state_path).await?;
    save_full_state_with_retry(ctx, &cluster, &full_state).await?;

    let worker_message = ctx
        .call(engine.deploy_worker_plane(&cluster, reconcile))
        .await?;

    ctx.call(engine.clean_dead_logs(&cluster)).await?;
    ctx.call(engine.sync_labels_and_taints(&cluster, current.as_ref()))
        .await?;
    ctx.call(engine.configure_cluster(&cluster)).await?;

    if cluster.rewrite_secrets {
        ctx.call(engine.rewrite_secrets(&cluster)).await?;
    }

    check_all_included(&cluster)?;

    if control_message.is_some() || worker_message.is_some() {
        let message = format!(
            "{}{}",
            control_message.unwrap_or_default(),
            worker_message.unwrap_or_default()
        );
        log.warn(&message).await;
        return Err(AdaptorError::engine(message));
    }

    log.info("Finished building Kubernetes cluster successfully").await;
    Ok(UpOutcome {
        api_url,
        credentials,
        certificates: cluster.certificates,
    })
}

/// 保存完整状态到集群，失败只记录警告
pub(crate) async fn save_full_state_with_retry(
    ctx: &EngineContext,
    cluster: &KubeCluster,
    full_state: &FullState,
) -> AdaptorResult<()> {
    let policy = ctx.save_state_retry;
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        match ctx
            .call(ctx.engine.save_full_state_to_kubernetes(cluster, full_state))
            .await
        {
            Ok(()) => return Ok(()),
            Err(AdaptorError::Cancelled) => return Err(AdaptorError::Cancelled),
            Err(e) => {
                warn!("保存集群状态到Kubernetes失败 ({}/{}): {}", attempt, attempts, e);
                if attempt < attempts {
                    ctx.call(async {
                        tokio::time::sleep(policy.delay).await;
                        Ok(())
                    })
                    .await?;
                }
            }
        }
    }

    cluster
        .log
        .warn("Failed to save full cluster state to Kubernetes")
        .await;
    Ok(())
}

/// 存在被跳过的节点时安装视为未完成
pub fn check_all_included(cluster: &KubeCluster) -> AdaptorResult<()> {
    if cluster.inactive_hosts.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = cluster
        .inactive_hosts
        .iter()
        .map(|h| h.address.as_str())
        .collect();
    Err(AdaptorError::engine(format!(
        "Provisioning incomplete, host(s) [{}] skipped because they could not be contacted",
        names.join(",")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptor_core::models::{NodeRole, RkeConfig, RkeNode};

    #[test]
    fn test_check_all_included() {
        let config = RkeConfig {
            nodes: vec![
                RkeNode::new("10.0.0.1", &[NodeRole::Controlplane, NodeRole::Etcd]),
                RkeNode::new("10.0.0.7", &[NodeRole::Worker]),
                RkeNode::new("10.0.0.8", &[NodeRole::Worker]),
            ],
            ..Default::default()
        };
        let mut cluster = KubeCluster::new(config, "", EngineLog::discard());
        assert!(check_all_included(&cluster).is_ok());

        let first = cluster.worker_hosts[0].clone();
        let second = cluster.worker_hosts[1].clone();
        cluster.mark_inactive(&first);
        cluster.mark_inactive(&second);

        let err = check_all_included(&cluster).unwrap_err();
        assert!(err.to_string().contains("[10.0.0.7,10.0.0.8]"));
    }
}
