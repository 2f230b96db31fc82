//! 证书轮换与Secret加密密钥轮换

use adaptor_core::{models::RkeNode, AdaptorError, AdaptorResult};
use tracing::info;

use crate::cluster::{KubeCluster, UpOutcome};
use crate::engine::EngineContext;
use crate::options::ExternalFlags;
use crate::state::FullState;
use crate::up::save_full_state_with_retry;

const ETCD_SERVICE: &str = "etcd";

/// 按 rotate_certificates 参数重新签发证书并重启相关组件
pub async fn rotate_certificates(
    ctx: &EngineContext,
    mut cluster: KubeCluster,
    flags: &ExternalFlags,
    mut full_state: FullState,
) -> AdaptorResult<UpOutcome> {
    let rotate = cluster.config.rotate_certificates.clone().unwrap_or_default();
    let engine = &ctx.engine;
    cluster.log.info("Rotating Kubernetes cluster certificates").await;

    ctx.call(engine.tunnel_hosts(&mut cluster)).await?;
    ctx.call(engine.rotate_certificates(&mut cluster, &full_state))
        .await?;

    let api_url = cluster.api_url()?;
    let credentials = cluster.admin_credentials()?;

    ctx.call(engine.set_up_hosts(&cluster)).await?;

    full_state.current_state = cluster.to_state();
    full_state.write(&flags.state_file_path()).await?;
    save_full_state_with_retry(ctx, &cluster, &full_state).await?;

    if rotate.includes(ETCD_SERVICE) {
        ctx.call(engine.restart_etcd_plane(&cluster)).await?;
    }

    if ctx.call(engine.is_legacy_kube_api(&cluster)).await? {
        ctx.call(engine.deploy_control_plane(&cluster, true))
            .await?;
    }
    ctx.call(engine.restart_control_plane(&cluster)).await?;

    let hosts: Vec<RkeNode> = cluster.all_hosts();
    ctx.call(engine.restart_worker_plane(&cluster, &hosts))
        .await?;

    if rotate.ca_certificates {
        ctx.call(engine.restart_cluster_pods(&cluster)).await?;
    }

    info!("集群证书轮换完成: {}", api_url);
    cluster.log.info("Finished rotating certificates").await;
    Ok(UpOutcome {
        api_url,
        credentials,
        certificates: cluster.certificates,
    })
}

/// 轮换Secret加密密钥
///
/// 自定义加密配置与未开启加密的集群都不支持轮换。
pub async fn rotate_encryption_key(
    ctx: &EngineContext,
    mut cluster: KubeCluster,
    flags: &ExternalFlags,
    full_state: FullState,
) -> AdaptorResult<UpOutcome> {
    check_encryption_rotatable(&cluster)?;

    let engine = &ctx.engine;
    let state_path = flags.state_file_path();
    cluster.log.info("Rotating cluster secrets encryption key").await;

    cluster.certificates = full_state.desired_state.certificates_bundle.clone();

    ctx.call(engine.tunnel_hosts(&mut cluster)).await?;

    let api_url = cluster.api_url()?;
    let credentials = cluster.admin_credentials()?;

    ctx.call(engine.rotate_encryption_key(&mut cluster, &full_state, &state_path))
        .await?;

    // 引擎在轮换过程中会改写状态文件
    let mut rotated = FullState::read(&state_path).await?;
    rotated.desired_state.encryption_config = cluster.encryption_config.clone();
    rotated.write(&state_path).await?;

    cluster.log.info("Finished rotating encryption key").await;
    Ok(UpOutcome {
        api_url,
        credentials,
        certificates: cluster.certificates,
    })
}

fn check_encryption_rotatable(cluster: &KubeCluster) -> AdaptorResult<()> {
    let encryption = cluster.config.secrets_encryption();
    if encryption.map(|e| e.custom_config.is_some()).unwrap_or(false) {
        return Err(AdaptorError::ConfigInvalid(
            "自定义加密配置不支持密钥轮换".to_string(),
        ));
    }
    if !encryption.map(|e| e.enabled).unwrap_or(false) {
        return Err(AdaptorError::ConfigInvalid(
            "集群未开启Secret加密，无法轮换密钥".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::EngineLog;
    use adaptor_core::models::{RkeConfig, SecretsEncryptionConfig};

    fn cluster_with(encryption: Option<SecretsEncryptionConfig>) -> KubeCluster {
        let mut config = RkeConfig::default();
        config.services.kube_api.secrets_encryption_config = encryption;
        KubeCluster::new(config, "", EngineLog::discard())
    }

    #[test]
    fn test_encryption_rotation_preconditions() {
        let disabled = cluster_with(None);
        let err = check_encryption_rotatable(&disabled).unwrap_err();
        assert!(err.to_string().contains("未开启"));

        let custom = cluster_with(Some(SecretsEncryptionConfig {
            enabled: true,
            custom_config: Some(serde_yaml::Value::String("provider".to_string())),
        }));
        let err = check_encryption_rotatable(&custom).unwrap_err();
        assert!(err.to_string().contains("自定义"));

        let enabled = cluster_with(Some(SecretsEncryptionConfig {
            enabled: true,
            custom_config: None,
        }));
        assert!(check_encryption_rotatable(&enabled).is_ok());
    }
}
