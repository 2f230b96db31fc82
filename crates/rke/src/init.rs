use adaptor_core::{models::RkeConfig, AdaptorResult};
use tracing::info;

use crate::engine::EngineContext;
use crate::log::EngineLog;
use crate::options::ExternalFlags;
use crate::state::FullState;

/// 根据 cluster.yml 生成或更新状态文件
///
/// 已有状态文件时在其基础上重建，保留已签发的证书与当前状态。
pub async fn cluster_init(
    ctx: &EngineContext,
    config: &RkeConfig,
    flags: &ExternalFlags,
    log: &EngineLog,
) -> AdaptorResult<()> {
    let state_path = flags.state_file_path();
    log.info("Initiating Kubernetes cluster").await;

    let old_state = FullState::read_optional(&state_path).await?;
    let full_state = ctx
        .call(
            ctx.engine
                .rebuild_full_state(config, old_state.as_ref(), flags, log),
        )
        .await?;
    full_state.write(&state_path).await?;

    log.info(format!(
        "Successfully Deployed state file at [{}]",
        state_path.display()
    ))
    .await;
    info!("集群状态文件初始化完成: {}", state_path.display());
    Ok(())
}
