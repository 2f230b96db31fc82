use async_trait::async_trait;

use crate::models::EventStatus;
use crate::AdaptorError;

/// 进度上报能力
///
/// 生命周期引擎只依赖这一接口上报步骤进度，由任务事件日志实现。
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit_with_reason(&self, step: &str, message: &str, status: EventStatus, reason: &str);

    async fn emit(&self, step: &str, message: &str, status: EventStatus) {
        self.emit_with_reason(step, message, status, "").await
    }

    /// 失败事件，错误码写入 reason
    async fn emit_error(&self, step: &str, err: &AdaptorError) {
        self.emit_with_reason(
            step,
            &err.to_string(),
            EventStatus::Failure,
            &err.code().to_string(),
        )
        .await
    }
}
