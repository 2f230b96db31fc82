use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::{AdaptorError, AdaptorResult};

/// 取消令牌
///
/// 由调用方创建并传递到长时间运行的操作中。克隆后的令牌共享同一个取消状态，
/// 任意一方调用 [`Cancellation::cancel`] 后所有等待者都会被唤醒。
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 触发取消
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待取消信号
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// 在取消信号到达前运行 future，取消时返回 [`AdaptorError::Cancelled`]
    pub async fn run<F, T>(&self, fut: F) -> AdaptorResult<T>
    where
        F: Future<Output = AdaptorResult<T>>,
    {
        if self.is_cancelled() {
            return Err(AdaptorError::Cancelled);
        }
        tokio::select! {
            result = fut => result,
            _ = self.token.cancelled() => Err(AdaptorError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_completes_without_cancel() {
        let token = Cancellation::new();
        let value = token.run(async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_cancel_aborts_pending_future() {
        let token = Cancellation::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter
                .run(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(AdaptorError::Cancelled)));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_after_cancel_fails_fast() {
        let token = Cancellation::new();
        token.cancel();
        let result: AdaptorResult<()> = token.run(async { Ok(()) }).await;
        assert!(matches!(result, Err(AdaptorError::Cancelled)));
    }
}
