use std::sync::Arc;
use std::time::Duration;

use adaptor_cluster::{AdaptorFactory, HealthChecker, CustomAdaptor, RkeAdaptor, RkeLifecycle};
use adaptor_core::config::AppConfig;
use adaptor_infrastructure::{
    DatabaseManager, KubeRsClientFactory, SshKeyManager, StateDirectory,
};
use adaptor_rke::{RkeEngine, SimulatedEngine};
use adaptor_worker::{
    CreateKubernetesHandler, InitRainbondHandler, TaskPublisher, TaskService,
    UpdateKubernetesHandler, WorkerPool, WorkerPoolHandle,
};
use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};

const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(20);

/// 选择安装引擎
///
/// 测试模式使用不接触主机的模拟引擎，其他情况下由调用方注入引擎实现。
pub fn select_engine(
    config: &AppConfig,
    injected: Option<Arc<dyn RkeEngine>>,
) -> Result<Arc<dyn RkeEngine>> {
    if config.test_mode {
        info!("TEST_MODE 已开启，使用模拟安装引擎");
        return Ok(Arc::new(SimulatedEngine::new()));
    }
    injected.ok_or_else(|| {
        anyhow::anyhow!("未配置RKE安装引擎，非测试模式下必须提供引擎实现（或设置 TEST_MODE=true）")
    })
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    db: Arc<DatabaseManager>,
    adaptors: AdaptorFactory,
    task_service: Arc<TaskService>,
    publisher: TaskPublisher,
    pool: WorkerPoolHandle,
}

impl Application {
    pub async fn new(config: AppConfig, engine: Arc<dyn RkeEngine>) -> Result<Self> {
        info!("初始化应用程序");

        let db = DatabaseManager::connect_with_retry(
            &config.database,
            config.database.connect_retries,
            Duration::from_secs(config.database.connect_retry_delay_seconds),
        )
        .await
        .context("连接数据库失败")?;
        db.run_migrations().await.context("初始化数据表失败")?;
        let db = Arc::new(db);

        if !config.test_mode {
            match SshKeyManager::from_env().ensure_key_pair().await {
                Ok(_) => info!("SSH密钥已就绪"),
                Err(e) => warn!("准备SSH密钥失败: {}", e),
            }
        }

        let state_dir = StateDirectory::new(&config.config_dir);
        let health = Arc::new(HealthChecker::new(
            Arc::new(KubeRsClientFactory),
            config.describe_concurrency,
        ));
        let lifecycle = Arc::new(
            RkeLifecycle::new(db.rke_cluster_repository(), state_dir, engine)
                .with_default_kubernetes_version(config.default_kubernetes_version.clone()),
        );
        let adaptors = AdaptorFactory::new(
            Arc::new(RkeAdaptor::new(
                db.rke_cluster_repository(),
                lifecycle,
                health.clone(),
            )),
            Arc::new(CustomAdaptor::new(db.custom_cluster_repository(), health)),
        );

        let tasks = db.task_repository();
        let events = db.task_event_repository();

        // 上次进程退出时未结束的任务已无人执行
        let recovered = tasks
            .fail_unfinished_tasks()
            .await
            .context("恢复未结束的任务失败")?;
        if recovered > 0 {
            warn!("{} 个上次未结束的任务已标记为失败", recovered);
        }

        let (publisher, pool) = WorkerPool::new(config.worker_concurrency)
            .with_task_repository(tasks.clone())
            .register(Arc::new(CreateKubernetesHandler::new(
                adaptors.clone(),
                tasks.clone(),
                events.clone(),
            )))
            .register(Arc::new(UpdateKubernetesHandler::new(
                adaptors.clone(),
                tasks.clone(),
                events.clone(),
            )))
            .register(Arc::new(InitRainbondHandler::new(
                adaptors.clone(),
                tasks.clone(),
                events.clone(),
            )))
            .start();
        let task_service = Arc::new(TaskService::new(tasks, events, publisher.clone()));

        Ok(Self {
            config,
            db,
            adaptors,
            task_service,
            publisher,
            pool,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn adaptors(&self) -> &AdaptorFactory {
        &self.adaptors
    }

    pub fn task_service(&self) -> Arc<TaskService> {
        self.task_service.clone()
    }

    /// 外部传输层（如消息队列消费者）使用的投递句柄
    pub fn publisher(&self) -> TaskPublisher {
        self.publisher.clone()
    }

    /// 运行直到收到关闭信号，然后等待正在执行的任务结束
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            worker_concurrency = self.config.worker_concurrency,
            config_dir = %self.config.config_dir,
            "应用程序已启动"
        );
        let _ = shutdown_rx.recv().await;

        info!("停止应用程序");
        self.pool.shutdown(WORKER_SHUTDOWN_GRACE).await;
        self.db.close().await;
        info!("应用程序已停止");
        Ok(())
    }
}
