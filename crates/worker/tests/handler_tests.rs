use std::sync::Arc;
use std::time::Duration;

use adaptor_cluster::{
    AdaptorFactory, ClusterAdaptor, HealthChecker, CreateClusterRequest, CustomAdaptor,
    RkeAdaptor, RkeLifecycle, RKE_PROVIDER,
};
use adaptor_core::{
    models::{
        steps, ClusterState, EventStatus, NodeRole, RkeConfig, RkeNode, Task, TaskEvent,
        TaskKind, TaskStatus,
    },
    traits::{KubeClientFactory, KubeClusterApi, RkeClusterRepository, TaskRepository},
    AdaptorResult,
};
use adaptor_infrastructure::{DatabaseManager, StateDirectory};
use adaptor_rke::{RetryPolicy, SimulatedEngine};
use adaptor_worker::{
    handlers::CHECK_REGION_CONFIG, CreateKubernetesHandler, CreateKubernetesTaskRequest,
    InitRainbondHandler, TaskService, UpdateKubernetesHandler, WorkerPool, WorkerPoolHandle,
};
use async_trait::async_trait;
use tempfile::TempDir;

/// 所有kubeconfig都指向同一个健康的 v1.22.3 集群
struct HealthyKube;

#[async_trait]
impl KubeClusterApi for HealthyKube {
    async fn server_version(&self) -> AdaptorResult<String> {
        Ok("v1.22.3".to_string())
    }

    async fn node_count(&self) -> AdaptorResult<usize> {
        Ok(3)
    }

    async fn config_map_exists(&self, _namespace: &str, _name: &str) -> AdaptorResult<bool> {
        Ok(false)
    }
}

#[async_trait]
impl KubeClientFactory for HealthyKube {
    async fn connect(&self, _kube_config: &str) -> AdaptorResult<Arc<dyn KubeClusterApi>> {
        Ok(Arc::new(HealthyKube))
    }
}

struct Harness {
    _tmp: TempDir,
    db: DatabaseManager,
    adaptors: AdaptorFactory,
    service: TaskService,
    pool: WorkerPoolHandle,
}

impl Harness {
    async fn new(engine: SimulatedEngine) -> Self {
        let tmp = TempDir::new().unwrap();
        let db = DatabaseManager::in_memory().await.unwrap();
        let health = Arc::new(HealthChecker::new(Arc::new(HealthyKube), 2));
        let lifecycle = Arc::new(
            RkeLifecycle::new(
                db.rke_cluster_repository(),
                StateDirectory::new(tmp.path()),
                Arc::new(engine),
            )
            .with_save_state_retry(RetryPolicy {
                attempts: 1,
                delay: Duration::from_millis(1),
            }),
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
        let (publisher, pool) = WorkerPool::new(2)
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
        let service = TaskService::new(tasks, events, publisher);

        Self {
            _tmp: tmp,
            db,
            adaptors,
            service,
            pool,
        }
    }

    async fn register_cluster(&self) -> String {
        self.adaptors
            .get(RKE_PROVIDER)
            .unwrap()
            .create_cluster(&CreateClusterRequest {
                eid: "e1".to_string(),
                name: "demo".to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .cluster_id
    }

    /// 等待任务进入终态
    async fn wait(&self, task: &Task) -> TaskStatus {
        for _ in 0..200 {
            let current = self
                .db
                .task_repository()
                .get_task("e1", task.kind, &task.task_id)
                .await
                .unwrap()
                .unwrap();
            if current.status.is_terminal() {
                return current.status;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("任务 {} 未在预期时间内结束", task.task_id);
    }

    async fn event(&self, task: &Task, step: &str) -> TaskEvent {
        self.service
            .get_task_events("e1", &task.task_id)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.step_type == step)
            .unwrap_or_else(|| panic!("缺少 {step} 事件"))
    }
}

fn three_nodes() -> RkeConfig {
    let roles = [NodeRole::Controlplane, NodeRole::Etcd, NodeRole::Worker];
    RkeConfig {
        nodes: vec![
            RkeNode::new("10.0.0.1", &roles),
            RkeNode::new("10.0.0.2", &roles),
            RkeNode::new("10.0.0.3", &roles),
        ],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_then_expand_through_pool() {
    let h = Harness::new(SimulatedEngine::new()).await;
    let cluster_id = h.register_cluster().await;

    let task = h
        .service
        .create_kubernetes_task(
            "e1",
            CreateKubernetesTaskRequest {
                provider: RKE_PROVIDER.to_string(),
                cluster_id: cluster_id.clone(),
                rke_config: Some(three_nodes()),
                kubernetes_version: String::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(h.wait(&task).await, TaskStatus::Success);

    let install = h.event(&task, steps::INSTALL_KUBERNETES).await;
    assert_eq!(install.status, EventStatus::Success);
    assert_eq!(install.message, cluster_id);
    assert_eq!(
        h.event(&task, steps::INIT_CLUSTER_CONFIG).await.status,
        EventStatus::Success
    );
    let row = h.db.rke_cluster_repository().get("e1", &cluster_id).await.unwrap();
    assert_eq!(row.state, ClusterState::Running);

    let mut expanded = three_nodes();
    expanded
        .nodes
        .push(RkeNode::new("10.0.0.4", &[NodeRole::Worker]));
    let update = h
        .service
        .create_update_kubernetes_task("e1", RKE_PROVIDER, &cluster_id, expanded)
        .await
        .unwrap();
    assert_eq!(update.version, Some(1));
    assert_eq!(h.wait(&update).await, TaskStatus::Success);
    assert_eq!(
        h.event(&update, steps::UPDATE_KUBERNETES).await.status,
        EventStatus::Success
    );
    let row = h.db.rke_cluster_repository().get("e1", &cluster_id).await.unwrap();
    assert_eq!(row.nodes().unwrap().len(), 4);

    let init = h
        .service
        .create_init_rainbond_task("e1", RKE_PROVIDER, &cluster_id)
        .await
        .unwrap();
    assert_eq!(h.wait(&init).await, TaskStatus::Success);
    let check = h.event(&init, CHECK_REGION_CONFIG).await;
    assert_eq!(check.status, EventStatus::Success);
    assert!(check.message.contains("https://10.0.0.1:2379"));

    h.pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_install_failure_marks_task_failed() {
    let h = Harness::new(SimulatedEngine::new().fail_on("deploy_worker_plane", "docker not running"))
        .await;
    let cluster_id = h.register_cluster().await;

    let task = h
        .service
        .create_kubernetes_task(
            "e1",
            CreateKubernetesTaskRequest {
                provider: RKE_PROVIDER.to_string(),
                cluster_id: cluster_id.clone(),
                rke_config: Some(three_nodes()),
                kubernetes_version: String::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(h.wait(&task).await, TaskStatus::Failure);

    let install = h.event(&task, steps::INSTALL_KUBERNETES).await;
    assert_eq!(install.status, EventStatus::Failure);
    assert_eq!(install.message, "docker not running");
    let row = h.db.rke_cluster_repository().get("e1", &cluster_id).await.unwrap();
    assert_eq!(row.state, ClusterState::InstallFailed);

    h.pool.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_unknown_provider_becomes_failure_event() {
    let h = Harness::new(SimulatedEngine::new()).await;
    let task = h
        .service
        .create_kubernetes_task(
            "e1",
            CreateKubernetesTaskRequest {
                provider: "aliyun".to_string(),
                cluster_id: "c1".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(h.wait(&task).await, TaskStatus::Failure);

    let event = h.event(&task, steps::INIT_CLUSTER_CONFIG).await;
    assert_eq!(event.status, EventStatus::Failure);
    assert_eq!(event.reason, "7001");
    assert_eq!(task.kind, TaskKind::CreateKubernetes);

    h.pool.shutdown(Duration::from_secs(1)).await;
}
