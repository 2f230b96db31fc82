use std::sync::Arc;
use std::time::Duration;

use adaptor_core::{
    models::{EventStatus, NodeRole, RkeConfig, RkeNode, TaskEvent, TaskKind, TaskStatus},
    traits::{TaskEventRepository, TaskRepository},
    AdaptorError,
};
use adaptor_infrastructure::DatabaseManager;
use adaptor_worker::{CreateKubernetesTaskRequest, TaskService, WorkerPool, WorkerPoolHandle};

/// 没有注册处理器的工作池，投递的任务保持 pending
async fn idle_service() -> (TaskService, DatabaseManager, WorkerPoolHandle) {
    let db = DatabaseManager::in_memory().await.unwrap();
    let (publisher, handle) = WorkerPool::new(1).start();
    let service = TaskService::new(db.task_repository(), db.task_event_repository(), publisher);
    (service, db, handle)
}

fn request(cluster_id: &str) -> CreateKubernetesTaskRequest {
    CreateKubernetesTaskRequest {
        provider: "rke".to_string(),
        cluster_id: cluster_id.to_string(),
        ..Default::default()
    }
}

fn config() -> RkeConfig {
    RkeConfig {
        nodes: vec![RkeNode::new(
            "10.0.0.1",
            &[NodeRole::Controlplane, NodeRole::Etcd, NodeRole::Worker],
        )],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_task_is_pending() {
    let (service, _db, handle) = idle_service().await;
    let task = service.create_kubernetes_task("e1", request("c1")).await.unwrap();
    assert!(!task.task_id.is_empty());
    assert_eq!(task.status, TaskStatus::Pending);

    let stored = service
        .get_task("e1", TaskKind::CreateKubernetes, &task.task_id)
        .await
        .unwrap();
    assert_eq!(stored.cluster_id, "c1");
    handle.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_second_task_rejected_while_first_active() {
    let (service, db, handle) = idle_service().await;
    let first = service.create_kubernetes_task("e1", request("c1")).await.unwrap();

    let err = service
        .create_kubernetes_task("e1", request("c2"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdaptorError::LastTaskNotComplete(ref id) if *id == first.task_id));
    assert_eq!(err.code(), 7004);

    // 同一集群上其他类型的未结束任务同样阻止创建
    let err = service
        .create_update_kubernetes_task("e1", "rke", "c1", config())
        .await
        .unwrap_err();
    assert!(matches!(err, AdaptorError::LastTaskNotComplete(_)));

    db.task_repository()
        .update_status("e1", TaskKind::CreateKubernetes, &first.task_id, TaskStatus::Failure)
        .await
        .unwrap();
    assert!(service.create_kubernetes_task("e1", request("c1")).await.is_ok());
    handle.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creations_admit_one_task() {
    let (service, db, handle) = idle_service().await;
    let service = Arc::new(service);

    let attempts: Vec<_> = (0..8)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    service.create_kubernetes_task("e1", request("c1")).await
                } else {
                    service.create_init_rainbond_task("e1", "rke", "c1").await
                }
            })
        })
        .collect();

    let mut accepted = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert!(matches!(e, AdaptorError::LastTaskNotComplete(_))),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(
        db.task_repository().list_active_by_cluster("c1").await.unwrap().len(),
        1
    );
    handle.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_update_task_versions_increase() {
    let (service, db, handle) = idle_service().await;
    let tasks = db.task_repository();

    let first = service
        .create_update_kubernetes_task("e1", "rke", "c1", config())
        .await
        .unwrap();
    assert_eq!(first.version, Some(1));
    assert!(first.rke_config.as_deref().unwrap().contains("10.0.0.1"));

    tasks
        .update_status("e1", TaskKind::UpdateKubernetes, &first.task_id, TaskStatus::Success)
        .await
        .unwrap();
    let second = service
        .create_update_kubernetes_task("e1", "rke", "c1", config())
        .await
        .unwrap();
    assert_eq!(second.version, Some(2));
    handle.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_init_rainbond_task_gated_per_provider() {
    let (service, _db, handle) = idle_service().await;
    service
        .create_init_rainbond_task("e1", "rke", "c1")
        .await
        .unwrap();
    assert!(service
        .create_init_rainbond_task("e1", "rke", "c2")
        .await
        .is_err());
    assert!(service
        .create_init_rainbond_task("e1", "custom", "c3")
        .await
        .is_ok());
    handle.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_missing_task_and_events() {
    let (service, db, handle) = idle_service().await;
    let err = service
        .get_task("e1", TaskKind::CreateKubernetes, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, AdaptorError::TaskNotFound(_)));
    assert!(service.get_task_events("e1", "missing").await.unwrap().is_empty());

    let events = db.task_event_repository();
    events
        .emit_event(&TaskEvent::new("e1", "t1", "InitClusterConfig", EventStatus::Start))
        .await
        .unwrap();
    assert_eq!(service.get_task_events("e1", "t1").await.unwrap().len(), 1);
    handle.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_closed_pool_marks_task_failed() {
    let (service, db, handle) = idle_service().await;
    handle.shutdown(Duration::from_millis(10)).await;

    assert!(service.create_kubernetes_task("e1", request("c1")).await.is_err());
    let last = db
        .task_repository()
        .get_last_task("e1", TaskKind::CreateKubernetes, "rke")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.status, TaskStatus::Failure);
}
