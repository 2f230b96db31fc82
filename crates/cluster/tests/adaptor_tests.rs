mod common;

use std::sync::Arc;
use std::time::Duration;

use adaptor_cluster::{
    AdaptorFactory, ClusterAdaptor, HealthChecker, CreateClusterRequest, CreateKubernetesRequest,
    CustomAdaptor, RkeAdaptor, RkeLifecycle, CUSTOM_PROVIDER, RKE_PROVIDER,
};
use adaptor_core::{
    models::{ClusterState, RkeCluster},
    traits::{CustomClusterRepository, RkeClusterRepository},
    AdaptorError, Cancellation,
};
use adaptor_infrastructure::{DatabaseManager, StateDirectory};
use adaptor_rke::SimulatedEngine;
use common::{three_node_config, FakeCluster, FakeKubeFactory, RecordingSink, KUBECONFIG};
use tempfile::TempDir;

struct Harness {
    _tmp: TempDir,
    rke_clusters: Arc<dyn RkeClusterRepository>,
    custom_clusters: Arc<dyn CustomClusterRepository>,
    factory: AdaptorFactory,
}

impl Harness {
    async fn new(kube: FakeKubeFactory) -> Self {
        Self::with_health(kube, |p| p).await
    }

    async fn with_health(
        kube: FakeKubeFactory,
        configure: impl FnOnce(HealthChecker) -> HealthChecker,
    ) -> Self {
        let tmp = TempDir::new().unwrap();
        let db = DatabaseManager::in_memory().await.unwrap();
        let rke_clusters = db.rke_cluster_repository();
        let custom_clusters = db.custom_cluster_repository();

        let health = Arc::new(configure(HealthChecker::new(Arc::new(kube), 4)));
        let lifecycle = Arc::new(RkeLifecycle::new(
            rke_clusters.clone(),
            StateDirectory::new(tmp.path()),
            Arc::new(SimulatedEngine::new()),
        ));
        let rke = Arc::new(RkeAdaptor::new(
            rke_clusters.clone(),
            lifecycle,
            health.clone(),
        ));
        let custom = Arc::new(CustomAdaptor::new(custom_clusters.clone(), health));

        Self {
            _tmp: tmp,
            rke_clusters,
            custom_clusters,
            factory: AdaptorFactory::new(rke, custom),
        }
    }

    fn rke(&self) -> Arc<dyn ClusterAdaptor> {
        self.factory.get(RKE_PROVIDER).unwrap()
    }

    fn custom(&self) -> Arc<dyn ClusterAdaptor> {
        self.factory.get(CUSTOM_PROVIDER).unwrap()
    }

    /// 登记一个已安装的RKE集群，kubeconfig 内容为模拟集群的标记
    async fn running_cluster(&self, name: &str, marker: &str) -> RkeCluster {
        let mut cluster = self
            .rke_clusters
            .create(&RkeCluster::new("e1", name))
            .await
            .unwrap();
        cluster.state = ClusterState::Running;
        cluster.kube_config = marker.to_string();
        cluster.api_url = "https://10.0.0.1:6443".to_string();
        self.rke_clusters.update(&cluster).await.unwrap();
        cluster
    }
}

#[tokio::test]
async fn test_describe_known_cluster() {
    let h = Harness::new(
        FakeKubeFactory::default().with("cluster-a", FakeCluster::healthy("v1.22.3", 5, true)),
    )
    .await;
    let row = h.running_cluster("demo", "cluster-a").await;

    let described = h.rke().describe_cluster("e1", &row.cluster_id).await.unwrap();
    assert_eq!(described.state, ClusterState::Running);
    assert_eq!(described.size, 5);
    assert_eq!(described.current_version, "v1.22.3");
    assert!(described.rainbond_init);
    assert!(!described.parameters.disable_rainbond_init);
}

#[tokio::test]
async fn test_describe_out_of_range_version() {
    let h = Harness::new(
        FakeKubeFactory::default().with("old", FakeCluster::healthy("v1.18.9", 3, false)),
    )
    .await;
    let row = h.running_cluster("legacy", "old").await;

    let described = h.rke().describe_cluster("e1", "legacy").await.unwrap();
    assert_eq!(described.cluster_id, row.cluster_id);
    assert_eq!(described.current_version, "v1.18.9");
    assert!(described.parameters.disable_rainbond_init);
    assert!(described.parameters.message.contains("v1.19.0"));
    assert!(described.parameters.message.contains("v1.26.0"));
}

#[tokio::test]
async fn test_describe_unreachable_api_goes_offline() {
    let mut broken = FakeCluster::healthy("", 0, false);
    broken.version = Err("connection refused".to_string());
    let h = Harness::new(FakeKubeFactory::default().with("broken", broken)).await;
    h.running_cluster("demo", "broken").await;

    let described = h.rke().describe_cluster("e1", "demo").await.unwrap();
    assert_eq!(described.state, ClusterState::Offline);
    assert!(described.parameters.disable_rainbond_init);
    assert!(described.current_version.is_empty());
}

#[tokio::test]
async fn test_describe_node_list_timeout() {
    let mut slow = FakeCluster::healthy("v1.23.10", 3, false);
    slow.node_delay = Some(Duration::from_millis(200));
    let h = Harness::with_health(FakeKubeFactory::default().with("slow", slow), |p| {
        p.with_timeouts(Duration::from_secs(1), Duration::from_millis(20))
    })
    .await;
    h.running_cluster("demo", "slow").await;

    let described = h.rke().describe_cluster("e1", "demo").await.unwrap();
    assert_eq!(described.current_version, "v1.23.10");
    assert!(described.parameters.disable_rainbond_init);
    assert_eq!(described.size, 0);
}

#[tokio::test]
async fn test_describe_client_failure_is_error() {
    let h = Harness::new(FakeKubeFactory::default()).await;
    h.running_cluster("demo", "unknown-cluster").await;

    let err = h.rke().describe_cluster("e1", "demo").await.unwrap_err();
    assert!(matches!(err, AdaptorError::Kube(_)));
}

#[tokio::test]
async fn test_describe_uninstalled_cluster_skips_health_check() {
    let h = Harness::new(FakeKubeFactory::default()).await;
    h.rke_clusters
        .create(&RkeCluster::new("e1", "pending"))
        .await
        .unwrap();

    let described = h.rke().describe_cluster("e1", "pending").await.unwrap();
    assert_eq!(described.state, ClusterState::Initial);
    assert!(described.current_version.is_empty());
}

#[tokio::test]
async fn test_list_omits_clusters_with_broken_client() {
    let h = Harness::new(
        FakeKubeFactory::default().with("good", FakeCluster::healthy("v1.22.3", 2, false)),
    )
    .await;
    h.running_cluster("good", "good").await;
    h.running_cluster("broken", "garbage").await;
    h.rke_clusters
        .create(&RkeCluster::new("e1", "pending"))
        .await
        .unwrap();

    let mut names: Vec<String> = h
        .rke()
        .cluster_list("e1")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["good", "pending"]);

    assert!(h.rke().cluster_list("other").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_gated_by_rainbond_install() {
    let h = Harness::new(
        FakeKubeFactory::default()
            .with("installed", FakeCluster::healthy("v1.22.3", 3, true))
            .with("empty", FakeCluster::healthy("v1.22.3", 3, false)),
    )
    .await;
    let installed = h.running_cluster("installed", "installed").await;
    let empty = h.running_cluster("empty", "empty").await;

    let err = h
        .rke()
        .delete_cluster("e1", &installed.cluster_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AdaptorError::ClusterNotAllowDelete(ref id) if *id == installed.cluster_id));
    assert!(h.rke_clusters.get("e1", "installed").await.is_ok());

    h.rke().delete_cluster("e1", &empty.cluster_id).await.unwrap();
    let err = h.rke_clusters.get("e1", "empty").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_unreachable_cluster_allowed() {
    let h = Harness::new(FakeKubeFactory::default()).await;
    let row = h.running_cluster("gone", "nowhere").await;

    h.rke().delete_cluster("e1", &row.cluster_id).await.unwrap();
    assert!(h.rke_clusters.list("e1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_factory_rejects_unknown_provider() {
    let h = Harness::new(FakeKubeFactory::default()).await;
    let err = h.factory.get("aliyun").err().unwrap();
    assert!(matches!(err, AdaptorError::ProviderNotSupported(ref p) if p == "aliyun"));
    assert_eq!(err.code(), 7001);
    assert_eq!(h.rke().provider(), RKE_PROVIDER);
    assert_eq!(h.custom().provider(), CUSTOM_PROVIDER);
}

#[tokio::test]
async fn test_rke_create_and_init_config() {
    let h = Harness::new(FakeKubeFactory::default()).await;
    let created = h
        .rke()
        .create_cluster(&CreateClusterRequest {
            eid: "e1".to_string(),
            name: "demo".to_string(),
            rke_config: Some(three_node_config()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(created.state, ClusterState::Initial);
    assert_eq!(created.size, 3);

    let err = h
        .rke()
        .get_kube_config("e1", &created.cluster_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AdaptorError::KubeConfigEmpty));

    let init = h
        .rke()
        .get_rainbond_init_config("e1", &created.cluster_id)
        .await
        .unwrap();
    assert_eq!(init.cluster_id, created.cluster_id);
    assert_eq!(init.gateway_nodes, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    assert_eq!(init.eip, init.gateway_nodes);
    assert_eq!(init.chaos_nodes.len(), 3);
    assert_eq!(init.etcd_endpoints[0], "https://10.0.0.1:2379");

    let err = h
        .rke()
        .create_cluster(&CreateClusterRequest {
            eid: "e1".to_string(),
            name: "demo".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AdaptorError::NameConflict(_)));
}

#[tokio::test]
async fn test_rke_create_rejects_path_like_names() {
    let h = Harness::new(FakeKubeFactory::default()).await;
    for (eid, name) in [("e1", ".."), ("e1", "a/b"), ("../e2", "demo"), ("e1", "")] {
        let err = h
            .rke()
            .create_cluster(&CreateClusterRequest {
                eid: eid.to_string(),
                name: name.to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AdaptorError::InvalidParameter(_)), "{eid}/{name}");
    }
    assert!(h.rke().cluster_list("e1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rke_adaptor_installs_through_lifecycle() {
    let h = Harness::new(FakeKubeFactory::default()).await;
    h.rke()
        .create_cluster(&CreateClusterRequest {
            eid: "e1".to_string(),
            name: "demo".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let sink = RecordingSink::default();
    let request = CreateKubernetesRequest {
        eid: "e1".to_string(),
        cluster_name: "demo".to_string(),
        rke_config: Some(three_node_config()),
        kubernetes_version: String::new(),
    };
    let cluster = h
        .rke()
        .create_rainbond_kubernetes(&request, &sink, &Cancellation::new())
        .await
        .unwrap()
        .expect("install should succeed");
    assert_eq!(cluster.state, ClusterState::Running);
    assert_eq!(cluster.master_url, "https://10.0.0.1:6443");

    let kube_config = h.rke().get_kube_config("e1", "demo").await.unwrap();
    assert!(kube_config.contains("https://10.0.0.1:6443"));
}

#[tokio::test]
async fn test_custom_cluster_import() {
    let h = Harness::new(
        FakeKubeFactory::default().with("172.16.0.10", FakeCluster::healthy("v1.24.4", 4, false)),
    )
    .await;

    let err = h
        .custom()
        .create_cluster(&CreateClusterRequest {
            eid: "e1".to_string(),
            name: "imported".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AdaptorError::KubeConfigEmpty));

    let err = h
        .custom()
        .create_cluster(&CreateClusterRequest {
            eid: "e1".to_string(),
            name: "imported".to_string(),
            kube_config: "clusters: [not a kubeconfig".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AdaptorError::ConfigInvalid(_)));

    let created = h
        .custom()
        .create_cluster(&CreateClusterRequest {
            eid: "e1".to_string(),
            name: "imported".to_string(),
            kube_config: KUBECONFIG.to_string(),
            eip: Some("1.1.1.1,2.2.2.2".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(created.cluster_type, "custom");

    let described = h
        .custom()
        .describe_cluster("e1", &created.cluster_id)
        .await
        .unwrap();
    assert_eq!(described.current_version, "v1.24.4");
    assert_eq!(described.size, 4);

    let init = h
        .custom()
        .get_rainbond_init_config("e1", "imported")
        .await
        .unwrap();
    assert_eq!(init.eip, vec!["1.1.1.1", "2.2.2.2"]);
    assert!(init.gateway_nodes.is_empty());

    assert_eq!(
        h.custom().get_kube_config("e1", "imported").await.unwrap(),
        KUBECONFIG
    );
    assert_eq!(h.custom_clusters.list("e1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_custom_cluster_cannot_be_provisioned() {
    let h = Harness::new(FakeKubeFactory::default()).await;
    let request = CreateKubernetesRequest {
        eid: "e1".to_string(),
        cluster_name: "imported".to_string(),
        rke_config: Some(three_node_config()),
        kubernetes_version: String::new(),
    };
    let err = h
        .custom()
        .create_rainbond_kubernetes(&request, &RecordingSink::default(), &Cancellation::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AdaptorError::NotSupportReinstall));
}
