use adaptor_core::{
    models::{ClusterState, CustomCluster, RkeCluster},
    traits::{CustomClusterRepository, RkeClusterRepository},
    AdaptorError, AdaptorResult,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};

use crate::database::{insert_error, queries};

pub struct SqliteRkeClusterRepository {
    pool: SqlitePool,
}

impl SqliteRkeClusterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_cluster(row: &SqliteRow) -> AdaptorResult<RkeCluster> {
        let state: String = row.try_get("stats")?;
        Ok(RkeCluster {
            eid: row.try_get("eid")?,
            name: row.try_get("name")?,
            cluster_id: row.try_get("clusterID")?,
            api_url: row.try_get("apiURL")?,
            kube_config: row.try_get("kubeConfig")?,
            network_mode: row.try_get("networkMode")?,
            service_cidr: row.try_get("serviceCIDR")?,
            pod_cidr: row.try_get("podCIDR")?,
            kubernetes_version: row.try_get("kubernetesVersion")?,
            rainbond_init: row.try_get("rainbondInit")?,
            create_log_path: row.try_get("createLogPath")?,
            node_list: row.try_get("nodeList")?,
            state: state.parse::<ClusterState>()?,
            rke_config: row.try_get("rkeConfig")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn insert(&self, cluster: &RkeCluster) -> AdaptorResult<()> {
        sqlx::query(&queries::insert_rke_cluster())
            .bind(&cluster.eid)
            .bind(&cluster.name)
            .bind(&cluster.cluster_id)
            .bind(&cluster.api_url)
            .bind(&cluster.kube_config)
            .bind(&cluster.network_mode)
            .bind(&cluster.service_cidr)
            .bind(&cluster.pod_cidr)
            .bind(&cluster.kubernetes_version)
            .bind(cluster.rainbond_init)
            .bind(&cluster.create_log_path)
            .bind(&cluster.node_list)
            .bind(cluster.state.as_str())
            .bind(&cluster.rke_config)
            .bind(cluster.created_at)
            .bind(cluster.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(e, &cluster.name))?;
        Ok(())
    }
}

#[async_trait]
impl RkeClusterRepository for SqliteRkeClusterRepository {
    #[instrument(skip(self, cluster), fields(eid = %cluster.eid, name = %cluster.name))]
    async fn create(&self, cluster: &RkeCluster) -> AdaptorResult<RkeCluster> {
        if cluster.name.is_empty() || cluster.eid.is_empty() {
            return Err(AdaptorError::invalid_params("集群名称和企业ID不能为空"));
        }

        let mut created = cluster.clone();
        if created.cluster_id.is_empty() {
            created.cluster_id = queries::new_id();
        }
        self.insert(&created).await?;

        debug!("创建RKE集群记录成功: {} ({})", created.name, created.cluster_id);
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get(&self, eid: &str, name_or_id: &str) -> AdaptorResult<RkeCluster> {
        let row = sqlx::query(&queries::select_rke_cluster())
            .bind(eid)
            .bind(name_or_id)
            .bind(name_or_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_cluster(&row),
            None => Err(AdaptorError::cluster_not_found(name_or_id)),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, eid: &str) -> AdaptorResult<Vec<RkeCluster>> {
        let rows = sqlx::query(&queries::list_rke_clusters())
            .bind(eid)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_cluster).collect()
    }

    #[instrument(skip(self, cluster), fields(
        eid = %cluster.eid,
        cluster_id = %cluster.cluster_id,
        state = %cluster.state,
    ))]
    async fn update(&self, cluster: &RkeCluster) -> AdaptorResult<()> {
        if cluster.cluster_id.is_empty() {
            return Err(AdaptorError::invalid_params("更新集群时cluster_id不能为空"));
        }

        let result = sqlx::query(&queries::update_rke_cluster())
            .bind(&cluster.name)
            .bind(&cluster.api_url)
            .bind(&cluster.kube_config)
            .bind(&cluster.network_mode)
            .bind(&cluster.service_cidr)
            .bind(&cluster.pod_cidr)
            .bind(&cluster.kubernetes_version)
            .bind(cluster.rainbond_init)
            .bind(&cluster.create_log_path)
            .bind(&cluster.node_list)
            .bind(cluster.state.as_str())
            .bind(&cluster.rke_config)
            .bind(Utc::now())
            .bind(&cluster.eid)
            .bind(&cluster.cluster_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!("集群记录不存在，插入新记录: {}", cluster.cluster_id);
            self.insert(cluster).await?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, eid: &str, name_or_id: &str) -> AdaptorResult<()> {
        let result = sqlx::query(&queries::delete_rke_cluster())
            .bind(eid)
            .bind(name_or_id)
            .bind(name_or_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AdaptorError::cluster_not_found(name_or_id));
        }
        debug!("删除RKE集群记录: {}", name_or_id);
        Ok(())
    }
}

pub struct SqliteCustomClusterRepository {
    pool: SqlitePool,
}

impl SqliteCustomClusterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_cluster(row: &SqliteRow) -> AdaptorResult<CustomCluster> {
        Ok(CustomCluster {
            eid: row.try_get("eid")?,
            name: row.try_get("name")?,
            cluster_id: row.try_get("clusterID")?,
            kube_config: row.try_get("kubeConfig")?,
            eip: row.try_get("eip")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl CustomClusterRepository for SqliteCustomClusterRepository {
    #[instrument(skip(self, cluster), fields(eid = %cluster.eid, name = %cluster.name))]
    async fn create(&self, cluster: &CustomCluster) -> AdaptorResult<CustomCluster> {
        if cluster.name.is_empty() || cluster.eid.is_empty() {
            return Err(AdaptorError::invalid_params("集群名称和企业ID不能为空"));
        }

        let mut created = cluster.clone();
        if created.cluster_id.is_empty() {
            created.cluster_id = queries::new_id();
        }

        sqlx::query(&queries::insert_custom_cluster())
            .bind(&created.eid)
            .bind(&created.name)
            .bind(&created.cluster_id)
            .bind(&created.kube_config)
            .bind(&created.eip)
            .bind(created.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(e, &created.name))?;

        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get(&self, eid: &str, name_or_id: &str) -> AdaptorResult<CustomCluster> {
        let row = sqlx::query(&queries::select_custom_cluster())
            .bind(eid)
            .bind(name_or_id)
            .bind(name_or_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_cluster(&row),
            None => Err(AdaptorError::cluster_not_found(name_or_id)),
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, eid: &str) -> AdaptorResult<Vec<CustomCluster>> {
        let rows = sqlx::query(&queries::list_custom_clusters())
            .bind(eid)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_cluster).collect()
    }

    #[instrument(skip(self))]
    async fn delete(&self, eid: &str, name_or_id: &str) -> AdaptorResult<()> {
        let result = sqlx::query(&queries::delete_custom_cluster())
            .bind(eid)
            .bind(name_or_id)
            .bind(name_or_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AdaptorError::cluster_not_found(name_or_id));
        }
        Ok(())
    }
}
