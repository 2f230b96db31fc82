//! 集群状态目录
//!
//! 目录结构：`<CONFIG_DIR>/enterprise/<eid>/rke/<cluster_name>/`，包含
//! `cluster.yml`、`cluster.rkestate` 与 `create.log` 三个文件。

use std::path::{Path, PathBuf};

use adaptor_core::{models::check_path_segment, AdaptorResult};
use chrono::{SecondsFormat, Utc};
use tokio::fs;
use tracing::{debug, info};

pub const CLUSTER_CONFIG_FILE: &str = "cluster.yml";
pub const CLUSTER_STATE_FILE: &str = "cluster.rkestate";
pub const CREATE_LOG_FILE: &str = "create.log";

/// 单个集群的文件路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPaths {
    pub dir: PathBuf,
    pub config_file: PathBuf,
    pub state_file: PathBuf,
    pub log_file: PathBuf,
}

impl ClusterPaths {
    fn new(dir: PathBuf) -> Self {
        Self {
            config_file: dir.join(CLUSTER_CONFIG_FILE),
            state_file: dir.join(CLUSTER_STATE_FILE),
            log_file: dir.join(CREATE_LOG_FILE),
            dir,
        }
    }

    pub fn config_backup(&self) -> PathBuf {
        self.dir.join(format!("{CLUSTER_CONFIG_FILE}.bak"))
    }
}

#[derive(Debug, Clone)]
pub struct StateDirectory {
    root: PathBuf,
}

impl StateDirectory {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        let root = config_dir.into();
        let root = if root.as_os_str().is_empty() {
            PathBuf::from("/tmp")
        } else {
            root
        };
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn enterprise_dir(&self, eid: &str) -> AdaptorResult<PathBuf> {
        check_path_segment("企业ID", eid)?;
        Ok(self.root.join("enterprise").join(eid).join("rke"))
    }

    /// 集群目录路径，`eid` 与集群名称都必须是单级目录名
    pub fn cluster_paths(&self, eid: &str, cluster_name: &str) -> AdaptorResult<ClusterPaths> {
        check_path_segment("集群名称", cluster_name)?;
        Ok(ClusterPaths::new(self.enterprise_dir(eid)?.join(cluster_name)))
    }

    /// 集群按名称分目录之前使用的状态文件位置
    pub fn legacy_state_file(&self, eid: &str) -> AdaptorResult<PathBuf> {
        Ok(self.enterprise_dir(eid)?.join(CLUSTER_STATE_FILE))
    }

    /// 删除集群目录下的全部文件，返回目录此前是否存在
    pub async fn purge(&self, eid: &str, cluster_name: &str) -> AdaptorResult<bool> {
        let paths = self.cluster_paths(eid, cluster_name)?;
        if !fs::try_exists(&paths.dir).await? {
            return Ok(false);
        }
        fs::remove_dir_all(&paths.dir).await?;
        info!("清理集群状态目录: {}", paths.dir.display());
        Ok(true)
    }

    /// 创建集群目录，权限为仅属主可读写执行
    pub async fn ensure(&self, eid: &str, cluster_name: &str) -> AdaptorResult<ClusterPaths> {
        let paths = self.cluster_paths(eid, cluster_name)?;
        fs::create_dir_all(&paths.dir).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&paths.dir, std::fs::Permissions::from_mode(0o700)).await?;
        }
        Ok(paths)
    }

    pub async fn write_cluster_config(&self, paths: &ClusterPaths, yaml: &str) -> AdaptorResult<()> {
        fs::write(&paths.config_file, yaml).await?;
        debug!("写入集群配置: {}", paths.config_file.display());
        Ok(())
    }

    /// 将现有 cluster.yml 重命名为 cluster.yml.bak，不存在时返回 None
    pub async fn backup_cluster_config(&self, paths: &ClusterPaths) -> AdaptorResult<Option<PathBuf>> {
        if !fs::try_exists(&paths.config_file).await? {
            return Ok(None);
        }
        let backup = paths.config_backup();
        fs::rename(&paths.config_file, &backup).await?;
        Ok(Some(backup))
    }

    pub async fn restore_cluster_config(&self, paths: &ClusterPaths) -> AdaptorResult<()> {
        let backup = paths.config_backup();
        if fs::try_exists(&backup).await? {
            fs::rename(&backup, &paths.config_file).await?;
        }
        Ok(())
    }

    /// 将 create.log 重命名为 create.log.<RFC3339时间>
    pub async fn rotate_log(&self, paths: &ClusterPaths) -> AdaptorResult<Option<PathBuf>> {
        if !fs::try_exists(&paths.log_file).await? {
            return Ok(None);
        }
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let rotated = paths.dir.join(format!("{CREATE_LOG_FILE}.{stamp}"));
        fs::rename(&paths.log_file, &rotated).await?;
        debug!("日志文件已轮转: {}", rotated.display());
        Ok(Some(rotated))
    }

    /// 查找可用的状态文件，优先使用新目录结构
    pub async fn find_state_file(&self, eid: &str, cluster_name: &str) -> AdaptorResult<Option<PathBuf>> {
        let current = self.cluster_paths(eid, cluster_name)?.state_file;
        if fs::try_exists(&current).await? {
            return Ok(Some(current));
        }
        let legacy = self.legacy_state_file(eid)?;
        if fs::try_exists(&legacy).await? {
            return Ok(Some(legacy));
        }
        Ok(None)
    }

    /// 新目录下没有状态文件时，从旧位置复制一份
    pub async fn adopt_legacy_state(&self, eid: &str, paths: &ClusterPaths) -> AdaptorResult<bool> {
        if fs::try_exists(&paths.state_file).await? {
            return Ok(false);
        }
        let legacy = self.legacy_state_file(eid)?;
        if !fs::try_exists(&legacy).await? {
            return Ok(false);
        }
        fs::copy(&legacy, &paths.state_file).await?;
        info!("从旧目录复制状态文件: {}", legacy.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let dir = StateDirectory::new("/data");
        let paths = dir.cluster_paths("e1", "demo").unwrap();
        assert_eq!(paths.dir, PathBuf::from("/data/enterprise/e1/rke/demo"));
        assert_eq!(paths.config_file, PathBuf::from("/data/enterprise/e1/rke/demo/cluster.yml"));
        assert_eq!(
            dir.legacy_state_file("e1").unwrap(),
            PathBuf::from("/data/enterprise/e1/rke/cluster.rkestate")
        );
        assert_eq!(StateDirectory::new("").root(), Path::new("/tmp"));
    }

    #[test]
    fn test_rejects_names_outside_enterprise_dir() {
        let dir = StateDirectory::new("/data");
        for name in ["..", ".", "", "a/b", "../prod", "/etc", "demo/"] {
            let err = dir.cluster_paths("e1", name).unwrap_err();
            assert_eq!(err.code(), 400, "{name:?}");
        }
        assert!(dir.cluster_paths("..", "demo").is_err());
        assert!(dir.legacy_state_file("e1/..").is_err());
        assert!(dir.cluster_paths("e1", "demo.v2").is_ok());
    }

    #[tokio::test]
    async fn test_purge_never_leaves_cluster_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = StateDirectory::new(tmp.path());
        let prod = dir.ensure("e1", "prod").await.unwrap();
        fs::write(&prod.state_file, "{}").await.unwrap();

        assert!(dir.purge("e1", "..").await.is_err());
        assert!(dir.ensure("e1", "..").await.is_err());
        assert!(prod.state_file.exists());
    }

    #[tokio::test]
    async fn test_purge_and_recreate() {
        let tmp = TempDir::new().unwrap();
        let dir = StateDirectory::new(tmp.path());

        let paths = dir.ensure("e1", "demo").await.unwrap();
        dir.write_cluster_config(&paths, "nodes: []\n").await.unwrap();
        fs::write(&paths.state_file, "{}").await.unwrap();

        assert!(dir.purge("e1", "demo").await.unwrap());
        assert!(!paths.dir.exists());

        // 不存在时清理不报错
        assert!(!dir.purge("e1", "demo").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let dir = StateDirectory::new(tmp.path());
        let paths = dir.ensure("e1", "demo").await.unwrap();
        let mode = std::fs::metadata(&paths.dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn test_backup_and_rotate() {
        let tmp = TempDir::new().unwrap();
        let dir = StateDirectory::new(tmp.path());
        let paths = dir.ensure("e1", "demo").await.unwrap();

        assert!(dir.backup_cluster_config(&paths).await.unwrap().is_none());
        dir.write_cluster_config(&paths, "old").await.unwrap();
        let backup = dir.backup_cluster_config(&paths).await.unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "old");
        assert!(!paths.config_file.exists());

        dir.restore_cluster_config(&paths).await.unwrap();
        assert_eq!(std::fs::read_to_string(&paths.config_file).unwrap(), "old");

        fs::write(&paths.log_file, "line\n").await.unwrap();
        let rotated = dir.rotate_log(&paths).await.unwrap().unwrap();
        assert!(rotated
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("create.log."));
        assert!(!paths.log_file.exists());
    }

    #[tokio::test]
    async fn test_legacy_state_file() {
        let tmp = TempDir::new().unwrap();
        let dir = StateDirectory::new(tmp.path());

        assert!(dir.find_state_file("e1", "demo").await.unwrap().is_none());

        let legacy = dir.legacy_state_file("e1").unwrap();
        std::fs::create_dir_all(legacy.parent().unwrap()).unwrap();
        std::fs::write(&legacy, "{\"legacy\":true}").unwrap();

        assert_eq!(dir.find_state_file("e1", "demo").await.unwrap(), Some(legacy));

        let paths = dir.ensure("e1", "demo").await.unwrap();
        assert!(dir.adopt_legacy_state("e1", &paths).await.unwrap());
        assert_eq!(
            dir.find_state_file("e1", "demo").await.unwrap(),
            Some(paths.state_file.clone())
        );
        assert!(!dir.adopt_legacy_state("e1", &paths).await.unwrap());
    }
}
