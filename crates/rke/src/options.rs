use std::path::PathBuf;
use std::time::Duration;

/// 默认证书目录
pub const DEFAULT_CERT_DIR: &str = "./cluster_certs";

/// 命令行等价的外部参数
#[derive(Debug, Clone, Default)]
pub struct ExternalFlags {
    pub cluster_file_path: PathBuf,
    /// 为空时使用 [`DEFAULT_CERT_DIR`]
    pub cert_dir: Option<PathBuf>,
    pub disable_port_check: bool,
}

impl ExternalFlags {
    pub fn new(cluster_file_path: impl Into<PathBuf>) -> Self {
        Self {
            cluster_file_path: cluster_file_path.into(),
            ..Default::default()
        }
    }

    /// 与 cluster.yml 同目录同名的 .rkestate 文件
    pub fn state_file_path(&self) -> PathBuf {
        self.cluster_file_path.with_extension("rkestate")
    }

    pub fn cert_dir(&self) -> PathBuf {
        self.cert_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CERT_DIR))
    }
}

/// 固定间隔重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// 保存状态到集群时使用：3次，间隔2秒
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_file_path() {
        let flags = ExternalFlags::new("/tmp/enterprise/e1/rke/demo/cluster.yml");
        assert_eq!(
            flags.state_file_path(),
            PathBuf::from("/tmp/enterprise/e1/rke/demo/cluster.rkestate")
        );
        assert_eq!(flags.cert_dir(), PathBuf::from(DEFAULT_CERT_DIR));
    }
}
