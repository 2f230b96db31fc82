//! SSH密钥与节点连通性检查
//!
//! 密钥对位于 `~/.ssh/id_rsa[.pub]`，不存在时使用系统 `ssh-keygen`
//! 生成2048位RSA密钥。连通性检查只验证运维人员能否以 `docker` 用户登录。

use std::path::{Path, PathBuf};
use std::time::Duration;

use adaptor_core::{models::DEFAULT_SSH_USER, AdaptorError, AdaptorResult};
use tokio::process::Command;
use tracing::{debug, info};

pub const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SshKeyManager {
    ssh_dir: PathBuf,
}

impl SshKeyManager {
    pub fn new(home: impl AsRef<Path>) -> Self {
        Self {
            ssh_dir: home.as_ref().join(".ssh"),
        }
    }

    /// 使用 `HOME` 环境变量定位密钥目录
    pub fn from_env() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
        Self::new(home)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.ssh_dir.join("id_rsa")
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.ssh_dir.join("id_rsa.pub")
    }

    /// 读取公钥，不存在时生成新的密钥对
    pub async fn ensure_key_pair(&self) -> AdaptorResult<String> {
        let public_key = self.public_key_path();
        if !tokio::fs::try_exists(&public_key).await? {
            self.generate_key_pair().await?;
        }
        self.read_public_key().await
    }

    pub async fn read_public_key(&self) -> AdaptorResult<String> {
        let path = self.public_key_path();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AdaptorError::SshFileNotFound(format!("{}: {e}", path.display())))?;
        parse_public_key(&content)
    }

    async fn generate_key_pair(&self) -> AdaptorResult<()> {
        tokio::fs::create_dir_all(&self.ssh_dir).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.ssh_dir, std::fs::Permissions::from_mode(0o700))
                .await?;
        }

        let private_key = self.private_key_path();
        info!("生成SSH密钥对: {}", private_key.display());
        let output = Command::new("ssh-keygen")
            .arg("-t")
            .arg("rsa")
            .arg("-b")
            .arg("2048")
            .arg("-N")
            .arg("")
            .arg("-q")
            .arg("-f")
            .arg(&private_key)
            .output()
            .await
            .map_err(|e| AdaptorError::SshFileNotFound(format!("执行ssh-keygen失败: {e}")))?;

        if !output.status.success() {
            return Err(AdaptorError::SshFileNotFound(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    /// 以 docker 用户尝试登录节点，跳过主机密钥校验
    pub async fn check_connect(&self, host: &str, port: u16) -> AdaptorResult<()> {
        let target = format!("{DEFAULT_SSH_USER}@{host}");
        debug!("检查SSH连通性: {}:{}", target, port);

        let mut command = Command::new("ssh");
        command
            .args(connect_args(&self.private_key_path(), port))
            .arg(&target)
            .arg("exit")
            .kill_on_drop(true);

        let output = tokio::time::timeout(SSH_CONNECT_TIMEOUT + Duration::from_secs(1), command.output())
            .await
            .map_err(|_| AdaptorError::SshConnect(format!("{host}:{port} 连接超时")))?
            .map_err(|e| AdaptorError::SshConnect(format!("执行ssh失败: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(AdaptorError::SshConnect(format!(
                "{host}:{port} {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

fn connect_args(private_key: &Path, port: u16) -> Vec<String> {
    vec![
        "-i".to_string(),
        private_key.display().to_string(),
        "-p".to_string(),
        port.to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", SSH_CONNECT_TIMEOUT.as_secs()),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
    ]
}

/// 校验 authorized_keys 格式的公钥
pub fn parse_public_key(content: &str) -> AdaptorResult<String> {
    let key = content.trim();
    let mut parts = key.split_whitespace();
    let kind = parts.next().unwrap_or_default();
    let body = parts.next().unwrap_or_default();
    if !kind.starts_with("ssh-") || body.is_empty() {
        return Err(AdaptorError::SshParse("公钥格式不正确".to_string()));
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_public_key() {
        assert!(parse_public_key("ssh-rsa AAAAB3Nza user@host\n").is_ok());
        assert!(matches!(
            parse_public_key("not a key"),
            Err(AdaptorError::SshParse(_))
        ));
        assert!(parse_public_key("").is_err());
    }

    #[test]
    fn test_connect_args() {
        let args = connect_args(Path::new("/root/.ssh/id_rsa"), 2222);
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"ConnectTimeout=5".to_string()));
        assert!(args.contains(&"2222".to_string()));
    }

    #[tokio::test]
    async fn test_read_existing_key() {
        let home = TempDir::new().unwrap();
        let manager = SshKeyManager::new(home.path());
        assert!(matches!(
            manager.read_public_key().await,
            Err(AdaptorError::SshFileNotFound(_))
        ));

        std::fs::create_dir_all(home.path().join(".ssh")).unwrap();
        std::fs::write(manager.public_key_path(), "ssh-rsa AAAA test\n").unwrap();
        assert_eq!(manager.ensure_key_pair().await.unwrap(), "ssh-rsa AAAA test");
    }
}
