//! 引擎完整状态文件 `cluster.rkestate`
//!
//! JSON文档，同时保存期望状态与当前状态，包括证书与加密配置。

use std::collections::BTreeMap;
use std::path::Path;

use adaptor_core::{models::RkeConfig, AdaptorError, AdaptorResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// CA证书名称
pub const CA_CERT_NAME: &str = "kube-ca";
/// 管理员客户端证书名称
pub const KUBE_ADMIN_CERT_NAME: &str = "kube-admin";

/// 单个证书及其私钥
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatePki {
    #[serde(rename = "certificatePEM", default)]
    pub certificate_pem: String,
    #[serde(rename = "keyPEM", default)]
    pub key_pem: String,
    #[serde(rename = "csrPEM", default, skip_serializing_if = "String::is_empty")]
    pub csr_pem: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub common_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ou_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_path: String,
}

pub type CertificateBundle = BTreeMap<String, CertificatePki>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RkeState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rke_config: Option<RkeConfig>,
    #[serde(default)]
    pub certificates_bundle: CertificateBundle,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encryption_config: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullState {
    #[serde(default)]
    pub desired_state: RkeState,
    #[serde(default)]
    pub current_state: RkeState,
}

impl FullState {
    /// 读取状态文件，文件不存在时返回 `RkeConfigLost`
    pub async fn read(path: &Path) -> AdaptorResult<Self> {
        match Self::read_optional(path).await? {
            Some(state) => Ok(state),
            None => Err(AdaptorError::RkeConfigLost),
        }
    }

    pub async fn read_optional(path: &Path) -> AdaptorResult<Option<Self>> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(path).await?;
        let state: FullState = serde_json::from_str(&content)
            .map_err(|e| AdaptorError::IncorrectRkeConfig(format!("解析状态文件失败: {e}")))?;
        debug!("读取状态文件: {}", path.display());
        Ok(Some(state))
    }

    pub async fn write(&self, path: &Path) -> AdaptorResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        debug!("写入状态文件: {}", path.display());
        Ok(())
    }

    /// 当前状态中的加密配置一旦生效就优先于期望状态
    pub fn effective_encryption_config(&self) -> &str {
        if self.current_state.encryption_config.is_empty() {
            &self.desired_state.encryption_config
        } else {
            &self.current_state.encryption_config
        }
    }

    /// 集群是否已完成过安装
    pub fn has_current_state(&self) -> bool {
        self.current_state.rke_config.is_some()
    }
}
