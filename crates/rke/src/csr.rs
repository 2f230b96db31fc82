//! 服务证书CSR生成
//!
//! 纯本地操作，不连接任何节点。证书目录中的文件命名规则：
//! `<name>.pem`、`<name>-key.pem`、`<name>-csr.pem`。

use std::path::Path;

use adaptor_core::{models::RkeConfig, AdaptorResult};
use tracing::{debug, info};

use crate::cluster::KubeCluster;
use crate::engine::EngineContext;
use crate::log::EngineLog;
use crate::options::ExternalFlags;
use crate::state::{CertificateBundle, CertificatePki};

const KEY_SUFFIX: &str = "-key.pem";
const CSR_SUFFIX: &str = "-csr.pem";
const CERT_SUFFIX: &str = ".pem";

pub async fn generate_csrs(
    ctx: &EngineContext,
    config: &RkeConfig,
    flags: &ExternalFlags,
    log: &EngineLog,
) -> AdaptorResult<CertificateBundle> {
    let cert_dir = flags.cert_dir();
    log.info(format!(
        "Generating Kubernetes cluster CSR certificates in [{}]",
        cert_dir.display()
    ))
    .await;

    let existing = read_certificates(&cert_dir).await?;
    let mut cluster = KubeCluster::new(config.clone(), "", log.clone());
    cluster.certificates = existing;

    ctx.call(ctx.engine.generate_service_csrs(&mut cluster))
        .await?;

    write_certificates(&cert_dir, &cluster.certificates).await?;
    info!(
        "已生成 {} 个服务证书CSR: {}",
        cluster.certificates.len(),
        cert_dir.display()
    );
    Ok(cluster.certificates)
}

/// 读取证书目录，目录不存在时返回空集合
pub async fn read_certificates(dir: &Path) -> AdaptorResult<CertificateBundle> {
    let mut bundle = CertificateBundle::new();
    if !tokio::fs::try_exists(dir).await? {
        return Ok(bundle);
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some((name, kind)) = classify(&file_name) else {
            continue;
        };
        let content = tokio::fs::read_to_string(entry.path()).await?;
        let pki = bundle
            .entry(name.to_string())
            .or_insert_with(|| CertificatePki {
                name: name.to_string(),
                ..Default::default()
            });
        match kind {
            PemKind::Certificate => {
                pki.certificate_pem = content;
                pki.path = entry.path().display().to_string();
            }
            PemKind::Key => {
                pki.key_pem = content;
                pki.key_path = entry.path().display().to_string();
            }
            PemKind::Csr => pki.csr_pem = content,
        }
        debug!("读取证书文件: {}", file_name);
    }
    Ok(bundle)
}

/// 将证书、私钥与CSR写回目录，空内容跳过
pub async fn write_certificates(dir: &Path, bundle: &CertificateBundle) -> AdaptorResult<()> {
    tokio::fs::create_dir_all(dir).await?;
    for (name, pki) in bundle {
        for (suffix, content) in [
            (CERT_SUFFIX, &pki.certificate_pem),
            (KEY_SUFFIX, &pki.key_pem),
            (CSR_SUFFIX, &pki.csr_pem),
        ] {
            if content.is_empty() {
                continue;
            }
            tokio::fs::write(dir.join(format!("{name}{suffix}")), content).await?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PemKind {
    Certificate,
    Key,
    Csr,
}

fn classify(file_name: &str) -> Option<(&str, PemKind)> {
    if let Some(name) = file_name.strip_suffix(KEY_SUFFIX) {
        return Some((name, PemKind::Key));
    }
    if let Some(name) = file_name.strip_suffix(CSR_SUFFIX) {
        return Some((name, PemKind::Csr));
    }
    file_name
        .strip_suffix(CERT_SUFFIX)
        .filter(|name| !name.is_empty())
        .map(|name| (name, PemKind::Certificate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_classify_file_names() {
        assert_eq!(classify("kube-apiserver.pem"), Some(("kube-apiserver", PemKind::Certificate)));
        assert_eq!(classify("kube-apiserver-key.pem"), Some(("kube-apiserver", PemKind::Key)));
        assert_eq!(classify("kube-apiserver-csr.pem"), Some(("kube-apiserver", PemKind::Csr)));
        assert_eq!(classify("README"), None);
        assert_eq!(classify(".pem"), None);
    }

    #[tokio::test]
    async fn test_read_write_certificates() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("certs");
        assert!(read_certificates(&dir).await.unwrap().is_empty());

        let mut bundle = CertificateBundle::new();
        bundle.insert(
            "kube-proxy".to_string(),
            CertificatePki {
                name: "kube-proxy".to_string(),
                key_pem: "KEY".to_string(),
                csr_pem: "CSR".to_string(),
                ..Default::default()
            },
        );
        write_certificates(&dir, &bundle).await.unwrap();
        assert!(!dir.join("kube-proxy.pem").exists());

        let loaded = read_certificates(&dir).await.unwrap();
        let proxy = &loaded["kube-proxy"];
        assert_eq!(proxy.key_pem, "KEY");
        assert_eq!(proxy.csr_pem, "CSR");
        assert!(proxy.certificate_pem.is_empty());
    }
}
