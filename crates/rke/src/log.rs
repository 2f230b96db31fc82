use std::path::{Path, PathBuf};
use std::sync::Arc;

use adaptor_core::AdaptorResult;
use chrono::{SecondsFormat, Utc};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// 引擎输出日志，追加写入集群的 create.log
#[derive(Clone, Default)]
pub struct EngineLog {
    file: Option<Arc<Mutex<tokio::fs::File>>>,
    path: Option<PathBuf>,
}

impl EngineLog {
    pub async fn open(path: &Path) -> AdaptorResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: Some(Arc::new(Mutex::new(file))),
            path: Some(path.to_path_buf()),
        })
    }

    /// 丢弃所有输出
    pub fn discard() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn info(&self, message: impl AsRef<str>) {
        self.write("INFO", message.as_ref()).await
    }

    pub async fn warn(&self, message: impl AsRef<str>) {
        self.write("WARN", message.as_ref()).await
    }

    async fn write(&self, level: &str, message: &str) {
        let Some(file) = &self.file else {
            return;
        };
        let line = format!(
            "time=\"{}\" level={} msg=\"{}\"\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            level,
            message
        );
        let mut file = file.lock().await;
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!("写入安装日志失败: {e}");
            return;
        }
        let _ = file.flush().await;
    }
}

impl std::fmt::Debug for EngineLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineLog").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("create.log");
        std::fs::write(&path, "existing\n").unwrap();

        let log = EngineLog::open(&path).await.unwrap();
        log.info("[dialer] Setup tunnel").await;
        log.clone().warn("host skipped").await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "existing");
        assert!(lines[1].contains("level=INFO"));
        assert!(lines[2].contains("host skipped"));
    }

    #[tokio::test]
    async fn test_discard_is_silent() {
        let log = EngineLog::discard();
        log.info("nothing").await;
        assert!(log.path().is_none());
    }
}
