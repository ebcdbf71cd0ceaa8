//! Publishing finished artifacts.

use async_trait::async_trait;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::error::{WorkerError, WorkerResult};

/// Delivers a final artifact to a destination platform.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `path` with `caption`, returning the platform's identifier.
    async fn publish(&self, path: &Path, caption: &str) -> WorkerResult<String>;

    fn name(&self) -> &'static str;
}

/// Publisher that only records the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, path: &Path, caption: &str) -> WorkerResult<String> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            WorkerError::publish_failed(format!("cannot read {}: {}", path.display(), e))
        })?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(WorkerError::publish_failed(format!(
                "{} is not a non-empty file",
                path.display()
            )));
        }

        let id = format!("log-{}", Uuid::new_v4().simple());
        info!(
            publisher = self.name(),
            path = %path.display(),
            caption = %caption,
            size_bytes = metadata.len(),
            publish_id = %id,
            "Published artifact"
        );
        Ok(id)
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_log_publisher_returns_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc_9x16.mp4");
        std::fs::write(&path, b"video").unwrap();

        let id = LogPublisher.publish(&path, "#shorts").await.unwrap();
        assert!(id.starts_with("log-"));
        assert_ne!(id, LogPublisher.publish(&path, "#shorts").await.unwrap());
    }

    #[tokio::test]
    async fn test_log_publisher_rejects_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = LogPublisher
            .publish(&dir.path().join("missing.mp4"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::PublishFailed(_)));
    }
}
