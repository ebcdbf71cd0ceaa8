//! Worker error types.

use thiserror::Error;
use vreel_media::MediaError;
use vreel_models::FailureKind;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Temporary storage error: {0}")]
    Resource(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>) -> Self {
        Self::PublishFailed(msg.into())
    }

    /// Failure category reported to the caller.
    pub fn kind(&self) -> FailureKind {
        match self {
            // A job that cannot be described cannot be composed
            WorkerError::InvalidJob(_) => FailureKind::Composition,
            WorkerError::Resource(_) | WorkerError::Io(_) => FailureKind::Resource,
            WorkerError::PublishFailed(_) => FailureKind::Encode,
            WorkerError::Cancelled => FailureKind::Cancelled,
            WorkerError::Timeout(_) => FailureKind::Timeout,
            WorkerError::Media(e) => e.kind(),
        }
    }

    /// Whether the caller asked for this outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind(), FailureKind::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vreel_models::RenderStage;

    #[test]
    fn test_kind_passes_media_category_through() {
        let err: WorkerError = MediaError::reframe("source too narrow").into();
        assert_eq!(err.kind(), FailureKind::Reframe);
        assert_eq!(err.to_string(), MediaError::reframe("source too narrow").to_string());

        let err: WorkerError = MediaError::encode(
            RenderStage::Compose,
            MediaError::ffmpeg_failed("boom", None, Some(1)),
        )
        .into();
        assert_eq!(err.kind(), FailureKind::Encode);
    }

    #[test]
    fn test_worker_kinds() {
        assert_eq!(WorkerError::resource("disk full").kind(), FailureKind::Resource);
        assert_eq!(WorkerError::Timeout(5).kind(), FailureKind::Timeout);
        assert!(WorkerError::Cancelled.is_cancelled());
        assert!(WorkerError::Media(MediaError::Cancelled).is_cancelled());
        assert_eq!(WorkerError::invalid_job("bad").kind(), FailureKind::Composition);
    }
}
