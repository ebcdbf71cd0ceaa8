//! Job event delivery.
//!
//! The pipeline never touches the caller's presentation layer; it pushes
//! [`JobEvent`]s into an unbounded channel the caller drains at its own pace.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use vreel_media::ProgressCallback;
use vreel_models::{JobEvent, RenderStage};

/// Sending half of a job's event stream.
///
/// Sends never block and never fail the job: a caller that stopped
/// listening simply misses events.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<JobEvent>>,
}

impl ProgressSink {
    /// Create a sink and the receiver for its events.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: JobEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                debug!("Job event receiver dropped");
            }
        }
    }

    /// Encoder callback emitting `Progress` events for `stage`.
    ///
    /// Only changes in whole percent are forwarded.
    pub fn render_progress(&self, stage: RenderStage, total_secs: f64) -> ProgressCallback {
        let sink = self.clone();
        let last = Arc::new(AtomicU8::new(u8::MAX));
        Box::new(move |progress| {
            let percent = progress.percent(total_secs);
            if last.swap(percent, Ordering::Relaxed) != percent {
                sink.emit(JobEvent::Progress { stage, percent });
            }
        })
    }
}
