//! Job pipeline for vreel.
//!
//! This crate provides:
//! - The compose-then-reframe orchestrator with scoped temporary storage
//! - Background job execution with cancellation and an event stream
//! - Worker configuration from the environment
//! - Structured job logging and Prometheus metrics
//! - The publish collaborator

pub mod acquire;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod publish;

pub use acquire::{SourceAcquirer, YtDlpAcquirer};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::{
    edited_name, final_name, spawn_job, JobHandle, JobOutput, JobRequest, Pipeline,
};
pub use progress::ProgressSink;
pub use publish::{LogPublisher, Publisher};
