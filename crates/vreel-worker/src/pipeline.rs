//! Pipeline orchestrator.
//!
//! Runs one job as `acquire -> compose -> reframe`, strictly in sequence,
//! inside a job-scoped temporary directory that is removed however the job
//! ends. Stage boundaries, encoder progress and degradations are reported
//! through a [`ProgressSink`]; the typed outcome is returned to the caller.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};
use vreel_media::fs_utils::remove_if_exists;
use vreel_media::{
    composed_resolution, compute_crop_window, AnchorDecision, CodecPort, LayerCompositor,
    MediaError, ReframeEngine, SubjectLocator,
};
use vreel_models::{
    CropWindow, FailureKind, JobEvent, JobId, JobSpec, LayerConfig, MediaAsset, RenderStage,
    SourceSpec,
};

use crate::acquire::{SourceAcquirer, YtDlpAcquirer};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics::{record_job, record_stage};
use crate::progress::ProgressSink;

/// Name of the composited intermediate artifact.
pub fn edited_name(video_id: &str, ext: &str) -> String {
    format!("{}_edited.{}", video_id, ext)
}

/// Name of the final portrait artifact.
pub fn final_name(video_id: &str, ext: &str) -> String {
    format!("{}_9x16.{}", video_id, ext)
}

/// One job to run.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub id: JobId,
    pub spec: JobSpec,
}

impl JobRequest {
    pub fn new(spec: JobSpec) -> Self {
        Self {
            id: JobId::new(),
            spec,
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }
}

/// Outcome of a successful job.
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub job_id: JobId,
    /// Source video id used in artifact names
    pub video_id: String,
    /// Final portrait artifact inside the destination directory
    pub output: MediaAsset,
    /// Copy of the intermediate artifact, when kept
    pub intermediate: Option<PathBuf>,
    pub window: CropWindow,
    pub anchor: AnchorDecision,
    pub warnings: Vec<String>,
}

struct SourceClip {
    video_id: String,
    asset: MediaAsset,
}

struct Composite {
    asset: MediaAsset,
    /// Where the main segment starts inside `asset`, in seconds
    main_start: f64,
}

/// Files this job has placed in the destination directory.
///
/// A path is recorded only once the file at it was written by this job, so a
/// failed job never removes artifacts left by an earlier run.
#[derive(Default)]
struct Delivered {
    intermediate: OnceLock<PathBuf>,
    output: OnceLock<PathBuf>,
}

impl Delivered {
    fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.intermediate.get().into_iter().chain(self.output.get())
    }
}

/// Sequences composition and reframing for one job at a time.
pub struct Pipeline {
    config: WorkerConfig,
    codec: Arc<dyn CodecPort>,
    locator: Arc<dyn SubjectLocator>,
    acquirer: Arc<dyn SourceAcquirer>,
}

impl Pipeline {
    pub fn new(
        config: WorkerConfig,
        codec: Arc<dyn CodecPort>,
        locator: Arc<dyn SubjectLocator>,
    ) -> Self {
        Self {
            config,
            codec,
            locator,
            acquirer: Arc::new(YtDlpAcquirer),
        }
    }

    /// Replace the URL acquirer.
    pub fn with_acquirer(mut self, acquirer: Arc<dyn SourceAcquirer>) -> Self {
        self.acquirer = acquirer;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run `request` to completion on the current task.
    pub async fn run_job(&self, request: JobRequest, sink: ProgressSink) -> WorkerResult<JobOutput> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_job_with_cancel(request, sink, cancel_rx).await
    }

    /// Run `request`, aborting when `cancel` turns true.
    ///
    /// A cancelled job stops at once (a running encoder is killed), reports
    /// `Failed { kind: Cancelled }` and still releases its temporary directory.
    pub async fn run_job_with_cancel(
        &self,
        request: JobRequest,
        sink: ProgressSink,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<JobOutput> {
        let logger = JobLogger::new(&request.id, "reframe_job");
        let span = logger.create_span();
        self.run_inner(request, sink, cancel, logger)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        request: JobRequest,
        sink: ProgressSink,
        mut cancel: watch::Receiver<bool>,
        logger: JobLogger,
    ) -> WorkerResult<JobOutput> {
        let started = Instant::now();
        logger.log_start(&format!(
            "destination {}",
            request.spec.destination_dir.display()
        ));

        let delivered = Delivered::default();
        let result = match self.create_workspace(&request.id).await {
            Ok(workspace) => {
                let timeout_secs = self.config.job_timeout.as_secs();
                let work = self.execute(&request, workspace.path(), &sink, &logger, &delivered);
                let result = tokio::select! {
                    biased;
                    _ = wait_for_cancel(&mut cancel) => Err(WorkerError::Cancelled),
                    r = tokio::time::timeout(self.config.job_timeout, work) => {
                        r.unwrap_or(Err(WorkerError::Timeout(timeout_secs)))
                    }
                };
                release_workspace(workspace, &logger);
                result
            }
            Err(e) => Err(e),
        };

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(output) => {
                sink.emit(JobEvent::Done {
                    output: output.output.path.clone(),
                });
                record_job("done", elapsed);
                logger.log_completion(&format!(
                    "{} in {:.1}s",
                    output.output.path.display(),
                    elapsed
                ));
            }
            Err(e) => {
                for path in delivered.paths() {
                    if let Err(cleanup) = remove_if_exists(path).await {
                        logger.log_warning(&format!(
                            "failed to remove {}: {}",
                            path.display(),
                            cleanup
                        ));
                    }
                }
                let kind = e.kind();
                sink.emit(JobEvent::failed(kind, e.to_string()));
                record_job(kind.as_str(), elapsed);
                logger.log_error(&format!("{} ({})", e, kind));
            }
        }

        result
    }

    async fn execute(
        &self,
        request: &JobRequest,
        workspace: &Path,
        sink: &ProgressSink,
        logger: &JobLogger,
        delivered: &Delivered,
    ) -> WorkerResult<JobOutput> {
        let spec = &request.spec;
        spec.validate().map_err(WorkerError::invalid_job)?;
        let ext = self.config.output_ext.as_str();

        sink.emit(JobEvent::Acquiring);
        let stage_started = Instant::now();
        let source = self.acquire(&spec.source, workspace).await?;
        record_stage("acquire", stage_started.elapsed().as_secs_f64());

        let logger = logger.clone().with_video_id(&source.video_id);
        logger.log_progress(&format!(
            "source {} ({}x{}, {:.2}s, audio: {})",
            source.asset.path.display(),
            source.asset.width,
            source.asset.height,
            source.asset.duration,
            source.asset.has_audio
        ));

        // The composite keeps the source frame size (rounded to even), so a
        // source too narrow for the target aspect is rejected before encoding
        let (width, height) = composed_resolution(&source.asset);
        compute_crop_window(width, height, width / 2, spec.reframe.target_aspect)?;

        tokio::fs::create_dir_all(&spec.destination_dir)
            .await
            .map_err(|e| {
                WorkerError::resource(format!(
                    "cannot create destination {}: {}",
                    spec.destination_dir.display(),
                    e
                ))
            })?;

        sink.emit(JobEvent::Composing);
        let stage_started = Instant::now();
        let edited_path = workspace.join(edited_name(&source.video_id, ext));
        let composite = self.compose(&source, &spec.layers, &edited_path, sink).await?;
        let intermediate = composite.asset;
        record_stage("compose", stage_started.elapsed().as_secs_f64());
        logger.log_progress(&format!(
            "composed {} ({:.2}s, main at {:.2}s)",
            edited_path.display(),
            intermediate.duration,
            composite.main_start
        ));

        let kept_intermediate = if self.config.keep_intermediate {
            let dest = spec.destination_dir.join(edited_name(&source.video_id, ext));
            match tokio::fs::copy(&edited_path, &dest).await {
                Ok(_) => {
                    let _ = delivered.intermediate.set(dest.clone());
                    Some(dest)
                }
                Err(e) => {
                    logger.log_warning(&format!(
                        "could not keep intermediate at {}: {}",
                        dest.display(),
                        e
                    ));
                    None
                }
            }
        } else {
            None
        };

        sink.emit(JobEvent::Reframing);
        let stage_started = Instant::now();
        let engine = ReframeEngine::new(Arc::clone(&self.codec), Arc::clone(&self.locator));
        engine.ensure_reachable(&intermediate, &spec.reframe)?;

        let anchor = engine
            .choose_anchor_at(&intermediate, &spec.reframe, composite.main_start)
            .await;
        let mut warnings = Vec::new();
        if let Some(reason) = &anchor.degradation {
            logger.log_warning(reason);
            sink.emit(JobEvent::warning(reason.clone()));
            warnings.push(reason.clone());
        }

        let final_path = spec.destination_dir.join(final_name(&source.video_id, ext));
        let window = engine
            .render_crop(
                &intermediate,
                &spec.reframe,
                &anchor,
                &final_path,
                &self.config.encoding,
                sink.render_progress(RenderStage::Reframe, intermediate.duration),
            )
            .await?;
        let _ = delivered.output.set(final_path.clone());
        let output = engine.probe_output(&final_path).await?;
        record_stage("reframe", stage_started.elapsed().as_secs_f64());

        Ok(JobOutput {
            job_id: request.id.clone(),
            video_id: source.video_id,
            output,
            intermediate: kept_intermediate,
            window,
            anchor,
            warnings,
        })
    }

    async fn acquire(&self, source: &SourceSpec, workspace: &Path) -> WorkerResult<SourceClip> {
        let (video_id, path) = match source {
            SourceSpec::Local { path, id } => {
                let video_id = match id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                    Some(id) => id.to_string(),
                    None => path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| {
                            MediaError::acquisition(format!(
                                "cannot derive video id from {}",
                                path.display()
                            ))
                        })?,
                };
                (video_id, path.clone())
            }
            SourceSpec::Url { url } => {
                let acquired = self
                    .acquirer
                    .acquire(url, workspace)
                    .await
                    .map_err(as_acquisition)?;
                (acquired.id, acquired.path)
            }
        };

        let asset = self.codec.probe(&path).await.map_err(as_acquisition)?;
        Ok(SourceClip { video_id, asset })
    }

    async fn compose(
        &self,
        source: &SourceClip,
        layers: &LayerConfig,
        output: &Path,
        sink: &ProgressSink,
    ) -> WorkerResult<Composite> {
        let mut compositor = LayerCompositor::new(Arc::clone(&self.codec))
            .with_resolution_policy(layers.resolution_policy);

        let stack = compositor
            .build_timeline(
                layers.intro.as_deref(),
                &source.asset.path,
                layers.outro.as_deref(),
            )
            .await?;
        let total = stack.total_duration();
        let main_start = stack.main_start();

        compositor.add_overlay(layers.watermark.as_ref())?;

        let caption = layers.caption.clone().map(|mut caption| {
            if caption.font_file.is_none() {
                caption.font_file = self.config.font_file.clone();
            }
            caption
        });
        compositor.add_caption(caption.as_ref())?;
        compositor.mix_audio(layers.music.as_ref(), layers.original_gain)?;

        let progress = sink.render_progress(RenderStage::Compose, total);
        let asset = compositor
            .render(output, &self.config.encoding, progress)
            .await?;
        Ok(Composite { asset, main_start })
    }

    async fn create_workspace(&self, job_id: &JobId) -> WorkerResult<TempDir> {
        let root = &self.config.work_dir;
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            WorkerError::resource(format!("cannot create work dir {}: {}", root.display(), e))
        })?;

        let workspace = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job_id))
            .tempdir_in(root)
            .map_err(|e| {
                WorkerError::resource(format!(
                    "cannot create job directory in {}: {}",
                    root.display(),
                    e
                ))
            })?;
        debug!(path = %workspace.path().display(), "Created job workspace");
        Ok(workspace)
    }
}

/// Acquisition failures keep their category; anything else becomes one.
fn as_acquisition(e: MediaError) -> MediaError {
    match e.kind() {
        FailureKind::Acquisition
        | FailureKind::Resource
        | FailureKind::Cancelled
        | FailureKind::Timeout => e,
        _ => MediaError::acquisition(e.to_string()),
    }
}

/// Remove the job directory. Failures are logged, never fatal.
fn release_workspace(workspace: TempDir, logger: &JobLogger) {
    let path = workspace.path().to_path_buf();
    match workspace.close() {
        Ok(()) => debug!(path = %path.display(), "Removed job workspace"),
        Err(e) => logger.log_warning(&format!(
            "failed to remove temporary directory {}: {}",
            path.display(),
            e
        )),
    }
}

/// Resolves once the flag is set; never resolves if the sender is gone.
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Handle to a job running on its own task.
pub struct JobHandle {
    job_id: JobId,
    cancel: watch::Sender<bool>,
    task: JoinHandle<WorkerResult<JobOutput>>,
}

impl JobHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Ask the job to stop. Has no effect once it has finished.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the job's outcome.
    pub async fn wait(self) -> WorkerResult<JobOutput> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(WorkerError::Cancelled),
            Err(e) => Err(WorkerError::resource(format!("job task failed: {}", e))),
        }
    }
}

/// Run `request` on a dedicated task.
///
/// Returns the handle and the job's event stream; the stream ends after the
/// terminal `Done` or `Failed` event.
pub fn spawn_job(
    pipeline: Arc<Pipeline>,
    request: JobRequest,
) -> (JobHandle, mpsc::UnboundedReceiver<JobEvent>) {
    let (sink, events) = ProgressSink::channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let job_id = request.id.clone();

    let task = tokio::spawn(async move {
        pipeline
            .run_job_with_cancel(request, sink, cancel_rx)
            .await
    });

    (
        JobHandle {
            job_id,
            cancel: cancel_tx,
            task,
        },
        events,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        assert_eq!(edited_name("abc123", "mp4"), "abc123_edited.mp4");
        assert_eq!(final_name("abc123", "mp4"), "abc123_9x16.mp4");
    }

    #[test]
    fn test_as_acquisition_reclassifies() {
        let err = as_acquisition(MediaError::composition("bad header"));
        assert_eq!(err.kind(), FailureKind::Acquisition);

        let err = as_acquisition(MediaError::Cancelled);
        assert_eq!(err.kind(), FailureKind::Cancelled);
    }

    #[tokio::test]
    async fn test_wait_for_cancel() {
        let (tx, mut rx) = watch::channel(false);
        tx.send_replace(true);
        wait_for_cancel(&mut rx).await;
    }
}
