//! Runs one claimed Job to a terminal state.
//!
//! Under the canvas lock: load the canvas, run every image through the
//! pipeline (earlier images' elements count as obstacles for later ones),
//! then re-read the canvas and save it once with all new elements appended.
//! Layer and success notifications go out only after that save succeeded.

use std::path::PathBuf;
use std::sync::Arc;

use layersplit_core::canvas::{CanvasDocument, CanvasElement, CanvasFile};
use layersplit_core::descriptor::ImageDescriptor;
use layersplit_core::job::{JobKind, JobResult, JobStatus};
use layersplit_core::job_events::{
    EVENT_CANVAS_NOTIFICATION, EVENT_SESSION_UPDATE, MSG_TYPE_LAYER_ADDED, MSG_TYPE_SPLIT_ERROR,
    MSG_TYPE_SPLIT_SUCCESS,
};
use layersplit_core::layers::PlacedElement;
use layersplit_core::providers::CanvasStore;
use layersplit_core::types::{CanvasId, JobId};
use layersplit_events::Notifier;
use layersplit_pipeline::LayerPipeline;

use crate::error::JobError;
use crate::lock::CanvasLockManager;
use crate::progress::ProgressReporter;
use crate::registry::JobRegistry;

/// The parts of a Job a worker needs once it has claimed it.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job_id: JobId,
    pub canvas_id: CanvasId,
    pub kind: JobKind,
    pub payload: Vec<ImageDescriptor>,
}

/// Collaborators and settings shared by every worker.
pub struct JobExecutor {
    pipeline: Arc<LayerPipeline>,
    canvases: Arc<dyn CanvasStore>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<CanvasLockManager>,
    work_dir: PathBuf,
    keep_work_files: bool,
}

impl JobExecutor {
    pub fn new(
        pipeline: Arc<LayerPipeline>,
        canvases: Arc<dyn CanvasStore>,
        notifier: Arc<dyn Notifier>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline,
            canvases,
            notifier,
            locks: Arc::new(CanvasLockManager::new()),
            work_dir: work_dir.into(),
            keep_work_files: false,
        }
    }

    /// Keep per-Job scratch files instead of deleting them afterwards.
    pub fn keep_work_files(mut self, keep: bool) -> Self {
        self.keep_work_files = keep;
        self
    }

    pub fn locks(&self) -> &Arc<CanvasLockManager> {
        &self.locks
    }

    /// Scratch directory of a Job: `<work_dir>/<canvas_id>/<job_id>`.
    pub fn scratch_dir(&self, job: &ClaimedJob) -> PathBuf {
        self.work_dir.join(&job.canvas_id).join(&job.job_id)
    }

    /// Process `job` and record its terminal state in `registry`.
    ///
    /// The work runs in its own task, so a panic anywhere in it fails the
    /// Job instead of taking the worker down.
    pub async fn run(self: Arc<Self>, job: ClaimedJob, registry: JobRegistry) {
        let reporter = self.reporter(&job, &registry);

        let task = tokio::spawn({
            let this = Arc::clone(&self);
            let job = job.clone();
            let registry = registry.clone();
            async move { this.process(&job, &registry).await }
        });
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(JobError::Panicked(e.to_string())),
        };

        match outcome {
            Ok(result) => {
                let layers_added = result.layers_added;
                let message = format!("Added {layers_added} layers to canvas");
                let recorded = registry
                    .update(&job.job_id, |j| {
                        if j.cancel_requested() {
                            tracing::info!(job_id = %job.job_id, "Cancel requested while running, job finished normally");
                        }
                        j.complete(result, message.clone())
                    })
                    .await;
                self.log_terminal(&job, JobStatus::Completed, recorded);
                reporter.publish_current().await;
                self.notify_success(&job, layers_added, &message).await;
            }
            Err(e) => {
                tracing::error!(job_id = %job.job_id, canvas_id = %job.canvas_id, error = %e, "Job failed");
                let recorded = registry.update(&job.job_id, |j| j.fail(e.to_string())).await;
                self.log_terminal(&job, JobStatus::Failed, recorded);
                reporter.publish_current().await;
                self.notify_error(&job, &e).await;
            }
        }

        self.cleanup(&job).await;
    }

    async fn process(&self, job: &ClaimedJob, registry: &JobRegistry) -> Result<JobResult, JobError> {
        let reporter = self.reporter(job, registry);
        reporter.begin().await;

        let _guard = self.locks.acquire(&job.canvas_id).await;
        let document = self.load_canvas(&job.canvas_id).await?;
        let mut existing = document.image_rects();
        let scratch = self.scratch_dir(job);

        let mut outcomes = Vec::with_capacity(job.payload.len());
        let mut placed: Vec<PlacedElement> = Vec::new();
        for (index, descriptor) in job.payload.iter().enumerate() {
            let run = self
                .pipeline
                .run_image(index, descriptor, &existing, &scratch, &reporter)
                .await;
            existing.extend(run.elements.iter().map(|e| e.geometry));
            placed.extend(run.elements);
            outcomes.push(run.outcome);
        }

        reporter.committing().await;
        let layers_added = self.commit(job, &placed).await?;

        Ok(JobResult::new(outcomes, layers_added))
    }

    async fn load_canvas(&self, canvas_id: &str) -> Result<CanvasDocument, JobError> {
        self.canvases
            .get(canvas_id)
            .await?
            .ok_or_else(|| JobError::CanvasNotFound(canvas_id.to_string()))
    }

    /// Append `placed` to a fresh read of the canvas and save it. Returns the
    /// number of elements added.
    async fn commit(&self, job: &ClaimedJob, placed: &[PlacedElement]) -> Result<usize, JobError> {
        if placed.is_empty() {
            tracing::info!(job_id = %job.job_id, "No layers to add, canvas left untouched");
            return Ok(0);
        }

        let entries: Vec<(CanvasElement, CanvasFile)> =
            placed.iter().map(PlacedElement::to_canvas).collect();

        let mut document = self.load_canvas(&job.canvas_id).await?;
        document.append(entries.iter().cloned());
        self.canvases.save(&job.canvas_id, &document).await?;

        tracing::info!(
            job_id = %job.job_id,
            canvas_id = %job.canvas_id,
            added = entries.len(),
            total = document.elements.len(),
            "Canvas updated"
        );

        for ((element, file), p) in entries.iter().zip(placed) {
            self.notify_layer_added(job, element, file, &p.content).await;
        }
        Ok(entries.len())
    }

    async fn cleanup(&self, job: &ClaimedJob) {
        if self.keep_work_files {
            return;
        }
        let dir = self.scratch_dir(job);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!(path = %dir.display(), "Scratch directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %dir.display(), error = %e, "Failed to remove scratch directory"),
        }
    }

    fn reporter(&self, job: &ClaimedJob, registry: &JobRegistry) -> ProgressReporter {
        ProgressReporter::new(
            registry.clone(),
            Arc::clone(&self.notifier),
            job.job_id.clone(),
            job.canvas_id.clone(),
            job.kind,
            job.payload.len(),
        )
    }

    fn log_terminal<E: std::fmt::Display>(
        &self,
        job: &ClaimedJob,
        status: JobStatus,
        recorded: Option<Result<(), E>>,
    ) {
        match recorded {
            Some(Ok(())) => tracing::info!(job_id = %job.job_id, %status, "Job finished"),
            Some(Err(e)) => {
                tracing::error!(job_id = %job.job_id, %status, error = %e, "Could not record job state")
            }
            None => tracing::error!(job_id = %job.job_id, "Job vanished from registry"),
        }
    }

    // ---- notifications ----

    async fn emit(&self, job: &ClaimedJob, event: &str, payload: serde_json::Value) {
        if let Err(e) = self.notifier.emit(event, payload).await {
            tracing::warn!(job_id = %job.job_id, event, error = %e, "Failed to emit notification");
        }
    }

    async fn notify_layer_added(
        &self,
        job: &ClaimedJob,
        element: &CanvasElement,
        file: &CanvasFile,
        content: &str,
    ) {
        let payload = serde_json::json!({
            "session_id": job.canvas_id,
            "canvas_id": job.canvas_id,
            "type": MSG_TYPE_LAYER_ADDED,
            "element": element,
            "file": file,
            "content": content,
        });
        self.emit(job, EVENT_SESSION_UPDATE, payload).await;
    }

    async fn notify_success(&self, job: &ClaimedJob, layers_added: usize, message: &str) {
        let payload = serde_json::json!({
            "type": MSG_TYPE_SPLIT_SUCCESS,
            "canvas_id": job.canvas_id,
            "task_id": job.job_id,
            "layers_added": layers_added,
            "message": message,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        });
        self.emit(job, EVENT_CANVAS_NOTIFICATION, payload).await;
    }

    async fn notify_error(&self, job: &ClaimedJob, error: &JobError) {
        let payload = serde_json::json!({
            "type": MSG_TYPE_SPLIT_ERROR,
            "canvas_id": job.canvas_id,
            "task_id": job.job_id,
            "error": error.to_string(),
            "timestamp": chrono::Utc::now().timestamp_millis(),
        });
        self.emit(job, EVENT_CANVAS_NOTIFICATION, payload).await;
    }
}
