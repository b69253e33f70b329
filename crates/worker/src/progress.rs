//! Job progress: recorded on the Job, then emitted as a `session_update`.
//!
//! Step numbering for a Job of `n` images (`4n + 2` steps in total):
//!
//! - `0`: Job started
//! - `4i + 1 ..= 4i + 4`: image `i` resolve, analyze, matte, visualize
//! - `4n + 1`: committing to the canvas
//! - `4n + 2`: terminal (set by `complete` / `fail`)
//!
//! Steps only move forward. A report that would go backwards is dropped.

use std::sync::Arc;

use async_trait::async_trait;
use layersplit_core::error::CoreError;
use layersplit_core::job::{JobKind, JobProgress, JobStatus, STEPS_PER_IMAGE};
use layersplit_core::job_events::{EVENT_SESSION_UPDATE, MSG_TYPE_TASK_PROGRESS, SESSION_LAYER_SPLIT};
use layersplit_core::types::{CanvasId, JobId};
use layersplit_events::Notifier;
use layersplit_pipeline::{Stage, StageObserver};

use crate::registry::JobRegistry;

/// Reports progress for one Job.
pub struct ProgressReporter {
    registry: JobRegistry,
    notifier: Arc<dyn Notifier>,
    job_id: JobId,
    canvas_id: CanvasId,
    kind: JobKind,
    image_count: usize,
}

impl ProgressReporter {
    pub fn new(
        registry: JobRegistry,
        notifier: Arc<dyn Notifier>,
        job_id: impl Into<JobId>,
        canvas_id: impl Into<CanvasId>,
        kind: JobKind,
        image_count: usize,
    ) -> Self {
        Self {
            registry,
            notifier,
            job_id: job_id.into(),
            canvas_id: canvas_id.into(),
            kind,
            image_count,
        }
    }

    /// Step reported when image `image_index` enters `stage`.
    pub fn stage_step(image_index: usize, stage: Stage) -> u32 {
        let base = u32::try_from(image_index).unwrap_or(u32::MAX / 8) * STEPS_PER_IMAGE;
        base + stage.offset()
    }

    pub async fn begin(&self) {
        self.report(0, "Starting layer split").await;
    }

    pub async fn committing(&self) {
        let step = JobProgress::total_steps_for(self.image_count).saturating_sub(1);
        self.report(step, "Saving layers to canvas").await;
    }

    /// Record `step` on the Job and emit it. Out-of-order steps and emit
    /// failures are logged and dropped.
    pub async fn report(&self, step: u32, message: impl Into<String>) {
        let message = message.into();
        let recorded = self
            .registry
            .update(&self.job_id, |job| {
                let progress = job.update_progress(step, message)?.clone();
                Ok::<_, CoreError>((progress, job.status()))
            })
            .await;

        match recorded {
            Some(Ok((progress, status))) => self.emit(status, &progress).await,
            Some(Err(e)) => {
                tracing::debug!(job_id = %self.job_id, step, error = %e, "Progress update dropped");
            }
            None => {
                tracing::warn!(job_id = %self.job_id, "Progress for unknown job");
            }
        }
    }

    /// Emit the Job's current progress and status, e.g. after it reached a
    /// terminal state.
    pub async fn publish_current(&self) {
        if let Some(view) = self.registry.get(&self.job_id).await {
            self.emit(view.status, &view.progress).await;
        }
    }

    async fn emit(&self, status: JobStatus, progress: &JobProgress) {
        let payload = serde_json::json!({
            "session_id": SESSION_LAYER_SPLIT,
            "canvas_id": self.canvas_id,
            "type": MSG_TYPE_TASK_PROGRESS,
            "task_id": self.job_id,
            "task_type": self.kind,
            "status": status,
            "progress": progress,
        });
        if let Err(e) = self.notifier.emit(EVENT_SESSION_UPDATE, payload).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "Failed to emit progress");
        }
    }
}

#[async_trait]
impl StageObserver for ProgressReporter {
    async fn stage_started(&self, image_index: usize, stage: Stage) {
        let message = format!(
            "Image {}/{}: {}",
            image_index + 1,
            self.image_count,
            stage.as_str()
        );
        self.report(Self::stage_step(image_index, stage), message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layersplit_core::descriptor::{ImageDescriptor, ImageSource};
    use layersplit_core::job::Job;
    use layersplit_events::{BusNotifier, EventBus};

    fn job(images: usize) -> Job {
        let image = ImageDescriptor::new(
            ImageSource::RemoteRef {
                locator: "im_1.png".into(),
            },
            0.0,
            0.0,
            0.0,
            0.0,
        );
        Job::new(JobKind::SplitLayers, "c1", vec![image; images])
    }

    #[test]
    fn stage_steps_follow_image_blocks() {
        assert_eq!(ProgressReporter::stage_step(0, Stage::Resolve), 1);
        assert_eq!(ProgressReporter::stage_step(0, Stage::Visualize), 4);
        assert_eq!(ProgressReporter::stage_step(2, Stage::Matte), 11);
    }

    #[tokio::test]
    async fn reports_are_recorded_emitted_and_monotonic() {
        let registry = JobRegistry::new();
        let mut job = job(2);
        job.start().unwrap();
        let job_id = registry.insert(job).await.job_id;

        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let reporter = ProgressReporter::new(
            registry.clone(),
            Arc::new(BusNotifier::new(Arc::clone(&bus))),
            job_id.clone(),
            "c1",
            JobKind::SplitLayers,
            2,
        );

        reporter.begin().await;
        reporter.stage_started(1, Stage::Analyze).await;
        // Goes backwards: dropped.
        reporter.stage_started(0, Stage::Resolve).await;
        reporter.committing().await;

        let view = registry.get(&job_id).await.unwrap();
        assert_eq!(view.progress.current_step, 9);
        assert_eq!(view.progress.total_steps, 10);

        let mut steps = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.event_name, EVENT_SESSION_UPDATE);
            assert_eq!(event.payload["session_id"], SESSION_LAYER_SPLIT);
            assert_eq!(event.payload["task_id"], job_id.as_str());
            steps.push(event.payload["progress"]["current_step"].as_u64().unwrap());
        }
        assert_eq!(steps, vec![0, 6, 9]);
    }

    #[tokio::test]
    async fn pending_job_ignores_progress() {
        let registry = JobRegistry::new();
        let job_id = registry.insert(job(1)).await.job_id;
        let reporter = ProgressReporter::new(
            registry.clone(),
            Arc::new(BusNotifier::new(Arc::new(EventBus::default()))),
            job_id.clone(),
            "c1",
            JobKind::SplitLayers,
            1,
        );

        reporter.report(3, "too early").await;

        assert_eq!(registry.get(&job_id).await.unwrap().progress.current_step, 0);
    }
}
