//! The split-layers Job entity and its state machine.
//!
//! A Job is created by the queue on submission and mutated only by the
//! worker executing it (plus the advisory cancel flag). Once it reaches a
//! terminal status it never changes again.

use serde::{Deserialize, Serialize};

use crate::descriptor::ImageDescriptor;
use crate::error::CoreError;
use crate::placement::PlacementStrategy;
use crate::types::{new_job_id, CanvasId, JobId, Timestamp};

/// Progress steps per image: resolve, analyze, matte, visualize.
pub const STEPS_PER_IMAGE: u32 = 4;

/// Steps outside the per-image loop: begin and commit.
pub const FIXED_STEPS: u32 = 2;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Statuses this one may move to.
    ///
    /// - `pending` -> `running`, `cancelled`
    /// - `running` -> `completed`, `failed`, `cancelled`
    /// - terminal statuses -> nothing
    pub fn valid_transitions(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[JobStatus::Running, JobStatus::Cancelled],
            JobStatus::Running => &[
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ],
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate that a status transition from `current` to `next` is allowed.
pub fn validate_transition(current: JobStatus, next: JobStatus) -> Result<(), CoreError> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Cannot transition job from '{current}' to '{next}'. Allowed transitions: {:?}",
            current.valid_transitions()
        )))
    }
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    SplitLayers,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SplitLayers => "split_layers",
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub current_step: u32,
    pub total_steps: u32,
    pub percentage: f64,
    pub message: String,
}

impl JobProgress {
    pub fn new(total_steps: u32) -> Self {
        Self {
            current_step: 0,
            total_steps,
            percentage: 0.0,
            message: String::new(),
        }
    }

    /// `4 * image_count + 2`.
    pub fn total_steps_for(image_count: usize) -> u32 {
        let count = u32::try_from(image_count).unwrap_or(u32::MAX);
        count.saturating_mul(STEPS_PER_IMAGE).saturating_add(FIXED_STEPS)
    }

    fn set(&mut self, step: u32, message: impl Into<String>) {
        self.current_step = step;
        self.message = message.into();
        self.percentage = if self.total_steps > 0 {
            f64::from(step) / f64::from(self.total_steps) * 100.0
        } else {
            0.0
        };
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Summary of one successfully processed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub image_index: usize,
    pub layers_detected: usize,
    /// Elements produced for the canvas, background plate included.
    pub layers_placed: usize,
    /// Layers whose matting failed and that were placed as uncut crops.
    pub matte_failures: usize,
    pub placement: PlacementStrategy,
    /// True when no candidate anchor cleared the existing elements.
    pub fallback_placement: bool,
    pub visualization_file_id: Option<String>,
}

/// Outcome of one image of a Job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageOutcome {
    Success(ImageSummary),
    /// Analysis found nothing to split.
    Skipped { image_index: usize, reason: String },
    Error { image_index: usize, error: String },
}

impl ImageOutcome {
    pub fn image_index(&self) -> usize {
        match self {
            ImageOutcome::Success(s) => s.image_index,
            ImageOutcome::Skipped { image_index, .. } | ImageOutcome::Error { image_index, .. } => {
                *image_index
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ImageOutcome::Error { .. })
    }
}

/// Result of a completed Job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub results: Vec<ImageOutcome>,
    pub layers_added: usize,
    pub total_images_processed: usize,
    pub successful_images: usize,
}

impl JobResult {
    pub fn new(results: Vec<ImageOutcome>, layers_added: usize) -> Self {
        let successful_images = results.iter().filter(|r| !r.is_error()).count();
        Self {
            total_images_processed: results.len(),
            successful_images,
            layers_added,
            results,
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub canvas_id: CanvasId,
    pub payload: Vec<ImageDescriptor>,
    status: JobStatus,
    progress: JobProgress,
    result: Option<JobResult>,
    error: Option<String>,
    cancel_requested: bool,
    pub created_at: Timestamp,
    started_at: Option<Timestamp>,
    completed_at: Option<Timestamp>,
}

impl Job {
    pub fn new(kind: JobKind, canvas_id: impl Into<CanvasId>, payload: Vec<ImageDescriptor>) -> Self {
        let total = JobProgress::total_steps_for(payload.len());
        Self {
            id: new_job_id(),
            kind,
            canvas_id: canvas_id.into(),
            payload,
            status: JobStatus::Pending,
            progress: JobProgress::new(total),
            result: None,
            error: None,
            cancel_requested: false,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> &JobProgress {
        &self.progress
    }

    pub fn result(&self) -> Option<&JobResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<Timestamp> {
        self.completed_at
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        validate_transition(self.status, next)?;
        self.status = next;
        Ok(())
    }

    /// A worker claimed the Job.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// Record progress. Only valid while running, and steps never go back.
    pub fn update_progress(
        &mut self,
        step: u32,
        message: impl Into<String>,
    ) -> Result<&JobProgress, CoreError> {
        if self.status != JobStatus::Running {
            return Err(CoreError::Conflict(format!(
                "Progress updates require a running job (status is '{}')",
                self.status
            )));
        }
        if step < self.progress.current_step || step > self.progress.total_steps {
            return Err(CoreError::Validation(format!(
                "Progress step {step} outside {}..={}",
                self.progress.current_step, self.progress.total_steps
            )));
        }
        self.progress.set(step, message);
        Ok(&self.progress)
    }

    pub fn complete(&mut self, result: JobResult, message: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Completed)?;
        let total = self.progress.total_steps;
        self.progress.set(total, message);
        self.result = Some(result);
        self.completed_at = Some(chrono::Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed)?;
        let error = error.into();
        let total = self.progress.total_steps;
        self.progress.set(total, format!("Failed: {error}"));
        self.error = Some(error);
        self.completed_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// Request cancellation.
    ///
    /// A pending Job becomes `Cancelled` and will be skipped by the worker
    /// that dequeues it. A running Job only gets its advisory flag set; the
    /// worker is not preempted and the Job still finishes normally. Returns
    /// false for terminal Jobs.
    pub fn cancel(&mut self) -> bool {
        match self.status {
            JobStatus::Pending => {
                self.status = JobStatus::Cancelled;
                self.cancel_requested = true;
                self.completed_at = Some(chrono::Utc::now());
                true
            }
            JobStatus::Running => {
                self.cancel_requested = true;
                true
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => false,
        }
    }

    pub fn view(&self) -> JobView {
        JobView {
            job_id: self.id.clone(),
            task_type: self.kind,
            canvas_id: self.canvas_id.clone(),
            status: self.status,
            progress: self.progress.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            cancel_requested: self.cancel_requested,
            image_count: self.payload.len(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Read-only snapshot of a Job handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: JobId,
    pub task_type: JobKind,
    pub canvas_id: CanvasId,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub cancel_requested: bool,
    pub image_count: usize,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
