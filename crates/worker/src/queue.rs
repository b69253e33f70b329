//! Job queue and fixed-size worker pool.
//!
//! Submissions land in the registry as `Pending` and their ids go onto an
//! unbounded FIFO channel. Each worker task pulls the next id (the receiver
//! is shared behind a mutex), claims the Job and runs it through the
//! [`JobExecutor`]. Shutdown pushes one stop sentinel per worker and waits
//! for every worker to finish its current Job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use layersplit_core::descriptor::{validate_submission, ImageDescriptor};
use layersplit_core::job::{Job, JobKind, JobStatus, JobView};
use layersplit_core::types::JobId;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::QueueError;
use crate::executor::{ClaimedJob, JobExecutor};
use crate::registry::JobRegistry;

enum QueueMessage {
    Run(JobId),
    Stop,
}

/// State shared between the queue handle and its workers.
struct Shared {
    registry: JobRegistry,
    executor: Arc<JobExecutor>,
    receiver: Mutex<mpsc::UnboundedReceiver<QueueMessage>>,
    /// Set once shutdown begins. Jobs dequeued afterwards are cancelled.
    draining: AtomicBool,
}

pub struct JobQueue {
    shared: Arc<Shared>,
    sender: mpsc::UnboundedSender<QueueMessage>,
    pool_size: usize,
    /// Held across the accept check and the send, so no submission can
    /// slip in behind the drain in `shutdown`.
    accepting: Mutex<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    /// Create the queue and spawn `pool_size` workers (at least one).
    pub fn start(executor: Arc<JobExecutor>, pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            registry: JobRegistry::new(),
            executor,
            receiver: Mutex::new(receiver),
            draining: AtomicBool::new(false),
        });

        let workers = (0..pool_size)
            .map(|worker| tokio::spawn(worker_loop(worker, Arc::clone(&shared))))
            .collect();
        tracing::info!(pool_size, "Job queue started");

        Self {
            shared,
            sender,
            pool_size,
            accepting: Mutex::new(true),
            workers: Mutex::new(workers),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.shared.registry
    }

    /// Submit a split-layers Job. Returns as soon as the Job is queued.
    pub async fn submit_job(
        &self,
        canvas_id: &str,
        images: Vec<ImageDescriptor>,
    ) -> Result<JobId, QueueError> {
        self.submit(JobKind::SplitLayers, canvas_id, images).await
    }

    pub async fn submit(
        &self,
        kind: JobKind,
        canvas_id: &str,
        images: Vec<ImageDescriptor>,
    ) -> Result<JobId, QueueError> {
        let accepting = self.accepting.lock().await;
        if !*accepting {
            return Err(QueueError::ShuttingDown);
        }
        // Individual descriptors are checked per image by the pipeline, so
        // one bad image fails only itself.
        validate_submission(canvas_id, &images).map_err(|e| QueueError::Validation(e.to_string()))?;

        let job = Job::new(kind, canvas_id, images);
        let job_id = job.id.clone();
        let view = self.shared.registry.insert(job).await;

        self.sender
            .send(QueueMessage::Run(job_id.clone()))
            .map_err(|_| QueueError::ShuttingDown)?;
        drop(accepting);

        tracing::info!(
            job_id = %job_id,
            canvas_id,
            images = view.image_count,
            task_type = kind.as_str(),
            "Job submitted"
        );
        Ok(job_id)
    }

    pub async fn get_job(&self, job_id: &str) -> Option<JobView> {
        self.shared.registry.get(job_id).await
    }

    /// Request cancellation. False for unknown or already finished Jobs.
    pub async fn cancel_job(&self, job_id: &str) -> bool {
        let accepted = self
            .shared
            .registry
            .update(job_id, Job::cancel)
            .await
            .unwrap_or(false);
        tracing::info!(job_id, accepted, "Cancel requested");
        accepted
    }

    pub async fn list_jobs(&self, canvas_id: Option<&str>) -> Vec<JobView> {
        self.shared.registry.list(canvas_id).await
    }

    /// Stop accepting work, let every worker finish its current Job, and
    /// cancel whatever is still queued.
    pub async fn shutdown(&self) {
        {
            let mut accepting = self.accepting.lock().await;
            if !*accepting {
                return;
            }
            *accepting = false;
        }
        tracing::info!("Job queue shutting down");
        self.shared.draining.store(true, Ordering::SeqCst);

        for _ in 0..self.pool_size {
            let _ = self.sender.send(QueueMessage::Stop);
        }

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for (worker, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                tracing::error!(worker, error = %e, "Worker task ended abnormally");
            }
        }

        // Submissions that raced with shutdown can sit behind the sentinels.
        let mut receiver = self.shared.receiver.lock().await;
        while let Ok(message) = receiver.try_recv() {
            if let QueueMessage::Run(job_id) = message {
                cancel_queued(&self.shared.registry, &job_id).await;
            }
        }
        tracing::info!("Job queue shut down");
    }
}

async fn worker_loop(worker: usize, shared: Arc<Shared>) {
    tracing::info!(worker, "Worker started");
    loop {
        let message = shared.receiver.lock().await.recv().await;
        let job_id = match message {
            Some(QueueMessage::Run(job_id)) => job_id,
            Some(QueueMessage::Stop) | None => break,
        };

        if shared.draining.load(Ordering::SeqCst) {
            cancel_queued(&shared.registry, &job_id).await;
            continue;
        }

        let Some(claimed) = claim(&shared.registry, &job_id).await else {
            tracing::debug!(worker, job_id = %job_id, "Skipping job that is no longer pending");
            continue;
        };

        tracing::info!(
            worker,
            job_id = %claimed.job_id,
            canvas_id = %claimed.canvas_id,
            "Job claimed"
        );
        Arc::clone(&shared.executor)
            .run(claimed, shared.registry.clone())
            .await;
    }
    tracing::info!(worker, "Worker stopped");
}

/// Move a pending Job to `Running` and hand back what the executor needs.
/// `None` when the Job is unknown or no longer pending (cancelled).
async fn claim(registry: &JobRegistry, job_id: &str) -> Option<ClaimedJob> {
    registry
        .update(job_id, |job| {
            if job.status() != JobStatus::Pending {
                return None;
            }
            job.start().ok()?;
            Some(ClaimedJob {
                job_id: job.id.clone(),
                canvas_id: job.canvas_id.clone(),
                kind: job.kind,
                payload: job.payload.clone(),
            })
        })
        .await
        .flatten()
}

async fn cancel_queued(registry: &JobRegistry, job_id: &str) {
    if registry.update(job_id, Job::cancel).await.unwrap_or(false) {
        tracing::info!(job_id, "Queued job cancelled by shutdown");
    }
}
