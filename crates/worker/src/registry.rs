//! The Job table: id -> [`Job`], guarded by one coarse `RwLock`.
//!
//! Submissions and cancellations write, workers write progress and terminal
//! states, and lookups read. Callers only ever get [`JobView`] snapshots out.

use std::collections::HashMap;
use std::sync::Arc;

use layersplit_core::job::{Job, JobView};
use layersplit_core::types::JobId;
use tokio::sync::RwLock;

/// Shared handle to the Job table. Cloning is cheap.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: Job) -> JobView {
        let view = job.view();
        self.jobs.write().await.insert(job.id.clone(), job);
        view
    }

    pub async fn get(&self, job_id: &str) -> Option<JobView> {
        self.jobs.read().await.get(job_id).map(Job::view)
    }

    /// Run `f` against the Job under the write lock. `None` if unknown.
    pub async fn update<R>(&self, job_id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.jobs.write().await.get_mut(job_id).map(f)
    }

    /// All Jobs, optionally only those targeting `canvas_id`, oldest first.
    pub async fn list(&self, canvas_id: Option<&str>) -> Vec<JobView> {
        let jobs = self.jobs.read().await;
        let mut views: Vec<JobView> = jobs
            .values()
            .filter(|job| canvas_id.is_none_or(|c| job.canvas_id == c))
            .map(Job::view)
            .collect();
        views.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.job_id.cmp(&b.job_id)));
        views
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layersplit_core::descriptor::{ImageDescriptor, ImageSource};
    use layersplit_core::job::{JobKind, JobStatus};

    fn job(canvas: &str) -> Job {
        let image = ImageDescriptor::new(
            ImageSource::RemoteRef {
                locator: "im_1.png".into(),
            },
            0.0,
            0.0,
            0.0,
            0.0,
        );
        Job::new(JobKind::SplitLayers, canvas, vec![image])
    }

    #[tokio::test]
    async fn insert_get_update_list() {
        let registry = JobRegistry::new();
        let a = registry.insert(job("c1")).await;
        registry.insert(job("c2")).await;
        registry.insert(job("c1")).await;

        assert_eq!(registry.len().await, 3);
        assert_eq!(registry.get(&a.job_id).await.unwrap().status, JobStatus::Pending);
        assert!(registry.get("missing").await.is_none());

        let cancelled = registry.update(&a.job_id, Job::cancel).await;
        assert_eq!(cancelled, Some(true));
        assert_eq!(registry.get(&a.job_id).await.unwrap().status, JobStatus::Cancelled);

        assert_eq!(registry.list(Some("c1")).await.len(), 2);
        assert_eq!(registry.list(None).await.len(), 3);
        assert!(registry.list(Some("nope")).await.is_empty());
    }
}
