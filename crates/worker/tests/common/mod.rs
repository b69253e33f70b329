//! Shared fixtures for worker integration tests.
//!
//! The analyzer mock picks its behaviour from the source file name:
//! `fail*` errors, `empty*` finds nothing, `slow*` takes a while, anything
//! else yields two layers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use layersplit_core::canvas::CanvasDocument;
use layersplit_core::descriptor::{ImageDescriptor, ImageSource};
use layersplit_core::job::JobView;
use layersplit_core::layers::LayerSpec;
use layersplit_core::providers::{
    Analyzer, AnalyzerError, CanvasStore, ExtractError, MattingProvider, ProviderError, StoreError,
};
use layersplit_events::{Notifier, NotifyError};
use layersplit_pipeline::{LayerPipeline, PipelineConfig};
use layersplit_worker::{JobExecutor, JobQueue, LocalBlobStore};
use serde_json::{json, Value};

pub const CANVAS: &str = "canvas-1";

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

pub struct MockAnalyzer {
    pub slow: Duration,
}

impl Default for MockAnalyzer {
    fn default() -> Self {
        Self {
            slow: Duration::from_millis(300),
        }
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, image: &Path) -> Result<Value, AnalyzerError> {
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if name.starts_with("fail") {
            return Err(AnalyzerError::Request("vision service unavailable".into()));
        }
        if name.starts_with("empty") {
            return Ok(json!({ "layers": [] }));
        }
        if name.starts_with("slow") {
            tokio::time::sleep(self.slow).await;
        }
        Ok(json!({ "layers": [
            {"content": "logo", "position": {"x1": 0.2, "y1": 0.2, "x2": 0.4, "y2": 0.6}},
            {"content": "title", "position": {"x1": 0.5, "y1": 0.0, "x2": 1.0, "y2": 0.5}}
        ]}))
    }

    fn extract_layers(&self, response: &Value) -> Result<Vec<LayerSpec>, ExtractError> {
        serde_json::from_value(response["layers"].clone()).map_err(|e| ExtractError {
            error: e.to_string(),
            raw_response: response.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Matting
// ---------------------------------------------------------------------------

/// "Mattes" by copying the crop. Tracks peak concurrency.
#[derive(Default)]
pub struct MockMatting {
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

#[async_trait]
impl MattingProvider for MockMatting {
    async fn upload(&self, local_path: &Path) -> Result<String, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(local_path.display().to_string())
    }

    async fn run_matte(&self, url: &str) -> Result<Value, ProviderError> {
        Ok(json!({ "output": url }))
    }

    fn parse_output(&self, result: &Value) -> Option<String> {
        result["output"].as_str().map(str::to_string)
    }

    async fn download(
        &self,
        output_url: &str,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf, ProviderError> {
        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(format!("{file_stem}_cutout.png"));
        tokio::fs::copy(output_url, &dest).await?;
        Ok(dest)
    }
}

// ---------------------------------------------------------------------------
// Canvas store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCanvasStore {
    docs: Mutex<HashMap<String, CanvasDocument>>,
    pub saves: AtomicUsize,
    /// Every `get` and `save`, in call order.
    pub calls: Mutex<Vec<&'static str>>,
    pub fail_saves: AtomicBool,
    pub panic_on_get: AtomicBool,
}

impl MemoryCanvasStore {
    pub fn with_canvas(canvas_id: &str, doc: CanvasDocument) -> Self {
        let store = Self::default();
        store.with_document(canvas_id, doc)
    }

    pub fn with_document(self, canvas_id: &str, doc: CanvasDocument) -> Self {
        self.docs.lock().unwrap().insert(canvas_id.to_string(), doc);
        self
    }

    pub fn document(&self, canvas_id: &str) -> Option<CanvasDocument> {
        self.docs.lock().unwrap().get(canvas_id).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn call_log(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CanvasStore for MemoryCanvasStore {
    async fn get(&self, canvas_id: &str) -> Result<Option<CanvasDocument>, StoreError> {
        if self.panic_on_get.load(Ordering::SeqCst) {
            panic!("canvas store exploded");
        }
        self.calls.lock().unwrap().push("get");
        Ok(self.document(canvas_id))
    }

    async fn save(&self, canvas_id: &str, document: &CanvasDocument) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.calls.lock().unwrap().push("save");
        // Widen the window in which a concurrent writer could interleave.
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.docs
            .lock()
            .unwrap()
            .insert(canvas_id.to_string(), document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A canvas holding the source image element at (0, 0, 100, 50).
pub fn canvas_with_source() -> CanvasDocument {
    serde_json::from_value(json!({
        "elements": [
            {"type": "image", "id": "src", "x": 0, "y": 0, "width": 100, "height": 50,
             "isDeleted": false, "fileId": "src"}
        ],
        "files": {
            "src": {"mimeType": "image/png", "id": "src", "dataURL": "/api/file/src.png", "created": 0}
        }
    }))
    .unwrap()
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Records every event together with the canvas save count at emit time.
pub struct RecordingNotifier {
    store: Arc<MemoryCanvasStore>,
    pub events: Mutex<Vec<(String, Value, usize)>>,
}

impl RecordingNotifier {
    pub fn new(store: Arc<MemoryCanvasStore>) -> Self {
        Self {
            store,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Payloads of `event_name` whose `type` is `msg_type`.
    pub fn of_type(&self, event_name: &str, msg_type: &str) -> Vec<(Value, usize)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, payload, _)| name == event_name && payload["type"] == msg_type)
            .map(|(_, payload, saves)| (payload.clone(), *saves))
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn emit(&self, event_name: &str, payload: Value) -> Result<(), NotifyError> {
        let saves = self.store.save_count();
        self.events
            .lock()
            .unwrap()
            .push((event_name.to_string(), payload, saves));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<MemoryCanvasStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub matting: Arc<MockMatting>,
    pub queue: JobQueue,
}

impl Harness {
    pub fn new(workers: usize) -> Self {
        Self::with_store(workers, MemoryCanvasStore::with_canvas(CANVAS, canvas_with_source()))
    }

    pub fn with_store(workers: usize, store: MemoryCanvasStore) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store);
        let notifier = Arc::new(RecordingNotifier::new(Arc::clone(&store)));
        let matting = Arc::new(MockMatting::default());

        let pipeline = Arc::new(LayerPipeline::new(
            Arc::new(MockAnalyzer::default()),
            matting.clone(),
            Arc::new(LocalBlobStore::new(dir.path().join("files"))),
            PipelineConfig {
                files_dir: dir.path().join("files"),
                ..PipelineConfig::default()
            },
        ));
        let executor = Arc::new(JobExecutor::new(
            pipeline,
            store.clone(),
            notifier.clone(),
            dir.path().join("work"),
        ));
        let queue = JobQueue::start(executor, workers);

        Self {
            dir,
            store,
            notifier,
            matting,
            queue,
        }
    }

    /// Write a 100x50 PNG named `name` and describe it at (0, 0, 100, 50).
    pub fn image(&self, name: &str) -> ImageDescriptor {
        let path = self.dir.path().join("inputs").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbaImage::from_pixel(100, 50, Rgba([200, 200, 200, 255]))
            .save(&path)
            .unwrap();
        ImageDescriptor::new(ImageSource::LocalPath { path }, 0.0, 0.0, 100.0, 50.0)
    }

    pub fn element_count(&self, canvas_id: &str) -> usize {
        self.store
            .document(canvas_id)
            .map(|d| d.elements.len())
            .unwrap_or(0)
    }
}

/// Poll until `job_id` reaches a terminal state.
pub async fn wait_terminal(queue: &JobQueue, job_id: &str) -> JobView {
    wait_for(queue, job_id, |v| v.status.is_terminal()).await
}

/// Poll until `pred` holds for the Job, panicking after ten seconds.
pub async fn wait_for(queue: &JobQueue, job_id: &str, pred: impl Fn(&JobView) -> bool) -> JobView {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let view = queue.get_job(job_id).await.expect("job exists");
        if pred(&view) {
            return view;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting on job {job_id}, last status {}",
            view.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
