//! `layersplit-worker <canvas_id> <images.json>`
//!
//! Runs one split-layers Job against a file-backed canvas and prints the
//! final Job snapshot as JSON.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use layersplit_core::descriptor::ImageDescriptor;
use layersplit_core::job::JobView;
use layersplit_events::{BusNotifier, EventBus, FanoutNotifier, NotificationEvent, Notifier, NotifyError, WebhookNotifier};
use layersplit_matting::{HttpMattingProvider, MattingApi};
use layersplit_pipeline::LayerPipeline;
use layersplit_vision::{VisionAnalyzer, VisionClient};
use layersplit_worker::{
    ConfigError, FileCanvasStore, JobExecutor, JobQueue, LocalBlobStore, QueueError, WorkerConfig,
};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the CLI polls the Job while waiting for it to finish.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("usage: layersplit-worker <canvas_id> <images.json>")]
    Usage,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot read image list {path}: {reason}")]
    Input { path: String, reason: String },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("Cannot print job: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Worker exited with an error");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "layersplit_worker=debug,layersplit_pipeline=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn run() -> Result<(), CliError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [canvas_id, images_path] = args.as_slice() else {
        return Err(CliError::Usage);
    };

    let config = WorkerConfig::from_env()?;
    let images = read_images(images_path).await?;

    // --- Notifications ---
    let bus = Arc::new(EventBus::default());
    let mut targets: Vec<Arc<dyn Notifier>> = vec![Arc::new(BusNotifier::new(Arc::clone(&bus)))];
    if let Some(url) = &config.webhook_url {
        targets.push(Arc::new(WebhookNotifier::new(url.clone())?));
        tracing::info!(url = %url, "Webhook notifications enabled");
    }
    let notifier = Arc::new(FanoutNotifier::new(targets));
    let logger = tokio::spawn(log_events(bus.subscribe()));

    // --- Collaborators ---
    let analyzer = Arc::new(VisionAnalyzer::new(VisionClient::new(config.vision.clone())));
    let matting = Arc::new(HttpMattingProvider::new(MattingApi::new(config.matting.clone())));
    let blobs = Arc::new(LocalBlobStore::new(config.pipeline.files_dir.clone()));
    let canvases = Arc::new(FileCanvasStore::new(config.canvas_dir.clone()));

    let pipeline = Arc::new(LayerPipeline::new(
        analyzer,
        matting,
        blobs,
        config.pipeline.clone(),
    ));
    let executor = Arc::new(
        JobExecutor::new(pipeline, canvases, notifier, config.work_dir.clone())
            .keep_work_files(config.keep_work_files),
    );
    let queue = JobQueue::start(executor, config.workers);

    let job_id = queue.submit_job(canvas_id, images).await?;

    tokio::select! {
        view = wait_for_terminal(&queue, &job_id) => {
            if let Some(view) = view {
                println!("{}", serde_json::to_string_pretty(&view)?);
            }
        }
        () = shutdown_signal() => {
            tracing::warn!(job_id = %job_id, "Interrupted before the job finished");
        }
    }

    queue.shutdown().await;
    logger.abort();
    Ok(())
}

async fn read_images(path: &str) -> Result<Vec<ImageDescriptor>, CliError> {
    let input_error = |reason: String| CliError::Input {
        path: path.to_string(),
        reason,
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| input_error(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| input_error(e.to_string()))
}

/// Poll until the Job is terminal. `None` if it disappeared.
async fn wait_for_terminal(queue: &JobQueue, job_id: &str) -> Option<JobView> {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        interval.tick().await;
        let view = queue.get_job(job_id).await?;
        if view.status.is_terminal() {
            return Some(view);
        }
    }
}

async fn log_events(mut rx: broadcast::Receiver<NotificationEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                tracing::info!(event = %event.event_name, payload = %event.payload, "Notification");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Resolves on SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
