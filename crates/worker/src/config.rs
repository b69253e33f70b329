use std::path::PathBuf;
use std::str::FromStr;

use layersplit_matting::api::{DEFAULT_API_URL, DEFAULT_WORKFLOW_ID};
use layersplit_matting::MattingConfig;
use layersplit_pipeline::config::{DEFAULT_FILES_DIR, DEFAULT_MAX_MATTE_CONCURRENCY};
use layersplit_pipeline::PipelineConfig;
use layersplit_vision::client::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use layersplit_vision::VisionConfig;

/// Default worker pool size.
pub const DEFAULT_WORKERS: usize = 2;

/// Default root of per-Job scratch directories.
pub const DEFAULT_WORK_DIR: &str = "./temp/canvas_layers";

/// Default directory of the file-backed canvas store.
pub const DEFAULT_CANVAS_DIR: &str = "./user_data/canvases";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Worker configuration loaded from environment variables.
///
/// | Env Var                        | Default                      |
/// |--------------------------------|------------------------------|
/// | `LAYERSPLIT_WORKERS`           | `2`                          |
/// | `LAYERSPLIT_MATTE_CONCURRENCY` | `4`                          |
/// | `LAYERSPLIT_WORK_DIR`          | `./temp/canvas_layers`       |
/// | `LAYERSPLIT_FILES_DIR`         | `./user_data/files`          |
/// | `LAYERSPLIT_CANVAS_DIR`        | `./user_data/canvases`       |
/// | `LAYERSPLIT_KEEP_WORK_FILES`   | `false`                      |
/// | `VISION_API_URL`               | Volcengine Ark v3 endpoint   |
/// | `VISION_API_KEY`               | (required)                   |
/// | `VISION_MODEL`                 | `doubao-1-5-thinking-vision-pro-250428` |
/// | `MATTING_API_URL`              | `https://api.coze.cn/v1`     |
/// | `MATTING_API_TOKEN`            | empty                        |
/// | `MATTING_WORKFLOW_ID`          | `7526719168868237347`        |
/// | `MATTING_UPLOAD_URL`           | `${MATTING_API_URL}/files/upload` |
/// | `NOTIFY_WEBHOOK_URL`           | unset                        |
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub workers: usize,
    pub work_dir: PathBuf,
    pub canvas_dir: PathBuf,
    pub keep_work_files: bool,
    pub pipeline: PipelineConfig,
    pub vision: VisionConfig,
    pub matting: MattingConfig,
    pub webhook_url: Option<String>,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let workers = parse_at_least_one(&var, "LAYERSPLIT_WORKERS", DEFAULT_WORKERS)?;
        let max_matte_concurrency = parse_at_least_one(
            &var,
            "LAYERSPLIT_MATTE_CONCURRENCY",
            DEFAULT_MAX_MATTE_CONCURRENCY,
        )?;
        let keep_work_files = parse_or(&var, "LAYERSPLIT_KEEP_WORK_FILES", false)?;

        let path = |name: &str, default: &str| PathBuf::from(var(name).unwrap_or_else(|| default.into()));

        let pipeline = PipelineConfig {
            max_matte_concurrency,
            files_dir: path("LAYERSPLIT_FILES_DIR", DEFAULT_FILES_DIR),
            ..PipelineConfig::default()
        };

        let vision = VisionConfig {
            base_url: var("VISION_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            api_key: var("VISION_API_KEY").ok_or(ConfigError::Missing("VISION_API_KEY"))?,
            model: var("VISION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            ..VisionConfig::default()
        };

        let matting = MattingConfig {
            api_url: var("MATTING_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into()),
            api_token: var("MATTING_API_TOKEN").unwrap_or_default(),
            workflow_id: var("MATTING_WORKFLOW_ID").unwrap_or_else(|| DEFAULT_WORKFLOW_ID.into()),
            upload_url: var("MATTING_UPLOAD_URL"),
        };
        if matting.api_token.is_empty() {
            tracing::warn!("MATTING_API_TOKEN is not set, matting requests will be rejected");
        }

        Ok(Self {
            workers,
            work_dir: path("LAYERSPLIT_WORK_DIR", DEFAULT_WORK_DIR),
            canvas_dir: path("LAYERSPLIT_CANVAS_DIR", DEFAULT_CANVAS_DIR),
            keep_work_files,
            pipeline,
            vision,
            matting,
            webhook_url: var("NOTIFY_WEBHOOK_URL"),
        })
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_at_least_one(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    let n = parse_or(var, name, default)?;
    if n == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: n.to_string(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(n)
}
