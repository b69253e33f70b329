/// Jobs are identified by an opaque string (a v4 UUID at submission time).
pub type JobId = String;

/// Canvases are identified by the id of the persisted document.
pub type CanvasId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh, unique Job identifier.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}
