//! Per-canvas mutual exclusion.
//!
//! A Job holds its canvas's guard from the first canvas read until after the
//! merged save, so two Jobs on one canvas run strictly one after the other
//! while Jobs on different canvases never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use layersplit_core::types::CanvasId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of canvas locks, created on first use.
#[derive(Default)]
pub struct CanvasLockManager {
    locks: Mutex<HashMap<CanvasId, Arc<Mutex<()>>>>,
}

/// Exclusive hold on one canvas. Released on drop.
pub struct CanvasGuard {
    canvas_id: CanvasId,
    _guard: OwnedMutexGuard<()>,
}

impl CanvasGuard {
    pub fn canvas_id(&self) -> &str {
        &self.canvas_id
    }
}

impl CanvasLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `canvas_id`.
    pub async fn acquire(&self, canvas_id: &str) -> CanvasGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            prune_idle(&mut locks);
            Arc::clone(
                locks
                    .entry(canvas_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        let guard = lock.lock_owned().await;
        tracing::debug!(canvas_id, "Canvas lock acquired");
        CanvasGuard {
            canvas_id: canvas_id.to_string(),
            _guard: guard,
        }
    }

    /// Drop entries that no Job holds or waits on. Returns how many remain.
    pub async fn prune(&self) -> usize {
        let mut locks = self.locks.lock().await;
        prune_idle(&mut locks);
        locks.len()
    }

    /// Number of canvases currently in the table.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}

/// An entry only referenced by the table itself is idle: holders and
/// waiters each keep a clone of the `Arc` until they are done.
fn prune_idle(locks: &mut HashMap<CanvasId, Arc<Mutex<()>>>) {
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
}
