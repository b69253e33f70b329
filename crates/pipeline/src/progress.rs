//! Stage notifications from the pipeline to whoever tracks Job progress.

use async_trait::async_trait;

/// The four progress-bearing stages of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolve,
    Analyze,
    Matte,
    Visualize,
}

impl Stage {
    /// 1-based position of the stage within an image's block of steps.
    pub fn offset(&self) -> u32 {
        match self {
            Stage::Resolve => 1,
            Stage::Analyze => 2,
            Stage::Matte => 3,
            Stage::Visualize => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Analyze => "analyze",
            Stage::Matte => "matte",
            Stage::Visualize => "visualize",
        }
    }
}

/// Receives a call as each stage of an image begins.
#[async_trait]
pub trait StageObserver: Send + Sync {
    async fn stage_started(&self, image_index: usize, stage: Stage);
}

/// Observer that ignores everything, for tests and one-off runs.
pub struct NoopObserver;

#[async_trait]
impl StageObserver for NoopObserver {
    async fn stage_started(&self, _image_index: usize, _stage: Stage) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_ordered_and_distinct() {
        let stages = [Stage::Resolve, Stage::Analyze, Stage::Matte, Stage::Visualize];
        let offsets: Vec<u32> = stages.iter().map(Stage::offset).collect();
        assert_eq!(offsets, vec![1, 2, 3, 4]);
    }
}
