use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::scheduler::BackgroundTask;

use super::merge;
use super::store::Shared;

/// Periodic merge of non-active segments.
pub(crate) struct MergeTask {
    shared: Arc<Shared>,
}

impl MergeTask {
    pub fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

#[async_trait::async_trait]
impl BackgroundTask for MergeTask {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn interval(&self) -> Duration {
        self.shared.config.merge_interval
    }

    async fn execute(&self) -> Result<()> {
        merge::merge(&self.shared)
    }
}
