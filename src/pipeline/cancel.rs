use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};

/// A cloneable cancellation flag.
///
/// The driver only looks at it between chunks, so a cancelled run stops after the chunk it is
/// currently processing.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub(crate) fn check(&self, chunks_done: usize) -> PipelineResult<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled { chunks_done });
        }
        Ok(())
    }
}
