pub mod access;
pub mod files;
pub mod monitor;
pub mod orchestrator;
pub mod reconciler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use files::FileIngestion;
pub use orchestrator::{Orchestrator, SyncJob, SyncScope};

/// Cooperative cancellation shared between the ctrl-c handler and a running
/// job. Checked between pages and between channels, never mid-write.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
