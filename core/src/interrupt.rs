//! Process-wide interrupt token

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable flag shared between the signal handler and the orchestrator
///
/// Once triggered it stays triggered for the rest of the process.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// Create an untriggered token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the current batch to stop
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether an interrupt was requested
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Trigger this token on Ctrl-C
    ///
    /// Must be called from within a tokio runtime.
    pub fn listen_for_ctrl_c(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl-C, stopping after the current query");
                    interrupt.trigger();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                }
            }
        });
    }
}
