//! Cooperative cancellation shared by the download and import loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop request, set from a signal handler.
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

/// Ctrl+C sets `cancel`; a second Ctrl+C exits with status 130.
pub fn install_interrupt_handler(cancel: &CancelFlag) -> Result<(), ctrlc::Error> {
    let cancel = cancel.clone();
    ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        eprintln!("\n🛑 Stopping after the current step (Ctrl+C again to abort)");
        cancel.cancel();
    })
}
