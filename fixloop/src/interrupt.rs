//! Operator cancellation shared between the Ctrl-C handler and the loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::warn;

/// Cloneable cancellation flag; loops poll it between steps.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Route Ctrl-C to this flag. Can be installed once per process.
    pub fn install_ctrlc_handler(&self) -> Result<()> {
        let flag = Arc::clone(&self.flag);
        ctrlc::set_handler(move || {
            warn!("interrupt received; stopping after the current step");
            flag.store(true, Ordering::SeqCst);
        })
        .context("install Ctrl-C handler")
    }
}
