//! Process-wide state, passed explicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::DriverConfig;

/// Cooperative cancellation flag. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Immutable configuration plus the shutdown signal, built once at startup.
#[derive(Debug)]
pub struct DriverContext {
    pub config: DriverConfig,
    pub shutdown: ShutdownSignal,
}

impl DriverContext {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn stream_address(&self) -> &str {
        &self.config.stream.url
    }

    pub fn frame_id(&self) -> &str {
        &self.config.stream.frame_id
    }
}
