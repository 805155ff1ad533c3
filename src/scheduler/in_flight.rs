//! Per-module in-flight tracking
//!
//! Scheduled ticks skip a module whose previous check is still running.
//! Manual checks always enter. The total count is the performance monitor's
//! "active connections" figure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone)]
pub struct InFlight {
    running: Arc<Mutex<HashMap<String, usize>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter only when no check for `module` is running.
    pub fn try_enter(&self, module: &str) -> Option<InFlightGuard> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.get(module).copied().unwrap_or(0) > 0 {
            return None;
        }
        running.insert(module.to_string(), 1);
        Some(self.guard(module))
    }

    /// Enter unconditionally.
    pub fn enter(&self, module: &str) -> InFlightGuard {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        *running.entry(module.to_string()).or_insert(0) += 1;
        self.guard(module)
    }

    /// Checks currently running across all modules
    pub fn total(&self) -> usize {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }

    fn guard(&self, module: &str) -> InFlightGuard {
        InFlightGuard {
            running: Arc::clone(&self.running),
            module: module.to_string(),
        }
    }
}

/// Leaves the in-flight set when dropped
#[derive(Debug)]
pub struct InFlightGuard {
    running: Arc<Mutex<HashMap<String, usize>>>,
    module: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = running.get_mut(&self.module) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                running.remove(&self.module);
            }
        }
    }
}
