//! Host CPU and memory sampling

use std::sync::Mutex;
use sysinfo::System;

use crate::types::{CpuMetrics, MemoryMetrics};

/// Source of host-level metrics
pub trait SystemSampler: Send + Sync {
    fn cpu(&self) -> CpuMetrics;
    fn memory(&self) -> MemoryMetrics;
}

/// Samples the local host through `sysinfo`
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler for SysinfoSampler {
    fn cpu(&self) -> CpuMetrics {
        let mut sys = self.system.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_cpu_usage();
        let load = System::load_average();
        CpuMetrics {
            usage_pct: f64::from(sys.global_cpu_usage()),
            load: [load.one, load.five, load.fifteen],
        }
    }

    fn memory(&self) -> MemoryMetrics {
        let mut sys = self.system.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_memory();
        let total = sys.total_memory();
        let used = sys.used_memory();
        MemoryMetrics {
            total_bytes: total,
            used_bytes: used,
            free_bytes: sys.free_memory(),
            percentage: if total > 0 {
                used as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}
