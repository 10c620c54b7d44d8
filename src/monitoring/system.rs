use std::sync::Mutex;

use serde::Serialize;
use sysinfo::System;

/// Usage above this percentage marks the service degraded.
pub const HIGH_USAGE_PERCENT: f32 = 90.0;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_available_gb: f64,
}

impl SystemMetrics {
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.cpu_percent > HIGH_USAGE_PERCENT {
            warnings.push("High CPU usage".to_string());
        }
        if self.memory_percent > HIGH_USAGE_PERCENT {
            warnings.push("High memory usage".to_string());
        }
        warnings
    }
}

/// Host CPU and memory sampler.
///
/// CPU usage is measured between consecutive samples, so the first reading
/// after startup covers the time since the sampler was created.
pub struct SystemSampler {
    system: Mutex<System>,
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
        }
    }

    pub fn sample(&self) -> SystemMetrics {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        system.refresh_cpu();
        system.refresh_memory();

        let total = system.total_memory();
        let available = system.available_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            (total.saturating_sub(available) as f64 / total as f64 * 100.0) as f32
        };

        SystemMetrics {
            cpu_percent: system.global_cpu_info().cpu_usage(),
            memory_percent,
            memory_available_gb: available as f64 / BYTES_PER_GB,
        }
    }
}
