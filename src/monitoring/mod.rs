pub mod errors;
pub mod routes;
pub mod system;

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

pub use errors::{ErrorRecord, ErrorTracker, MAX_TRACKED_ERRORS};
pub use routes::{create_router, MonitoringState};
pub use system::{SystemMetrics, SystemSampler};

use crate::error::{AppError, ErrorCategory};

#[derive(Debug, Default)]
struct Counters {
    requests: u64,
    syntheses: u64,
    errors: u64,
    total_characters: u64,
    total_processing_time: f64,
    total_audio_duration: f64,
    active_connections: u64,
    peak_connections: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub requests_total: u64,
    pub syntheses_total: u64,
    pub errors_total: u64,
    pub total_characters: u64,
    pub total_audio_duration_seconds: f64,
    pub avg_processing_time_seconds: f64,
    pub avg_characters: f64,
    pub avg_audio_duration_seconds: f64,
    pub active_connections: u64,
    pub peak_connections: u64,
}

/// Runtime counters shared by the WebSocket front end and the monitoring
/// server.
pub struct ServiceMonitor {
    started: Instant,
    counters: Mutex<Counters>,
    errors: ErrorTracker,
}

impl Default for ServiceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMonitor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
            errors: ErrorTracker::new(MAX_TRACKED_ERRORS),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut Counters) -> T) -> T {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut counters)
    }

    pub fn record_connection_open(&self) {
        self.with(|c| {
            c.active_connections += 1;
            c.peak_connections = c.peak_connections.max(c.active_connections);
        });
    }

    pub fn record_connection_closed(&self) {
        self.with(|c| c.active_connections = c.active_connections.saturating_sub(1));
    }

    pub fn record_request(&self) {
        self.with(|c| c.requests += 1);
    }

    pub fn record_error(&self, category: ErrorCategory, code: &'static str, message: String) {
        self.with(|c| c.errors += 1);
        self.errors.add(category, code, message);
    }

    pub fn record_failure(&self, err: &AppError) {
        self.record_error(err.category(), err.code(), err.to_string());
    }

    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        self.errors.recent(limit)
    }

    pub fn errors_by_category(&self) -> BTreeMap<ErrorCategory, u64> {
        self.errors.counts_by_category()
    }

    /// Record a finished synthesis attempt, successful or not.
    pub fn record_synthesis(&self, characters: usize, processing_time: f64, audio_duration: f64) {
        self.with(|c| {
            c.syntheses += 1;
            c.total_characters += characters as u64;
            c.total_processing_time += processing_time.max(0.0);
            c.total_audio_duration += audio_duration.max(0.0);
        });
    }

    pub fn uptime(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn error_count(&self) -> u64 {
        self.with(|c| c.errors)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let uptime_seconds = self.uptime();
        self.with(|c| {
            let per_synthesis = |total: f64| {
                if c.syntheses == 0 {
                    0.0
                } else {
                    total / c.syntheses as f64
                }
            };

            MetricsSnapshot {
                uptime_seconds,
                requests_total: c.requests,
                syntheses_total: c.syntheses,
                errors_total: c.errors,
                total_characters: c.total_characters,
                total_audio_duration_seconds: c.total_audio_duration,
                avg_processing_time_seconds: per_synthesis(c.total_processing_time),
                avg_characters: per_synthesis(c.total_characters as f64),
                avg_audio_duration_seconds: per_synthesis(c.total_audio_duration),
                active_connections: c.active_connections,
                peak_connections: c.peak_connections,
            }
        })
    }
}
