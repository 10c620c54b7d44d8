use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::ErrorCategory;

/// Errors kept for `/health`.
pub const MAX_TRACKED_ERRORS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub category: ErrorCategory,
    pub code: &'static str,
    pub message: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

/// Rolling buffer of the most recent errors.
pub struct ErrorTracker {
    max_entries: usize,
    errors: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorTracker {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            errors: Mutex::new(VecDeque::with_capacity(max_entries)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ErrorRecord>> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, category: ErrorCategory, code: &'static str, message: String) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        let mut errors = self.lock();
        if errors.len() == self.max_entries {
            errors.pop_front();
        }
        errors.push_back(ErrorRecord {
            category,
            code,
            message,
            timestamp,
        });
    }

    /// Up to `limit` most recent errors, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ErrorRecord> {
        let errors = self.lock();
        let skip = errors.len().saturating_sub(limit);
        errors.iter().skip(skip).cloned().collect()
    }

    pub fn counts_by_category(&self) -> BTreeMap<ErrorCategory, u64> {
        let mut counts = BTreeMap::new();
        for err in self.lock().iter() {
            *counts.entry(err.category).or_insert(0) += 1;
        }
        counts
    }
}
