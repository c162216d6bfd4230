//! Download progress counters and ETA.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Point-in-time view of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub succeeded: u32,
    pub failed: u32,
    pub total: u32,
    pub eta_secs: Option<u64>,
}

/// Seconds left at the current success rate.
///
/// `None` until both some time has passed and some page succeeded.
pub fn estimate_eta(succeeded: u32, total: u32, elapsed: Duration) -> Option<u64> {
    let elapsed_secs = elapsed.as_secs_f64();
    if elapsed_secs <= 0.0 || succeeded == 0 {
        return None;
    }

    let rate = f64::from(succeeded) / elapsed_secs;
    let remaining = f64::from(total.saturating_sub(succeeded));
    Some((remaining / rate).round() as u64)
}

/// `H:MM:SS` from one hour up, `MM:SS` below.
pub fn format_eta(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Counters shared by the workers of one run.
#[derive(Debug)]
pub(crate) struct ProgressCounter {
    total: u32,
    succeeded: AtomicU32,
    failed: AtomicU32,
}

impl ProgressCounter {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            succeeded: AtomicU32::new(0),
            failed: AtomicU32::new(0),
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Returns the new success count.
    pub fn record_success(&self) -> u32 {
        self.succeeded.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_failure(&self) -> u32 {
        self.failed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn succeeded(&self) -> u32 {
        self.succeeded.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u32 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, elapsed: Duration) -> ProgressSnapshot {
        let succeeded = self.succeeded();
        ProgressSnapshot {
            succeeded,
            failed: self.failed(),
            total: self.total,
            eta_secs: estimate_eta(succeeded, self.total, elapsed),
        }
    }
}
