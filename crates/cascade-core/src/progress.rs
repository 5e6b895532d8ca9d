//! Status output contract for the backfill and refresh drivers (§4.10, §6).
//! The sink is an external collaborator; the cascade only guarantees it
//! receives JSON-serializable records.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub phase: String,
    pub ips_processed: u64,
    pub ips_total: u64,
    pub errors: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Logs each update via `tracing`, matching the teacher's ambient logging
/// density for long-running drivers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn report(&self, update: ProgressUpdate) {
        tracing::info!(
            phase = %update.phase,
            processed = update.ips_processed,
            total = update.ips_total,
            errors = update.errors,
            "progress"
        );
    }
}

/// Accumulates updates in memory; used by driver tests to assert on the
/// sequence of phases reported.
#[derive(Debug, Default)]
pub struct VecProgressSink(std::sync::Mutex<Vec<ProgressUpdate>>);

impl VecProgressSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.0.lock().expect("progress sink mutex poisoned").clone()
    }
}

impl ProgressSink for VecProgressSink {
    fn report(&self, update: ProgressUpdate) {
        self.0.lock().expect("progress sink mutex poisoned").push(update);
    }
}
