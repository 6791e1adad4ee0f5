//! Active-job registry.
//!
//! Prevents two schedulers from processing the same job concurrently and
//! carries the cooperative cancellation flag. The registry hands out an RAII
//! lease: the job stays registered for exactly as long as the lease lives,
//! including on panic or early return.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct GuardState {
    /// job id -> cancellation requested
    active: HashMap<String, bool>,
}

/// Shared registry of jobs currently being processed.
#[derive(Debug, Clone, Default)]
pub struct JobGuard {
    state: Arc<Mutex<GuardState>>,
}

impl JobGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job as active. Returns `None` if it already is — the
    /// caller must treat that as "someone else owns this job" and back off.
    pub fn admit(&self, job_id: &str) -> Option<JobLease> {
        let mut state = self.state.lock().unwrap();
        if state.active.contains_key(job_id) {
            return None;
        }
        state.active.insert(job_id.to_string(), false);
        Some(JobLease {
            guard: self.clone(),
            job_id: job_id.to_string(),
        })
    }

    /// True while the job is registered and not cancelled. Workers poll this
    /// between units to stop promptly on cancellation.
    pub fn is_active(&self, job_id: &str) -> bool {
        let state = self.state.lock().unwrap();
        matches!(state.active.get(job_id), Some(false))
    }

    /// Request cancellation of an active job. Returns whether the job was
    /// found. Progress counters are left intact so the job can be resumed.
    pub fn cancel(&self, job_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.active.get_mut(job_id) {
            Some(flag) => {
                *flag = true;
                true
            }
            None => false,
        }
    }

    fn release(&self, job_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.active.remove(job_id);
    }
}

/// Lease on an active job; releases the registration when dropped.
#[derive(Debug)]
pub struct JobLease {
    guard: JobGuard,
    job_id: String,
}

impl Drop for JobLease {
    fn drop(&mut self) {
        self.guard.release(&self.job_id);
    }
}
