//! rollscan — batch extraction of voter records from scanned electoral rolls.
//!
//! Takes an archive of scanned roll PDFs, renders every page, sends the
//! images through a hosted vision model, parses whatever comes back (JSON,
//! labeled text, or worse) into structured voter records, and persists them
//! to SQLite with resumable per-job progress tracking.

pub mod config;
pub mod db;
pub mod pipeline;
pub mod transliterate;

pub use config::Config;
pub use pipeline::{BatchScheduler, JobGuard, PipelineError};

use tracing_subscriber::EnvFilter;

/// Initialize tracing with an env-filterable subscriber. `RUST_LOG`
/// overrides the default level. Safe to call once per process.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
