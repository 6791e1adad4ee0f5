//! Document extraction pipeline.
//!
//! A batch job flows through:
//! 1. [`archive`] — unpack the upload, discover and order documents
//! 2. [`scheduler`] — fan documents out over the outer worker pool
//! 3. [`unit`] — render and recognize one document's pages (inner pool)
//! 4. [`page`] — recognition with retry, payload parsing
//! 5. [`parser`] — JSON, labeled-text and positional parsing routes
//! 6. [`classify`] / [`header`] — record quality and header aggregation

pub mod archive;
pub mod classify;
pub mod error;
pub mod guard;
pub mod header;
pub mod page;
pub mod parser;
pub mod pool;
pub mod rasterize;
pub mod recognize;
pub mod scheduler;
pub mod types;
pub mod unit;

pub use error::{PipelineError, RecognitionError};
pub use guard::{JobGuard, JobLease};
pub use header::HeaderInfo;
pub use scheduler::BatchScheduler;
pub use types::{Job, JobPatch, JobStatus, RawVoter, RecordStatus, VoterRecord};
