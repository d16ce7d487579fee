//! Startup resume and steady-state status-write batching (C8).

mod batch;
mod resume;

pub use batch::BatchingObjectStore;
pub use resume::{resume_running_missions, ResumeOutcome};
