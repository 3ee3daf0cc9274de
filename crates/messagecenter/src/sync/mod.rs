//! Sync engine: job contract types and the per-cycle job handler
//!
//! The handler is transient; the external job scheduler drives it through
//! [`crate::Inbox::perform_job`] and applies retry backoff based on the
//! returned [`JobResult`].

mod handler;
mod jobs;

pub use handler::InboxJobHandler;
pub use jobs::{ConflictStrategy, JobAction, JobDispatcher, JobInfo, JobResult};
