//! Job contract consumed from the external scheduler
//!
//! The scheduler owns dispatch, persistence and retry backoff; the engine
//! only describes jobs and reports their outcomes.

/// The work a job performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    /// Fetch remote messages, merge, then push pending local state
    UpdateMessages,
    /// Push pending local read/delete state without fetching
    SyncMessageState,
    /// Create or re-associate the user identity
    UpdateUser {
        /// Bypass the update throttle
        forcefully: bool,
    },
}

/// How the scheduler resolves a dispatch that collides with an already
/// pending job of the same action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Enqueue independently
    Append,
    /// Replace the pending job so stale requests do not pile up
    Replace,
}

/// A job description handed to the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub action: JobAction,
    pub conflict_strategy: ConflictStrategy,
}

impl JobInfo {
    pub fn new(action: JobAction, conflict_strategy: ConflictStrategy) -> Self {
        Self {
            action,
            conflict_strategy,
        }
    }
}

/// Outcome reported back to the scheduler. Never an error: every failure is
/// mapped onto one of these so the scheduler can apply its backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobResult {
    /// The job ran to a definitive outcome (which may still be a failure
    /// surfaced through callbacks)
    Success,
    /// The job could not complete safely; re-run after backoff
    Retry,
}

/// The external job scheduler, as seen by the engine
pub trait JobDispatcher: Send + Sync {
    fn dispatch(&self, job: JobInfo);
}
