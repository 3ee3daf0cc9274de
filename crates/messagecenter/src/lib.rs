//! Message center crate - inbox synchronization for the SDK
//!
//! This crate keeps a local, persisted collection of inbox messages
//! consistent with the remote service under an anonymous per-device user
//! identity. It provides:
//! - Domain models (Message, MessageEntity, UserCredentials, SyncState)
//! - Storage trait abstractions with SQLite and in-memory backends
//! - A stateless remote API client
//! - A per-cycle sync job handler with credential recovery
//! - The Inbox facade with optimistic mutations and fetch coalescing
//!
//! This crate has zero UI dependencies. Background execution and retry
//! backoff belong to the embedding SDK's job scheduler, consumed through
//! the [`JobDispatcher`] contract.

pub mod channel;
pub mod config;
pub mod inbox;
pub mod models;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod user;

pub use channel::{ChannelSource, FixedChannel};
pub use config::RuntimeConfig;
pub use inbox::{FetchHandle, FetchMessagesCallback, Inbox, InboxListener};
pub use models::{Message, MessageEntity, MessageOrigin, SyncState, UserCredentials};
pub use remote::{ApiResponse, InboxApi, InboxApiClient, RequestError};
pub use storage::{InMemoryMessageStore, MessageStore, SqliteMessageStore};
pub use sync::{
    ConflictStrategy, InboxJobHandler, JobAction, JobDispatcher, JobInfo, JobResult,
};
pub use user::{User, UserListener};
