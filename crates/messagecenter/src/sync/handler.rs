//! Inbox job handler
//!
//! Orchestrates one sync cycle: ensures the identity is usable, fetches
//! remote changes, merges them into the store, pushes pending local
//! mutations outward, and reports the outcome to the scheduler.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value as JsonValue;

use super::jobs::{JobAction, JobInfo, JobResult};
use crate::channel::ChannelSource;
use crate::inbox::Inbox;
use crate::models::{MessageEntity, SyncState};
use crate::remote::{InboxApi, RequestError};
use crate::storage::MessageStore;
use crate::user::User;

/// Outcome of the fetch step of a message update cycle
enum FetchOutcome {
    /// Fresh list merged and cursor advanced
    Updated,
    /// 304: nothing changed, cursor untouched
    NotModified,
    /// Terminal failure for this fetch; the rest of the cycle still runs
    Failed,
    /// Transient failure; the scheduler should re-run after backoff
    Retry,
    /// No request could be attempted; abort the whole cycle
    Abort,
}

enum UserOutcome {
    Updated,
    Failed,
    Retry,
}

/// Handles one job invocation for the [`Inbox`].
///
/// Transient: constructed per cycle, owns no state across cycles beyond what
/// it reads and writes through the store and the user.
pub struct InboxJobHandler {
    inbox: Arc<Inbox>,
    user: Arc<User>,
    channel: Arc<dyn ChannelSource>,
    store: Arc<dyn MessageStore>,
    api: Arc<dyn InboxApi>,
}

impl InboxJobHandler {
    pub fn new(
        inbox: Arc<Inbox>,
        user: Arc<User>,
        channel: Arc<dyn ChannelSource>,
        store: Arc<dyn MessageStore>,
        api: Arc<dyn InboxApi>,
    ) -> Self {
        Self {
            inbox,
            user,
            channel,
            store,
            api,
        }
    }

    /// Perform one job. Failures are mapped onto [`JobResult`]; this never
    /// panics or propagates errors to the scheduler.
    pub fn perform_job(&self, job: &JobInfo) -> JobResult {
        match job.action {
            JobAction::UpdateMessages => self.on_update_messages(),
            JobAction::SyncMessageState => self.on_sync_message_state(),
            JobAction::UpdateUser { forcefully } => self.on_update_user(forcefully),
        }
    }

    fn on_update_messages(&self) -> JobResult {
        if !self.user.is_created() {
            debug!("User has not been created, canceling message update");
            self.inbox.on_update_messages_finished(false);
            return JobResult::Success;
        }

        let outcome = self.update_messages();

        if matches!(outcome, FetchOutcome::Abort) {
            self.inbox.on_update_messages_finished(false);
            return JobResult::Retry;
        }

        self.inbox.refresh(true);
        self.inbox.on_update_messages_finished(matches!(
            outcome,
            FetchOutcome::Updated | FetchOutcome::NotModified
        ));

        // Read/delete pushes are independent of fetch success
        self.sync_deleted_message_state();
        self.sync_read_message_state();

        match outcome {
            FetchOutcome::Retry => JobResult::Retry,
            _ => JobResult::Success,
        }
    }

    fn on_sync_message_state(&self) -> JobResult {
        self.sync_deleted_message_state();
        self.sync_read_message_state();
        JobResult::Success
    }

    fn on_update_user(&self, forcefully: bool) -> JobResult {
        if !forcefully && !self.user.update_is_due(Utc::now()) {
            debug!("User was recently updated, skipping update");
            return JobResult::Success;
        }

        let Some(channel_id) = self.channel.channel_id() else {
            debug!("No channel; user will be updated after channel registration finishes");
            self.user.on_user_updated(false);
            return JobResult::Success;
        };

        let outcome = if self.user.is_created() {
            self.update_user(&channel_id)
        } else {
            self.create_user(&channel_id)
        };

        self.user
            .on_user_updated(matches!(outcome, UserOutcome::Updated));

        match outcome {
            UserOutcome::Retry => JobResult::Retry,
            _ => JobResult::Success,
        }
    }

    /// Fetch the message list and merge it into the store
    fn update_messages(&self) -> FetchOutcome {
        info!("Refreshing inbox messages");

        let Some(channel_id) = self.channel.channel_id() else {
            debug!("The channel ID does not exist");
            return FetchOutcome::Failed;
        };
        let Some(credentials) = self.user.credentials() else {
            return FetchOutcome::Failed;
        };

        let since = self
            .store
            .get_sync_state(&credentials.user_id)
            .unwrap_or_else(|e| {
                warn!("Failed to read sync state: {e}");
                None
            })
            .and_then(|state| state.last_modified);

        let response = match self
            .api
            .fetch_messages(&credentials, &channel_id, since.as_deref())
        {
            Ok(response) => response,
            Err(e @ RequestError::MissingBaseUrl) => {
                warn!("Cannot fetch messages: {e}");
                return FetchOutcome::Abort;
            }
            Err(e) => {
                debug!("Message update failed: {e}");
                return FetchOutcome::Retry;
            }
        };

        if response.is_successful() {
            let payloads = response.value.unwrap_or_default();
            info!("Received {} inbox messages", payloads.len());

            if let Err(e) = self.merge_remote_messages(&payloads) {
                warn!("Failed to merge fetched messages: {e}");
                return FetchOutcome::Failed;
            }

            let state = SyncState::new(credentials.user_id.clone(), response.last_modified);
            if let Err(e) = self.store.save_sync_state(state) {
                warn!("Failed to save sync cursor: {e}");
            }
            return FetchOutcome::Updated;
        }

        if response.status == 304 {
            debug!("Inbox messages already up to date");
            return FetchOutcome::NotModified;
        }

        if response.is_server_error() {
            debug!("Message fetch failed with status {}", response.status);
            return FetchOutcome::Retry;
        }

        debug!("Unable to update inbox messages, status {}", response.status);
        FetchOutcome::Failed
    }

    /// Merge a fetched message list: upsert every valid payload (dirty flags
    /// survive the replace), then drop visible rows the server no longer
    /// lists.
    fn merge_remote_messages(&self, payloads: &[JsonValue]) -> anyhow::Result<()> {
        let mut entities = Vec::with_capacity(payloads.len());
        let mut server_ids = HashSet::new();

        for payload in payloads {
            // Invalid entries are logged by the parser and skipped
            if let Some(entity) = MessageEntity::from_payload(payload) {
                server_ids.insert(entity.message_id.clone());
                entities.push(entity);
            }
        }

        self.store.upsert_all(entities)?;

        let known = self.store.message_ids(Utc::now())?;
        let stale: Vec<String> = known
            .into_iter()
            .filter(|id| !server_ids.contains(id))
            .collect();
        if !stale.is_empty() {
            debug!("Removing {} messages no longer on the server", stale.len());
            self.store.delete_rows(&stale)?;
        }

        Ok(())
    }

    /// Push locally read state; on acknowledgement, clear the dirty flags
    fn sync_read_message_state(&self) {
        let Some(channel_id) = self.channel.channel_id() else {
            return;
        };
        let Some(credentials) = self.user.credentials() else {
            return;
        };

        let pending = self.store.locally_read_messages().unwrap_or_else(|e| {
            warn!("Failed to read pending read state: {e}");
            Vec::new()
        });
        let (ids, reportings) = collect_reportings(&pending);
        if ids.is_empty() {
            return;
        }

        debug!("Found {} messages to mark read", ids.len());
        match self.api.sync_read_state(&credentials, &channel_id, &reportings) {
            Ok(response) if response.is_successful() => {
                if let Err(e) = self.store.confirm_read(&ids) {
                    warn!("Failed to confirm read state: {e}");
                }
            }
            Ok(response) => {
                debug!("Read state synchronize failed, status {}", response.status);
            }
            Err(e) => {
                debug!("Read state synchronize failed: {e}");
            }
        }
    }

    /// Push locally deleted state; on acknowledgement, remove the rows
    fn sync_deleted_message_state(&self) {
        let Some(channel_id) = self.channel.channel_id() else {
            return;
        };
        let Some(credentials) = self.user.credentials() else {
            return;
        };

        let pending = self.store.locally_deleted_messages().unwrap_or_else(|e| {
            warn!("Failed to read pending delete state: {e}");
            Vec::new()
        });
        let (ids, reportings) = collect_reportings(&pending);
        if ids.is_empty() {
            return;
        }

        debug!("Found {} messages to delete", ids.len());
        match self
            .api
            .sync_deleted_state(&credentials, &channel_id, &reportings)
        {
            Ok(response) if response.is_successful() => {
                if let Err(e) = self.store.delete_rows(&ids) {
                    warn!("Failed to remove deleted rows: {e}");
                }
            }
            Ok(response) => {
                debug!("Deleted state synchronize failed, status {}", response.status);
            }
            Err(e) => {
                debug!("Deleted state synchronize failed: {e}");
            }
        }
    }

    fn create_user(&self, channel_id: &str) -> UserOutcome {
        let response = match self.api.create_user(channel_id) {
            Ok(response) => response,
            Err(e) => {
                debug!("User creation failed: {e}");
                return UserOutcome::Retry;
            }
        };

        if response.is_successful()
            && let Some(credentials) = response.value
        {
            info!("Created message center user {}", credentials.user_id);
            self.user
                .on_created(&credentials.user_id, &credentials.user_token, channel_id);
            // New identity: the old fetch cursor no longer means anything
            if let Err(e) = self.store.clear_sync_state() {
                warn!("Failed to clear sync cursor: {e}");
            }
            return UserOutcome::Updated;
        }

        if response.is_server_error() {
            return UserOutcome::Retry;
        }
        debug!("User creation failed, status {}", response.status);
        UserOutcome::Failed
    }

    /// Update the user. A 401 means the stored identity is stale; fall
    /// through to creation so sync can never be permanently bricked.
    fn update_user(&self, channel_id: &str) -> UserOutcome {
        let Some(credentials) = self.user.credentials() else {
            return self.create_user(channel_id);
        };

        let response = match self.api.update_user(&credentials, channel_id) {
            Ok(response) => response,
            Err(e) => {
                debug!("User update failed: {e}");
                return UserOutcome::Retry;
            }
        };

        if response.is_successful() {
            info!("Message center user updated");
            self.user.on_updated(channel_id);
            return UserOutcome::Updated;
        }

        if response.status == 401 {
            debug!("Re-creating message center user");
            self.user.clear_last_update();
            return self.create_user(channel_id);
        }

        self.user.clear_last_update();
        if response.is_server_error() {
            return UserOutcome::Retry;
        }
        debug!("User update failed, status {}", response.status);
        UserOutcome::Failed
    }
}

/// Pair pending entities with their reporting documents, skipping entities
/// that have none (they cannot be acknowledged yet).
fn collect_reportings(pending: &[MessageEntity]) -> (Vec<String>, Vec<JsonValue>) {
    let mut ids = Vec::new();
    let mut reportings = Vec::new();
    for entity in pending {
        if let Some(reporting) = &entity.reporting {
            ids.push(entity.message_id.clone());
            reportings.push(reporting.clone());
        }
    }
    (ids, reportings)
}
