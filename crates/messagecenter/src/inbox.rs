//! Inbox facade
//!
//! The inbox provides access to the device's local message data.
//! Modifications (deletions, mark read/unread) apply to the store and the
//! in-memory cache immediately and are sent to the server the next time the
//! inbox is synchronized.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::Utc;
use log::{debug, warn};

use crate::channel::ChannelSource;
use crate::models::Message;
use crate::remote::InboxApi;
use crate::storage::MessageStore;
use crate::sync::{ConflictStrategy, InboxJobHandler, JobAction, JobDispatcher, JobInfo, JobResult};
use crate::user::User;

/// Callback notified when a fetch request finishes, with its success flag
pub type FetchMessagesCallback = Box<dyn FnOnce(bool) + Send>;

/// Listener notified whenever the set of messages changes
pub type InboxListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Cache {
    unread: HashMap<String, Message>,
    read: HashMap<String, Message>,
    deleted_ids: HashSet<String>,
}

struct PendingFetch {
    id: u64,
    callback: Option<FetchMessagesCallback>,
}

#[derive(Default)]
struct FetchState {
    pending: Vec<PendingFetch>,
    in_flight: bool,
}

/// Handle for one fetch request. Cancelling detaches this caller's callback
/// only; the underlying job keeps running for any other attached callers.
pub struct FetchHandle {
    id: u64,
    state: Weak<Mutex<FetchState>>,
}

impl FetchHandle {
    pub fn cancel(&self) {
        if let Some(state) = self.state.upgrade() {
            state
                .lock()
                .unwrap()
                .pending
                .retain(|pending| pending.id != self.id);
        }
    }

    fn detached() -> Self {
        Self {
            id: 0,
            state: Weak::new(),
        }
    }
}

/// The message center inbox.
///
/// The only component the rest of the SDK talks to: holds the in-memory
/// view, exposes the mutation API, coalesces overlapping fetch requests, and
/// delegates sync work to the job scheduler. Safe for concurrent use; every
/// operation completes without raising, reporting failure through `false`
/// outcomes instead.
pub struct Inbox {
    store: Arc<dyn MessageStore>,
    user: Arc<User>,
    channel: Arc<dyn ChannelSource>,
    api: Arc<dyn InboxApi>,
    dispatcher: Arc<dyn JobDispatcher>,
    cache: Mutex<Cache>,
    listeners: Mutex<Vec<(u64, InboxListener)>>,
    fetch_state: Arc<Mutex<FetchState>>,
    user_listener_id: Mutex<Option<u64>>,
    enabled: AtomicBool,
    next_id: AtomicU64,
}

impl Inbox {
    /// Create a new inbox. Starts disabled; call [`Inbox::set_enabled`].
    pub fn new(
        store: Arc<dyn MessageStore>,
        user: Arc<User>,
        channel: Arc<dyn ChannelSource>,
        api: Arc<dyn InboxApi>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            user,
            channel,
            api,
            dispatcher,
            cache: Mutex::new(Cache::default()),
            listeners: Mutex::new(Vec::new()),
            fetch_state: Arc::new(Mutex::new(FetchState::default())),
            user_listener_id: Mutex::new(None),
            enabled: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        })
    }

    /// The user identity backing this inbox
    pub fn user(&self) -> &Arc<User> {
        &self.user
    }

    /// Enable or disable the inbox.
    ///
    /// Disabling purges all persisted messages and detaches listeners; while
    /// disabled every operation is a no-op with a well-defined `false`
    /// outcome.
    pub fn set_enabled(self: &Arc<Self>, enabled: bool) {
        if enabled {
            if !self.enabled.swap(true, Ordering::SeqCst) {
                self.start();
            }
        } else if self.enabled.swap(false, Ordering::SeqCst) {
            self.tear_down();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn start(self: &Arc<Self>) {
        self.refresh(false);

        // Refresh the inbox whenever the user is updated
        let weak = Arc::downgrade(self);
        let listener_id = self.user.add_listener(Arc::new(move |success| {
            if success && let Some(inbox) = weak.upgrade() {
                inbox.fetch_messages(None);
            }
        }));
        *self.user_listener_id.lock().unwrap() = Some(listener_id);

        if let Some(channel_id) = self.channel.channel_id()
            && self.user.should_update(&channel_id)
        {
            self.dispatch_update_user(true);
        }
    }

    fn tear_down(&self) {
        if let Some(id) = self.user_listener_id.lock().unwrap().take() {
            self.user.remove_listener(id);
        }

        if let Err(e) = self.store.delete_all() {
            warn!("Failed to purge messages: {e}");
        }
        if let Err(e) = self.store.clear_sync_state() {
            warn!("Failed to clear sync cursor: {e}");
        }

        {
            let mut cache = self.cache.lock().unwrap();
            *cache = Cache::default();
        }

        // Flush any attached fetch callbacks with a failure outcome
        self.on_update_messages_finished(false);
        self.notify_inbox_updated();
    }

    /// Called by the scheduler to execute a dispatched job
    pub fn perform_job(self: &Arc<Self>, job: &JobInfo) -> JobResult {
        if !self.is_enabled() {
            return JobResult::Success;
        }

        let handler = InboxJobHandler::new(
            Arc::clone(self),
            Arc::clone(&self.user),
            Arc::clone(&self.channel),
            Arc::clone(&self.store),
            Arc::clone(&self.api),
        );
        handler.perform_job(job)
    }

    /// Subscribe to inbox change notifications; returns a handle for removal
    pub fn add_listener(&self, listener: InboxListener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    /// Remove a previously registered listener
    pub fn remove_listener(&self, id: u64) {
        self.listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
    }

    /// Fetch the latest inbox changes from the server.
    ///
    /// Concurrent calls while a fetch is in flight attach to the existing
    /// request instead of enqueueing another job; every attached callback
    /// fires exactly once with the shared outcome.
    pub fn fetch_messages(&self, callback: Option<FetchMessagesCallback>) -> FetchHandle {
        if !self.is_enabled() {
            if let Some(callback) = callback {
                callback(false);
            }
            return FetchHandle::detached();
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut state = self.fetch_state.lock().unwrap();
        state.pending.push(PendingFetch { id, callback });
        if !state.in_flight {
            self.dispatcher.dispatch(JobInfo::new(
                JobAction::UpdateMessages,
                ConflictStrategy::Replace,
            ));
        }
        state.in_flight = true;
        drop(state);

        FetchHandle {
            id,
            state: Arc::downgrade(&self.fetch_state),
        }
    }

    /// Called by the job handler when a message update cycle concludes;
    /// fans the outcome out to every attached fetch callback.
    pub fn on_update_messages_finished(&self, success: bool) {
        let drained: Vec<PendingFetch> = {
            let mut state = self.fetch_state.lock().unwrap();
            state.in_flight = false;
            state.pending.drain(..).collect()
        };

        for mut pending in drained {
            if let Some(callback) = pending.callback.take() {
                callback(success);
            }
        }
    }

    /// Dispatch a user create/update job
    pub fn dispatch_update_user(&self, forcefully: bool) {
        debug!("Updating user");
        self.dispatcher.dispatch(JobInfo::new(
            JobAction::UpdateUser { forcefully },
            ConflictStrategy::Append,
        ));
    }

    /// Dispatch a job that pushes pending read/delete state without fetching
    pub fn dispatch_sync_message_state(&self) {
        self.dispatcher.dispatch(JobInfo::new(
            JobAction::SyncMessageState,
            ConflictStrategy::Append,
        ));
    }

    /// The total message count
    pub fn count(&self) -> usize {
        let cache = self.cache.lock().unwrap();
        cache.unread.len() + cache.read.len()
    }

    /// The number of unread messages
    pub fn unread_count(&self) -> usize {
        self.cache.lock().unwrap().unread.len()
    }

    /// The number of read messages
    pub fn read_count(&self) -> usize {
        self.cache.lock().unwrap().read.len()
    }

    /// All message IDs currently in the inbox
    pub fn message_ids(&self) -> HashSet<String> {
        let cache = self.cache.lock().unwrap();
        cache
            .unread
            .keys()
            .chain(cache.read.keys())
            .cloned()
            .collect()
    }

    /// The messages in the inbox, sorted by descending sent date
    pub fn messages(&self) -> Vec<Message> {
        self.messages_matching(|_| true)
    }

    /// Messages matching the predicate, sorted by descending sent date
    pub fn messages_matching(&self, predicate: impl Fn(&Message) -> bool) -> Vec<Message> {
        let cache = self.cache.lock().unwrap();
        let mut messages: Vec<Message> = cache
            .unread
            .values()
            .chain(cache.read.values())
            .filter(|m| predicate(m))
            .cloned()
            .collect();
        drop(cache);
        sort_by_sent_date(&mut messages);
        messages
    }

    /// Unread messages, sorted by descending sent date
    pub fn unread_messages(&self) -> Vec<Message> {
        self.unread_messages_matching(|_| true)
    }

    /// Unread messages matching the predicate, sorted by descending sent date
    pub fn unread_messages_matching(&self, predicate: impl Fn(&Message) -> bool) -> Vec<Message> {
        let cache = self.cache.lock().unwrap();
        let mut messages: Vec<Message> = cache
            .unread
            .values()
            .filter(|m| predicate(m))
            .cloned()
            .collect();
        drop(cache);
        sort_by_sent_date(&mut messages);
        messages
    }

    /// Read messages, sorted by descending sent date
    pub fn read_messages(&self) -> Vec<Message> {
        self.read_messages_matching(|_| true)
    }

    /// Read messages matching the predicate, sorted by descending sent date
    pub fn read_messages_matching(&self, predicate: impl Fn(&Message) -> bool) -> Vec<Message> {
        let cache = self.cache.lock().unwrap();
        let mut messages: Vec<Message> = cache
            .read
            .values()
            .filter(|m| predicate(m))
            .cloned()
            .collect();
        drop(cache);
        sort_by_sent_date(&mut messages);
        messages
    }

    /// Get a message by ID
    pub fn message(&self, message_id: &str) -> Option<Message> {
        let cache = self.cache.lock().unwrap();
        cache
            .unread
            .get(message_id)
            .or_else(|| cache.read.get(message_id))
            .cloned()
    }

    /// Mark messages read. Applies to the store and the in-memory cache
    /// before returning; the server learns about it on the next sync.
    pub fn mark_messages_read(&self, message_ids: &[String]) {
        if !self.is_enabled() {
            return;
        }

        if let Err(e) = self.store.mark_locally_read(message_ids) {
            warn!("Failed to mark messages read: {e}");
        }

        {
            let mut cache = self.cache.lock().unwrap();
            for message_id in message_ids {
                if let Some(mut message) = cache.unread.remove(message_id) {
                    message.set_unread(false);
                    cache.read.insert(message_id.clone(), message);
                }
            }
        }
        self.notify_inbox_updated();
    }

    /// Mark messages unread, symmetric to [`Inbox::mark_messages_read`]
    pub fn mark_messages_unread(&self, message_ids: &[String]) {
        if !self.is_enabled() {
            return;
        }

        if let Err(e) = self.store.mark_unread(message_ids) {
            warn!("Failed to mark messages unread: {e}");
        }

        {
            let mut cache = self.cache.lock().unwrap();
            for message_id in message_ids {
                if let Some(mut message) = cache.read.remove(message_id) {
                    message.set_unread(true);
                    cache.unread.insert(message_id.clone(), message);
                }
            }
        }
        self.notify_inbox_updated();
    }

    /// Delete messages. They disappear from the inbox immediately; the
    /// server-side delete happens on the next sync.
    pub fn delete_messages(&self, message_ids: &[String]) {
        if !self.is_enabled() {
            return;
        }

        if let Err(e) = self.store.mark_locally_deleted(message_ids) {
            warn!("Failed to mark messages deleted: {e}");
        }

        {
            let mut cache = self.cache.lock().unwrap();
            for message_id in message_ids {
                cache.unread.remove(message_id);
                cache.read.remove(message_id);
                cache.deleted_ids.insert(message_id.clone());
            }
        }
        self.notify_inbox_updated();
    }

    /// Reload the in-memory cache from the store.
    ///
    /// With `expiration_check` set, now-expired rows are also evicted from
    /// the persisted store. Optimistic read/unread state applied since the
    /// last refresh is preserved until the server acknowledges it.
    pub fn refresh(&self, expiration_check: bool) {
        if expiration_check {
            match self.store.delete_expired(Utc::now()) {
                Ok(0) => {}
                Ok(removed) => debug!("Evicted {removed} expired messages"),
                Err(e) => warn!("Failed to evict expired messages: {e}"),
            }
        }

        let entities = self.store.get_all().unwrap_or_else(|e| {
            warn!("Failed to load messages: {e}");
            Vec::new()
        });

        let now = Utc::now();
        {
            let mut cache = self.cache.lock().unwrap();

            let previous_unread: HashSet<String> = cache.unread.keys().cloned().collect();
            let previous_read: HashSet<String> = cache.read.keys().cloned().collect();

            cache.unread.clear();
            cache.read.clear();

            for entity in &entities {
                if entity.deleted || cache.deleted_ids.contains(&entity.message_id) {
                    cache.deleted_ids.insert(entity.message_id.clone());
                    continue;
                }
                if entity.is_expired_at(now) {
                    continue;
                }

                let Some(mut message) = Message::from_entity(entity) else {
                    warn!("Failed to load message {}", entity.message_id);
                    continue;
                };

                // A mark-read/unread may still be in process; keep the
                // optimistic state over what the store reports
                if previous_unread.contains(&message.id) {
                    message.set_unread(true);
                    cache.unread.insert(message.id.clone(), message);
                } else if previous_read.contains(&message.id) {
                    message.set_unread(false);
                    cache.read.insert(message.id.clone(), message);
                } else if message.is_unread() {
                    cache.unread.insert(message.id.clone(), message);
                } else {
                    cache.read.insert(message.id.clone(), message);
                }
            }
        }

        self.notify_inbox_updated();
    }

    fn notify_inbox_updated(&self) {
        let snapshot: Vec<InboxListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener();
        }
    }
}

fn sort_by_sent_date(messages: &mut [Message]) {
    messages.sort_by(|a, b| b.sent.cmp(&a.sent).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::FixedChannel;
    use crate::models::{MessageEntity, SyncState, UserCredentials};
    use crate::remote::{ApiResponse, RequestError};
    use crate::storage::InMemoryMessageStore;
    use serde_json::{Value as JsonValue, json};
    use std::sync::atomic::AtomicUsize;

    /// Dispatcher that records dispatched jobs
    #[derive(Default)]
    struct RecordingDispatcher {
        jobs: Mutex<Vec<JobInfo>>,
    }

    impl JobDispatcher for RecordingDispatcher {
        fn dispatch(&self, job: JobInfo) {
            self.jobs.lock().unwrap().push(job);
        }
    }

    /// Remote API stub; facade tests never reach the network
    struct UnreachableApi;

    impl InboxApi for UnreachableApi {
        fn fetch_messages(
            &self,
            _credentials: &UserCredentials,
            _channel_id: &str,
            _since: Option<&str>,
        ) -> Result<ApiResponse<Vec<JsonValue>>, RequestError> {
            Err(RequestError::MissingBaseUrl)
        }

        fn sync_read_state(
            &self,
            _credentials: &UserCredentials,
            _channel_id: &str,
            _reportings: &[JsonValue],
        ) -> Result<ApiResponse<()>, RequestError> {
            Err(RequestError::MissingBaseUrl)
        }

        fn sync_deleted_state(
            &self,
            _credentials: &UserCredentials,
            _channel_id: &str,
            _reportings: &[JsonValue],
        ) -> Result<ApiResponse<()>, RequestError> {
            Err(RequestError::MissingBaseUrl)
        }

        fn create_user(
            &self,
            _channel_id: &str,
        ) -> Result<ApiResponse<UserCredentials>, RequestError> {
            Err(RequestError::MissingBaseUrl)
        }

        fn update_user(
            &self,
            _credentials: &UserCredentials,
            _channel_id: &str,
        ) -> Result<ApiResponse<()>, RequestError> {
            Err(RequestError::MissingBaseUrl)
        }
    }

    struct Fixture {
        inbox: Arc<Inbox>,
        store: Arc<InMemoryMessageStore>,
        dispatcher: Arc<RecordingDispatcher>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryMessageStore::new());
        let user = Arc::new(User::in_memory());
        user.set_credentials("user-1", "token-1");
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let inbox = Inbox::new(
            store.clone(),
            user,
            Arc::new(FixedChannel::new("channel-1")),
            Arc::new(UnreachableApi),
            dispatcher.clone(),
        );
        inbox.set_enabled(true);
        Fixture {
            inbox,
            store,
            dispatcher,
        }
    }

    fn message_payload(id: &str, sent: &str) -> JsonValue {
        json!({
            "message_id": id,
            "title": format!("Title {id}"),
            "message_body_url": format!("https://example.com/messages/{id}/body"),
            "message_sent": sent,
            "unread": true,
            "message_reporting": { "message_id": id }
        })
    }

    fn seed_messages(store: &InMemoryMessageStore, count: usize) -> Vec<String> {
        let entities: Vec<MessageEntity> = (0..count)
            .map(|i| {
                MessageEntity::from_payload(&message_payload(
                    &format!("m{i}"),
                    &format!("2024-10-{:02}T12:00:00+00:00", (i % 27) + 1),
                ))
                .unwrap()
            })
            .collect();
        let ids = entities.iter().map(|e| e.message_id.clone()).collect();
        store.upsert_all(entities).unwrap();
        ids
    }

    #[test]
    fn test_counts_after_mutations() {
        let f = fixture();
        seed_messages(&f.store, 10);
        f.inbox.refresh(false);

        assert_eq!(f.inbox.count(), 10);
        assert_eq!(f.inbox.unread_count(), 10);
        assert_eq!(f.inbox.read_count(), 0);

        f.inbox.mark_messages_read(&[
            "m0".to_string(),
            "m1".to_string(),
            "m2".to_string(),
        ]);
        f.inbox.delete_messages(&["m3".to_string()]);

        assert_eq!(f.inbox.count(), 9);
        assert_eq!(f.inbox.unread_count(), 6);
        assert_eq!(f.inbox.read_count(), 3);

        // The mutations hit the store synchronously
        assert_eq!(f.store.locally_read_messages().unwrap().len(), 3);
        assert_eq!(f.store.locally_deleted_messages().unwrap().len(), 1);
    }

    #[test]
    fn test_count_invariant_excludes_deleted_and_expired() {
        let f = fixture();
        seed_messages(&f.store, 5);

        let mut expired = MessageEntity::from_payload(&message_payload(
            "expired",
            "2024-10-01T12:00:00+00:00",
        ))
        .unwrap();
        expired.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        f.store.upsert_all(vec![expired]).unwrap();

        f.inbox.refresh(false);
        f.inbox.delete_messages(&["m0".to_string()]);

        assert_eq!(
            f.inbox.count(),
            f.inbox.unread_count() + f.inbox.read_count()
        );
        assert_eq!(f.inbox.count(), 4);
        assert!(f.inbox.message("expired").is_none());
    }

    #[test]
    fn test_fetch_coalescing() {
        let f = fixture();

        let calls = Arc::new(AtomicUsize::new(0));
        let outcomes = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let calls = calls.clone();
            let outcomes = outcomes.clone();
            f.inbox.fetch_messages(Some(Box::new(move |success| {
                calls.fetch_add(1, Ordering::SeqCst);
                outcomes.lock().unwrap().push(success);
            })));
        }

        // Only one job dispatched while a fetch is in flight
        let dispatched: Vec<JobInfo> = f.dispatcher.jobs.lock().unwrap().clone();
        let fetches = dispatched
            .iter()
            .filter(|j| j.action == JobAction::UpdateMessages)
            .count();
        assert_eq!(fetches, 1);

        f.inbox.on_update_messages_finished(true);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*outcomes.lock().unwrap(), vec![true, true]);

        // The next fetch after completion dispatches again
        f.inbox.fetch_messages(None);
        let dispatched = f.dispatcher.jobs.lock().unwrap();
        let fetches = dispatched
            .iter()
            .filter(|j| j.action == JobAction::UpdateMessages)
            .count();
        assert_eq!(fetches, 2);
    }

    #[test]
    fn test_cancel_detaches_single_callback() {
        let f = fixture();

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        let handle = f.inbox.fetch_messages(Some(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        let counter = second.clone();
        f.inbox.fetch_messages(Some(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        handle.cancel();
        f.inbox.on_update_messages_finished(true);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_refresh_preserves_optimistic_state() {
        let f = fixture();
        seed_messages(&f.store, 2);
        f.inbox.refresh(false);

        f.inbox.mark_messages_read(&["m0".to_string()]);

        // A refresh from the store must not resurrect the unread state
        f.inbox.refresh(false);
        assert_eq!(f.inbox.read_count(), 1);
        assert!(!f.inbox.message("m0").unwrap().is_unread());

        // Deleted messages stay hidden even if still present in the store
        f.inbox.delete_messages(&["m1".to_string()]);
        f.inbox.refresh(false);
        assert!(f.inbox.message("m1").is_none());
        assert_eq!(f.inbox.count(), 1);
    }

    #[test]
    fn test_mark_unread_restores_message() {
        let f = fixture();
        seed_messages(&f.store, 1);
        f.inbox.refresh(false);

        f.inbox.mark_messages_read(&["m0".to_string()]);
        assert_eq!(f.inbox.read_count(), 1);

        f.inbox.mark_messages_unread(&["m0".to_string()]);
        assert_eq!(f.inbox.unread_count(), 1);
        assert!(f.inbox.message("m0").unwrap().is_unread());
    }

    #[test]
    fn test_refresh_evicts_expired_rows() {
        let f = fixture();
        let mut entity = MessageEntity::from_payload(&message_payload(
            "m0",
            "2024-10-01T12:00:00+00:00",
        ))
        .unwrap();
        entity.expires_at = Some(Utc::now() - chrono::Duration::minutes(5));
        f.store.upsert_all(vec![entity]).unwrap();

        f.inbox.refresh(true);

        assert_eq!(f.inbox.count(), 0);
        assert!(f.store.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_messages_sorted_by_sent_date() {
        let f = fixture();
        let entities = vec![
            MessageEntity::from_payload(&message_payload("older", "2024-10-01T12:00:00+00:00"))
                .unwrap(),
            MessageEntity::from_payload(&message_payload("newer", "2024-10-20T12:00:00+00:00"))
                .unwrap(),
        ];
        f.store.upsert_all(entities).unwrap();
        f.inbox.refresh(false);

        let messages = f.inbox.messages();
        assert_eq!(messages[0].id, "newer");
        assert_eq!(messages[1].id, "older");
    }

    #[test]
    fn test_messages_matching_predicate() {
        let f = fixture();
        seed_messages(&f.store, 5);
        f.inbox.refresh(false);

        let picked = f.inbox.messages_matching(|m| m.id == "m2");
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "m2");
    }

    #[test]
    fn test_listener_notified_on_mutation() {
        let f = fixture();
        seed_messages(&f.store, 1);
        f.inbox.refresh(false);

        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        let id = f.inbox.add_listener(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        f.inbox.mark_messages_read(&["m0".to_string()]);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);

        f.inbox.remove_listener(id);
        f.inbox.mark_messages_read(&["m0".to_string()]);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_inbox_is_inert() {
        let f = fixture();
        seed_messages(&f.store, 3);
        f.inbox.refresh(false);
        f.store
            .save_sync_state(SyncState::new("user-1", Some("cursor".to_string())))
            .unwrap();

        f.inbox.set_enabled(false);

        // Persisted data is purged and the cache cleared
        assert!(f.store.get_all().unwrap().is_empty());
        assert!(f.store.get_sync_state("user-1").unwrap().is_none());
        assert_eq!(f.inbox.count(), 0);

        // Operations become no-ops with well-defined outcomes
        let outcome = Arc::new(Mutex::new(None));
        let slot = outcome.clone();
        f.inbox.fetch_messages(Some(Box::new(move |success| {
            *slot.lock().unwrap() = Some(success);
        })));
        assert_eq!(*outcome.lock().unwrap(), Some(false));

        f.inbox.mark_messages_read(&["m0".to_string()]);
        assert_eq!(f.inbox.read_count(), 0);

        let job = JobInfo::new(JobAction::UpdateMessages, ConflictStrategy::Replace);
        assert_eq!(f.inbox.perform_job(&job), JobResult::Success);
    }
}
