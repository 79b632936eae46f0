use crate::adapters::database::UserRepository;
use crate::domain::events::ServerEvent;
use dashmap::DashMap;
use opentelemetry::{global, metrics::UpDownCounter};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;
use uuid::Uuid;

/// Addressable reference to one live realtime session.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub connection_id: Uuid,
    pub tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn new(tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { connection_id: Uuid::new_v4(), tx }
    }
}

#[derive(Clone, Debug)]
struct Metrics {
    online_users: UpDownCounter<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            online_users: meter
                .i64_up_down_counter("registry_online_users")
                .with_description("Number of users with a live realtime connection")
                .build(),
        }
    }
}

#[derive(Debug)]
enum PresenceCommand {
    Write { user_id: Uuid, is_online: bool, last_seen: Option<OffsetDateTime> },
    Flush(oneshot::Sender<()>),
}

/// Applies presence writes one at a time, in the order they were queued.
async fn run_presence_writer(users: Arc<dyn UserRepository>, mut rx: mpsc::UnboundedReceiver<PresenceCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            PresenceCommand::Write { user_id, is_online, last_seen } => {
                if let Err(e) = users
                    .set_presence(user_id, is_online, last_seen)
                    .instrument(tracing::debug_span!("persist_presence", %user_id, is_online))
                    .await
                {
                    tracing::warn!(error = %e, %user_id, "Failed to persist presence");
                }
            }
            PresenceCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Presence writer stopped");
}

/// Maps each user to at most one live connection and drives presence.
///
/// All operations are synchronous. A registration for a user that is already
/// connected overwrites the previous handle without closing it; the older
/// session stays open until its socket drops but is no longer addressable.
///
/// Presence is persisted by a single background writer, so the stored
/// `is_online` of a user always ends up matching the last registry change.
/// Must be constructed inside a Tokio runtime.
#[derive(Clone, Debug)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<Uuid, ConnectionHandle>>,
    presence_tx: mpsc::UnboundedSender<PresenceCommand>,
    metrics: Metrics,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        let (presence_tx, presence_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_presence_writer(users, presence_rx));
        Self { connections: Arc::new(DashMap::new()), presence_tx, metrics: Metrics::new() }
    }

    pub fn register(&self, user_id: Uuid, handle: ConnectionHandle) {
        let connection_id = handle.connection_id;
        if self.connections.insert(user_id, handle).is_none() {
            self.metrics.online_users.add(1, &[]);
        } else {
            tracing::debug!(%user_id, %connection_id, "Superseded previous connection");
        }

        self.broadcast_online_users();
        self.persist_presence(user_id, true, None);
    }

    /// Removes the user's entry only if it still points at `handle`.
    /// Returns whether a removal happened.
    pub fn unregister(&self, user_id: Uuid, handle: &ConnectionHandle) -> bool {
        let removed =
            self.connections.remove_if(&user_id, |_, current| current.connection_id == handle.connection_id).is_some();

        if removed {
            self.metrics.online_users.add(-1, &[]);
            self.broadcast_online_users();
            self.persist_presence(user_id, false, Some(OffsetDateTime::now_utc()));
        }

        removed
    }

    #[must_use]
    pub fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.connections.get(&user_id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn list_online(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.connections.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    fn broadcast_online_users(&self) {
        let event = ServerEvent::GetOnlineUsers(self.list_online());
        let handles: Vec<ConnectionHandle> = self.connections.iter().map(|entry| entry.value().clone()).collect();

        for handle in handles {
            if handle.tx.try_send(event.clone()).is_err() {
                tracing::debug!(connection_id = %handle.connection_id, "Dropped presence update");
            }
        }
    }

    /// Waits until every presence write queued before this call has been applied.
    pub async fn flush_presence(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.presence_tx.send(PresenceCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn persist_presence(&self, user_id: Uuid, is_online: bool, last_seen: Option<OffsetDateTime>) {
        if self.presence_tx.send(PresenceCommand::Write { user_id, is_online, last_seen }).is_err() {
            tracing::warn!(%user_id, is_online, "Presence writer is gone, dropping update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::user::NewUser;

    fn registry() -> (ConnectionRegistry, InMemoryStore) {
        let store = InMemoryStore::new();
        (ConnectionRegistry::new(Arc::new(store.clone())), store)
    }

    fn handle(buffer: usize) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (ConnectionHandle::new(tx), rx)
    }

    async fn create_user(store: &InMemoryStore, email: &str) -> Uuid {
        store
            .create(NewUser {
                full_name: "Test".to_string(),
                email: email.to_string(),
                password_hash: "hash".to_string(),
                profile_pic: None,
                is_verified: false,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_register_broadcasts_online_list() {
        let (registry, _) = registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (handle_a, mut rx_a) = handle(8);
        let (handle_b, mut rx_b) = handle(8);

        registry.register(a, handle_a);
        assert_eq!(rx_a.recv().await.unwrap(), ServerEvent::GetOnlineUsers(vec![a]));

        registry.register(b, handle_b);
        let mut expected = vec![a, b];
        expected.sort_unstable();
        assert_eq!(rx_a.recv().await.unwrap(), ServerEvent::GetOnlineUsers(expected.clone()));
        assert_eq!(rx_b.recv().await.unwrap(), ServerEvent::GetOnlineUsers(expected));
    }

    #[tokio::test]
    async fn test_superseded_handle_unregister_is_noop() {
        let (registry, _) = registry();
        let user = Uuid::new_v4();
        let (first, _rx1) = handle(8);
        let (second, _rx2) = handle(8);

        registry.register(user, first.clone());
        registry.register(user, second.clone());

        assert!(!registry.unregister(user, &first));
        assert_eq!(registry.lookup(user).unwrap().connection_id, second.connection_id);
        assert_eq!(registry.list_online(), vec![user]);

        assert!(registry.unregister(user, &second));
        assert!(registry.lookup(user).is_none());
        assert!(registry.list_online().is_empty());
    }

    #[tokio::test]
    async fn test_unregister_broadcasts_to_remaining() {
        let (registry, _) = registry();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (handle_a, mut rx_a) = handle(8);
        let (handle_b, _rx_b) = handle(8);

        registry.register(a, handle_a);
        registry.register(b, handle_b.clone());
        while rx_a.try_recv().is_ok() {}

        assert!(registry.unregister(b, &handle_b));
        assert_eq!(rx_a.recv().await.unwrap(), ServerEvent::GetOnlineUsers(vec![a]));
    }

    #[tokio::test]
    async fn test_full_buffer_does_not_block_broadcast() {
        let (registry, _) = registry();
        let (slow, _slow_rx) = handle(1);
        let (fast, mut fast_rx) = handle(8);
        let (slow_id, fast_id) = (Uuid::new_v4(), Uuid::new_v4());

        registry.register(slow_id, slow);
        registry.register(fast_id, fast);

        assert!(matches!(fast_rx.recv().await.unwrap(), ServerEvent::GetOnlineUsers(ids) if ids.len() == 2));
    }

    #[tokio::test]
    async fn test_presence_is_persisted() {
        let (registry, store) = registry();
        let user = create_user(&store, "ada@example.com").await;
        let (h, _rx) = handle(8);

        registry.register(user, h.clone());
        registry.flush_presence().await;
        assert!(store.find_by_id(user).await.unwrap().unwrap().is_online);

        let before = store.find_by_id(user).await.unwrap().unwrap().last_seen;
        registry.unregister(user, &h);
        registry.flush_presence().await;
        let stored = store.find_by_id(user).await.unwrap().unwrap();
        assert!(!stored.is_online);
        assert!(stored.last_seen >= before);
    }

    #[tokio::test]
    async fn test_presence_failure_does_not_affect_registration() {
        let (registry, _) = registry();
        let unknown = Uuid::new_v4();
        let (h, _rx) = handle(8);

        registry.register(unknown, h.clone());
        assert!(registry.lookup(unknown).is_some());
        assert!(registry.unregister(unknown, &h));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_back_to_back_connect_disconnect_ends_offline() {
        let (registry, store) = registry();
        let user = create_user(&store, "grace@example.com").await;
        let created = store.find_by_id(user).await.unwrap().unwrap().last_seen;

        for _ in 0..50 {
            let (h, _rx) = handle(8);
            registry.register(user, h.clone());
            assert!(registry.unregister(user, &h));
        }
        registry.flush_presence().await;

        let stored = store.find_by_id(user).await.unwrap().unwrap();
        assert!(registry.list_online().is_empty());
        assert!(!stored.is_online);
        assert!(stored.last_seen >= created);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_presence_writes_follow_registry_order_across_users() {
        let (registry, store) = registry();
        let mut users = Vec::new();
        for i in 0..10 {
            users.push(create_user(&store, &format!("user{i}@example.com")).await);
        }

        let mut kept = Vec::new();
        for (i, user) in users.iter().enumerate() {
            let (h, rx) = handle(64);
            registry.register(*user, h.clone());
            if i % 2 == 0 {
                registry.unregister(*user, &h);
            } else {
                kept.push((h, rx));
            }
        }
        registry.flush_presence().await;

        for (i, user) in users.iter().enumerate() {
            let stored = store.find_by_id(*user).await.unwrap().unwrap();
            assert_eq!(stored.is_online, i % 2 == 1, "user {i}");
        }
    }
}
