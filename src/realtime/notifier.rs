use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use super::events::ChatEvent;

/// Fan-out hub for real-time events.
///
/// Constructed once in `main` and carried inside `AppState`; handlers emit
/// into it and every connected socket holds a subscription. Delivery is
/// at-most-once: events reach only sessions connected at emit time, and
/// emitting with no subscribers is a silent no-op.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

struct NotifierInner {
    events_tx: broadcast::Sender<ChatEvent>,

    /// Presence: user_id -> id of the connection that owns the entry.
    online: RwLock<HashMap<i64, Uuid>>,
}

impl Notifier {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(NotifierInner {
                events_tx,
                online: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to the event stream. Each socket filters what it forwards
    /// by `ChatEvent::conversation_id` against its own subscriptions.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Emit an event. A send with no live receivers is not an error.
    pub fn emit(&self, event: ChatEvent) {
        let _ = self.inner.events_tx.send(event);
    }

    /// Record a session's presence entry.
    pub async fn session_online(&self, user_id: i64, conn_id: Uuid) {
        self.inner.online.write().await.insert(user_id, conn_id);
    }

    /// Remove a session's presence entry, but only if this connection still
    /// owns it. A reconnect replaces the entry, and the old connection's
    /// teardown must not clobber the new one.
    pub async fn session_offline(&self, user_id: i64, conn_id: Uuid) {
        let mut online = self.inner.online.write().await;
        if online.get(&user_id) == Some(&conn_id) {
            online.remove(&user_id);
        }
    }

    pub async fn is_online(&self, user_id: i64) -> bool {
        self.inner.online.read().await.contains_key(&user_id)
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
