//! In-memory conversation sessions.
//!
//! The store maps a [`SessionId`] to a shared [`Session`]. The map lock is only
//! held for lookups and inserts. Each session carries two locks: a short
//! synchronous one around its turns, never held across `.await`, and an async
//! exchange lock that chats hold across the upstream call. History reads only
//! take the first, so they never wait on a model reply.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as SyncMutex, MutexGuard as SyncMutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tokio::sync::{Mutex, MutexGuard};

use crate::domain::{Role, SessionId, Turn};

/// One conversation: an append-only list of turns.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    turns: SyncMutex<Vec<Turn>>,
    exchange: Mutex<()>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            turns: SyncMutex::new(Vec::new()),
            exchange: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    fn lock_turns(&self) -> SyncMutexGuard<'_, Vec<Turn>> {
        // Poison is ignored: a push either happened or it did not.
        self.turns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the history as it stands now.
    pub fn turns(&self) -> Vec<Turn> {
        self.lock_turns().clone()
    }

    pub fn push(&self, role: Role, text: impl Into<String>) {
        self.lock_turns().push(Turn::new(role, text));
    }

    /// Serializes request/reply exchanges on this session. Reads and pushes
    /// do not need it.
    pub async fn begin_exchange(&self) -> MutexGuard<'_, ()> {
        self.exchange.lock().await
    }
}

pub type SessionHandle = Arc<Session>;

/// Optional bounds on how much history the process keeps.
///
/// Both default to `None`: sessions live until the process exits.
#[derive(Clone, Copy, Debug, Default)]
pub struct Retention {
    pub idle_ttl: Option<Duration>,
    pub max_sessions: Option<usize>,
}

struct Slot {
    handle: SessionHandle,
    last_active: Instant,
}

impl Slot {
    fn new(id: SessionId, now: Instant) -> Self {
        Self {
            handle: Arc::new(Session::new(id)),
            last_active: now,
        }
    }

    /// Someone besides the map holds the handle (e.g. a chat in flight).
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.handle) > 1
    }
}

#[derive(Default)]
pub struct SessionStore {
    slots: Mutex<HashMap<SessionId, Slot>>,
    retention: Retention,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(retention: Retention) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Start an empty session under a fresh random id.
    pub async fn create_session(&self) -> SessionId {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;

        let mut id = SessionId::generate();
        while slots.contains_key(&id) {
            id = SessionId::generate();
        }

        self.make_room(&mut slots);
        slots.insert(id.clone(), Slot::new(id.clone(), now));
        id
    }

    /// The session for `id`, created empty if it does not exist yet.
    pub async fn get_or_create(&self, id: &SessionId) -> SessionHandle {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;

        if let Some(slot) = slots.get_mut(id) {
            slot.last_active = now;
            return slot.handle.clone();
        }

        self.make_room(&mut slots);
        let slot = Slot::new(id.clone(), now);
        let handle = slot.handle.clone();
        slots.insert(id.clone(), slot);
        handle
    }

    pub async fn append_turn(&self, id: &SessionId, role: Role, text: impl Into<String>) {
        self.get_or_create(id).await.push(role, text);
    }

    /// Snapshot of a session's history; `None` if the id is unknown.
    ///
    /// Does not wait for an exchange in flight on the same session.
    pub async fn turns(&self, id: &SessionId) -> Option<Vec<Turn>> {
        let slots = self.slots.lock().await;
        slots.get(id).map(|slot| slot.handle.turns())
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Drop sessions idle longer than the configured TTL. Returns how many went.
    pub async fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now()).await
    }

    pub async fn sweep_idle_at(&self, now: Instant) -> usize {
        let Some(ttl) = self.retention.idle_ttl else {
            return 0;
        };
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|_, slot| slot.in_use() || now.duration_since(slot.last_active) <= ttl);
        before - slots.len()
    }

    /// Evict least recently active idle sessions until one more fits.
    fn make_room(&self, slots: &mut HashMap<SessionId, Slot>) {
        let Some(max) = self.retention.max_sessions else {
            return;
        };
        while slots.len() >= max {
            let victim = slots
                .iter()
                .filter(|(_, slot)| !slot.in_use())
                .min_by_key(|(_, slot)| slot.last_active)
                .map(|(id, _)| id.clone());
            let Some(victim) = victim else {
                tracing::warn!(
                    sessions = slots.len(),
                    max,
                    "session capacity reached but every session is busy"
                );
                return;
            };
            slots.remove(&victim);
            tracing::debug!(session_id = %victim, "evicted least recently active session");
        }
    }
}
