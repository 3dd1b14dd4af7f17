//! In-memory conversation store.
//!
//! The outer map lock is only held for lookup, insert and removal. Each
//! conversation sits behind its own async mutex, held by the controller for
//! a whole turn, so turns for one id are serialized while distinct ids run
//! in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::slots::SlotState;
use crate::types::{ConversationPhase, SessionSnapshot, StructuredData};

/// A fan-out result together with the slot snapshot it was computed from.
#[derive(Debug, Clone)]
pub struct CachedOutcome {
    pub slots: SlotState,
    pub data: StructuredData,
}

/// State of one conversation.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub id: String,
    pub slots: SlotState,
    pub phase: ConversationPhase,
    pub turn_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_outcome: Option<CachedOutcome>,
    last_seen: Instant,
}

impl ConversationSession {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            slots: SlotState::new(),
            phase: ConversationPhase::Gathering,
            turn_count: 0,
            created_at: now,
            last_activity: now,
            last_outcome: None,
            last_seen: Instant::now(),
        }
    }

    /// Mark the start of a new turn.
    pub fn touch(&mut self) {
        self.turn_count += 1;
        self.last_activity = Utc::now();
        self.last_seen = Instant::now();
    }

    pub fn is_complete(&self) -> bool {
        self.phase == ConversationPhase::Complete
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.elapsed()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversation_id: self.id.clone(),
            phase: self.phase,
            slots: self.slots.clone(),
            turn_count: self.turn_count,
            created_at: self.created_at,
            last_activity: self.last_activity,
            last_outcome: self.last_outcome.as_ref().map(|c| c.data.clone()),
        }
    }

    /// Number of slots with a value.
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|(_, v)| v.is_some()).count()
    }
}

pub type SessionHandle = Arc<tokio::sync::Mutex<ConversationSession>>;

/// Maps conversation ids to sessions.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    ttl: Option<Duration>,
}

impl SessionStore {
    /// Store whose sessions never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that evicts sessions idle longer than `ttl`.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Return the session for `id`, creating an empty one if unseen.
    pub fn get_or_create(&self, id: &str) -> SessionHandle {
        let mut sessions = self.lock();
        Arc::clone(sessions.entry(id.to_string()).or_insert_with(|| {
            debug!(conversation_id = %id, "Creating conversation session");
            Arc::new(tokio::sync::Mutex::new(ConversationSession::new(id)))
        }))
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.lock().get(id).cloned()
    }

    /// Drop a session. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Whether `handle` is still the session stored under `id`.
    ///
    /// False once the session was removed or replaced after the handle
    /// was taken.
    pub fn is_current(&self, id: &str, handle: &SessionHandle) -> bool {
        self.lock()
            .get(id)
            .is_some_and(|stored| Arc::ptr_eq(stored, handle))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Drop sessions idle for longer than the TTL.
    ///
    /// Sessions that a turn holds a handle to, or has locked, are in use
    /// and are kept. Returns the number evicted.
    pub fn evict_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        self.evict_idle_longer_than(ttl)
    }

    fn evict_idle_longer_than(&self, ttl: Duration) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, handle| {
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            match handle.try_lock() {
                Ok(session) => session.idle_for() <= ttl,
                Err(_) => true,
            }
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
