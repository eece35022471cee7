//! Process-wide mapping from session id to [`Session`].
//!
//! A single [`parking_lot::Mutex`] protects the map, held only for the
//! duration of an insert/remove/lookup — never across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::Session;

/// Process-wide session registry. Cheap to clone; all clones share the
/// same underlying map.
#[derive(Clone, Default)]
pub struct Registry(Arc<Mutex<HashMap<Uuid, Arc<Session>>>>);

impl Registry {
    /// A new, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly-connected session. Called once the backend TCP
    /// connection completes successfully.
    pub fn insert(&self, session: Arc<Session>) {
        metrics::gauge!(crate::metrics::SESSIONS_OPEN).increment(1.0);
        self.0.lock().insert(session.id, session);
    }

    /// Look up a session by id. A removed entry is never returned.
    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.0.lock().get(id).cloned()
    }

    /// Remove a session, e.g. on backend socket close. Idempotent: a
    /// second removal for the same id is a harmless no-op, which is what
    /// makes delete-on-close safe to call from more than one close path.
    pub fn remove(&self, id: &Uuid) {
        if self.0.lock().remove(id).is_some() {
            metrics::gauge!(crate::metrics::SESSIONS_OPEN).decrement(1.0);
        }
    }

    /// Number of sessions currently tracked. Used by the idle-session
    /// reaper to decide whether there is anything worth scanning.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Snapshot of all currently-registered sessions, for the idle
    /// reaper's sweep. Cloning the `Arc`s out of the lock keeps the lock
    /// held only briefly.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.0.lock().values().cloned().collect()
    }
}
