//! Concurrent session store with idle expiry.

use crate::checkpoint::{CheckpointError, SessionCheckpoint};
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::core::MachineDefinition;
use crate::error::EngineError;
use crate::runtime::MachineRuntime;
use crate::session::handle::{Session, SessionHandle, SessionSeed};
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What to do when a request names a session that has expired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Continuity {
    /// Start a fresh session under the same identifier
    #[default]
    Restart,
    /// Fail with `SessionExpired`
    Require,
}

/// Outcome of [`SessionRegistry::resolve`].
#[derive(Clone, Debug)]
pub struct Resolved {
    /// Handle to lock before dispatching
    pub handle: Arc<SessionHandle>,
    /// The session was created by this call
    pub created: bool,
    /// The identifier referred to an expired session that was replaced
    pub expired: bool,
}

/// Live sessions keyed by session identifier.
///
/// Lookups and inserts on different identifiers never contend; dispatches
/// on one identifier are serialized by its [`SessionHandle`].
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
    /// Identifiers removed by a sweep, kept for one timeout so a late
    /// request can be told its session expired
    expired: DashMap<String, DateTime<Utc>>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    /// Empty registry expiring sessions idle for longer than `timeout`.
    ///
    /// # Example
    /// ```
    /// use menuflow::clock::SystemClock;
    /// use menuflow::core::{MachineDefinition, Output};
    /// use menuflow::session::{Continuity, SessionRegistry, SessionSeed};
    /// use chrono::Duration;
    /// use std::sync::Arc;
    ///
    /// let flow = MachineDefinition::builder("menu")
    ///     .initial("home")
    ///     .state("home")
    ///     .final_state("bye", Output::new("closed"))
    ///     .build()
    ///     .unwrap();
    ///
    /// let registry = SessionRegistry::new(Duration::minutes(3), Arc::new(SystemClock::new()));
    /// let seed = SessionSeed::new("s1", "254700", "*100#");
    /// let first = registry.resolve(seed.clone(), &flow, Continuity::Restart).unwrap();
    /// let again = registry.resolve(seed, &flow, Continuity::Restart).unwrap();
    ///
    /// assert!(first.created);
    /// assert!(!again.created);
    /// assert_eq!(registry.len(), 1);
    /// ```
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            expired: DashMap::new(),
            timeout,
            clock,
        }
    }

    pub fn from_config(config: &SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.timeout(), clock)
    }

    /// Idle time after which sessions expire.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Find the live session for `seed.session_id`, or create one at the
    /// root definition's initial state.
    ///
    /// A session idle for longer than the timeout is evicted here even if
    /// no sweep has run yet. Finding a live session counts as activity.
    pub fn resolve(
        &self,
        seed: SessionSeed,
        root: &Arc<MachineDefinition>,
        continuity: Continuity,
    ) -> Result<Resolved, EngineError> {
        let now = self.clock.now();
        let id = seed.session_id.clone();

        let expired = match self.get(&id) {
            Some(existing) if !existing.is_idle(now, self.timeout) => {
                existing.touch(now);
                return Ok(Resolved {
                    handle: existing,
                    created: false,
                    expired: false,
                });
            }
            Some(stale) => {
                self.remove_handle(&id, &stale);
                true
            }
            None => self.expired.remove(&id).is_some(),
        };

        if expired {
            debug!(session = %id, "request for expired session");
            if continuity == Continuity::Require {
                return Err(EngineError::SessionExpired { session_id: id });
            }
        }

        match self.sessions.entry(id) {
            Entry::Occupied(entry) => {
                // Created concurrently by another request
                let handle = Arc::clone(entry.get());
                handle.touch(now);
                Ok(Resolved {
                    handle,
                    created: false,
                    expired,
                })
            }
            Entry::Vacant(entry) => {
                let session = Session::start(seed, Arc::clone(root), now);
                info!(
                    session = %session.id,
                    identity = %session.identity_key,
                    flow = %root.name(),
                    "session created"
                );
                let handle = Arc::new(SessionHandle::new(session, now));
                entry.insert(Arc::clone(&handle));
                Ok(Resolved {
                    handle,
                    created: true,
                    expired,
                })
            }
        }
    }

    /// Live handle for `session_id`, without touching its idle clock.
    pub fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Record activity on a live session.
    pub fn touch(&self, session_id: &str) {
        if let Some(handle) = self.get(session_id) {
            handle.touch(self.clock.now());
        }
    }

    /// Remove a session immediately (terminal state or cancellation).
    pub fn evict(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, handle)) => {
                handle.mark_evicted();
                debug!(session = %session_id, "session evicted");
                true
            }
            None => false,
        }
    }

    /// Evict every session idle for longer than the timeout. Returns how
    /// many were removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let stale: Vec<(String, Arc<SessionHandle>)> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle(now, self.timeout))
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut removed = 0;
        for (id, handle) in stale {
            if self.remove_handle(&id, &handle) {
                self.expired.insert(id, now);
                removed += 1;
            }
        }

        let timeout = self.timeout;
        self.expired
            .retain(|_, at| now.signed_duration_since(*at) <= timeout);

        if removed > 0 {
            info!(removed, live = self.sessions.len(), "expired sessions swept");
        }
        removed
    }

    /// Remove `handle` only if it is still the one registered under `id`
    /// and still idle; a fresh session under the same id is left alone.
    fn remove_handle(&self, id: &str, handle: &Arc<SessionHandle>) -> bool {
        let now = self.clock.now();
        let timeout = self.timeout;
        let removed = self
            .sessions
            .remove_if(id, |_, current| {
                Arc::ptr_eq(current, handle) && current.is_idle(now, timeout)
            })
            .is_some();
        if removed {
            handle.mark_evicted();
        }
        removed
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Capture a live session. Waits for any in-flight dispatch on it.
    pub async fn checkpoint(&self, session_id: &str) -> Result<SessionCheckpoint, CheckpointError> {
        let handle = self
            .get(session_id)
            .ok_or_else(|| CheckpointError::SessionNotFound(session_id.to_string()))?;
        let session = handle.lock().await;

        Ok(SessionCheckpoint::new(
            &session.id,
            &session.identity_key,
            &session.service_code,
            &session.locale,
            session.created_at,
            handle.last_activity(),
            session.runtime.snapshot(),
            self.clock.now(),
        ))
    }

    /// Rebuild a session from a checkpoint against the current root
    /// definition, replacing any live session with the same identifier.
    pub fn restore(
        &self,
        checkpoint: SessionCheckpoint,
        root: &Arc<MachineDefinition>,
    ) -> Result<Arc<SessionHandle>, CheckpointError> {
        let runtime = MachineRuntime::restore(Arc::clone(root), checkpoint.runtime)?;
        let session = Session {
            id: checkpoint.session_id,
            identity_key: checkpoint.identity_key,
            service_code: checkpoint.service_code,
            locale: checkpoint.locale,
            created_at: checkpoint.created_at,
            runtime,
        };
        let id = session.id.clone();
        let handle = Arc::new(SessionHandle::new(session, self.clock.now()));

        if let Some(previous) = self.sessions.insert(id.clone(), Arc::clone(&handle)) {
            previous.mark_evicted();
        }
        self.expired.remove(&id);
        info!(session = %id, checkpoint = %checkpoint.id, "session restored");
        Ok(handle)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("expired", &self.expired.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
