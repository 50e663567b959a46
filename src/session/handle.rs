//! A session and the handle the registry shares out for it.

use crate::core::{MachineContext, MachineDefinition};
use crate::runtime::MachineRuntime;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, MutexGuard};

/// What a session is created from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSeed {
    pub session_id: String,
    pub identity_key: String,
    pub service_code: String,
    /// Defaults to `en`
    pub locale: String,
}

impl SessionSeed {
    pub fn new(
        session_id: impl Into<String>,
        identity_key: impl Into<String>,
        service_code: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            identity_key: identity_key.into(),
            service_code: service_code.into(),
            locale: "en".to_string(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }
}

/// One user's conversation: identifiers plus the root runtime.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: String,
    pub identity_key: String,
    pub service_code: String,
    pub locale: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Root runtime; children hang off it
    pub runtime: MachineRuntime,
}

impl Session {
    /// Start a session at the root definition's initial state.
    pub fn start(seed: SessionSeed, root: Arc<MachineDefinition>, now: DateTime<Utc>) -> Self {
        let context = MachineContext::new(&seed.session_id, &seed.identity_key, &seed.service_code)
            .with_locale(&seed.locale);
        Self {
            runtime: MachineRuntime::start(root, context),
            id: seed.session_id,
            identity_key: seed.identity_key,
            service_code: seed.service_code,
            locale: seed.locale,
            created_at: now,
        }
    }
}

/// Shared handle to a live session.
///
/// The async mutex serializes dispatches for this session. Idle time is
/// tracked outside it so sweeps never wait on an in-flight dispatch.
#[derive(Debug)]
pub struct SessionHandle {
    id: String,
    session: Mutex<Session>,
    last_activity: StdMutex<DateTime<Utc>>,
    evicted: AtomicBool,
}

impl SessionHandle {
    pub fn new(session: Session, now: DateTime<Utc>) -> Self {
        Self {
            id: session.id.clone(),
            session: Mutex::new(session),
            last_activity: StdMutex::new(now),
            evicted: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for exclusive access to the session.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().await
    }

    /// Record activity at `now`.
    pub fn touch(&self, now: DateTime<Utc>) {
        let mut last = self.last_activity.lock().unwrap_or_else(|p| p.into_inner());
        if now > *last {
            *last = now;
        }
    }

    /// Time of the last request that reached this session.
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Whether the session has been idle for strictly longer than `timeout`.
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_activity()) > timeout
    }

    /// Once evicted, results of dispatches still in flight are discarded.
    pub fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_evicted(&self) {
        self.evicted.store(true, Ordering::SeqCst);
    }
}
