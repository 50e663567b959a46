//! External query port consumed by domain guards.
//!
//! Identity, balance and claim lookups live outside the engine. Every call
//! may fail; domain guards turn failures into denials, never into allows.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Notify;

/// Failure outcomes of an external query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("External service unavailable: {0}")]
    Unavailable(String),

    #[error("External query timed out")]
    Timeout,
}

/// A claim as known by the claims collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub claim_id: String,
    /// Collaborator-defined status, e.g. `approved`
    pub status: String,
    /// Payout amount in minor units, once known
    pub amount: Option<i64>,
}

/// Collaborator queries used by domain guards.
#[async_trait]
pub trait ExternalQueryPort: Send + Sync {
    /// Current balance for the identity, in minor units.
    async fn get_balance(&self, identity_key: &str) -> Result<i64, QueryError>;

    /// Check a credential (PIN) for the identity.
    async fn verify_identity(&self, identity_key: &str, credential: &str)
        -> Result<bool, QueryError>;

    /// Fetch a claim by id.
    async fn lookup_claim(&self, claim_id: &str) -> Result<ClaimRecord, QueryError>;
}

/// In-memory port with call counting and failure injection.
///
/// An installed gate makes every call wait until the gate is notified,
/// which lets callers hold a query in flight.
///
/// # Example
/// ```
/// use menuflow::port::{ExternalQueryPort, InMemoryQueryPort, QueryError};
///
/// let port = InMemoryQueryPort::new();
/// port.set_balance("254700", 2_500);
///
/// let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
/// rt.block_on(async {
///     assert_eq!(port.get_balance("254700").await, Ok(2_500));
///
///     port.set_unavailable(true);
///     assert!(matches!(port.get_balance("254700").await, Err(QueryError::Unavailable(_))));
/// });
/// assert_eq!(port.calls(), 2);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryQueryPort {
    balances: DashMap<String, i64>,
    credentials: DashMap<String, String>,
    claims: DashMap<String, ClaimRecord>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl InMemoryQueryPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the balance returned for an identity.
    pub fn set_balance(&self, identity_key: &str, balance: i64) {
        self.balances.insert(identity_key.to_string(), balance);
    }

    /// Register the PIN that `verify_identity` accepts.
    pub fn set_credential(&self, identity_key: &str, pin: &str) {
        self.credentials
            .insert(identity_key.to_string(), pin.to_string());
    }

    pub fn add_claim(&self, record: ClaimRecord) {
        self.claims.insert(record.claim_id.clone(), record);
    }

    /// Make every subsequent call fail with `QueryError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of calls made so far, counted when a call starts.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Install a gate; calls block until it is notified once per call.
    pub fn install_gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        let mut slot = self.gate.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(Arc::clone(&gate));
        gate
    }

    async fn enter(&self) -> Result<(), QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self
            .gate
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueryError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExternalQueryPort for InMemoryQueryPort {
    async fn get_balance(&self, identity_key: &str) -> Result<i64, QueryError> {
        self.enter().await?;
        self.balances
            .get(identity_key)
            .map(|balance| *balance)
            .ok_or_else(|| QueryError::NotFound {
                what: "account".to_string(),
            })
    }

    async fn verify_identity(
        &self,
        identity_key: &str,
        credential: &str,
    ) -> Result<bool, QueryError> {
        self.enter().await?;
        match self.credentials.get(identity_key) {
            Some(pin) => Ok(pin.as_str() == credential),
            None => Err(QueryError::NotFound {
                what: "identity".to_string(),
            }),
        }
    }

    async fn lookup_claim(&self, claim_id: &str) -> Result<ClaimRecord, QueryError> {
        self.enter().await?;
        self.claims
            .get(claim_id)
            .map(|record| record.clone())
            .ok_or_else(|| QueryError::NotFound {
                what: "claim".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn balances_and_credentials_are_served() {
        let port = InMemoryQueryPort::new();
        port.set_balance("254700", 1_000);
        port.set_credential("254700", "1234");

        assert_eq!(port.get_balance("254700").await, Ok(1_000));
        assert_eq!(port.verify_identity("254700", "1234").await, Ok(true));
        assert_eq!(port.verify_identity("254700", "0000").await, Ok(false));
        assert_eq!(port.calls(), 3);
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let port = InMemoryQueryPort::new();
        assert!(matches!(
            port.lookup_claim("C-1").await,
            Err(QueryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn injected_failure_is_unavailable() {
        let port = InMemoryQueryPort::new();
        port.set_balance("254700", 1_000);
        port.set_unavailable(true);

        assert!(matches!(
            port.get_balance("254700").await,
            Err(QueryError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn gate_holds_calls_until_notified() {
        let port = Arc::new(InMemoryQueryPort::new());
        port.set_balance("254700", 5);
        let gate = port.install_gate();

        let task = {
            let port = Arc::clone(&port);
            tokio::spawn(async move { port.get_balance("254700").await })
        };

        while port.calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!task.is_finished());

        gate.notify_one();
        assert_eq!(task.await.unwrap(), Ok(5));
    }
}
