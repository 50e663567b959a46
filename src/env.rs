//! Environment shared by guards and runtimes.
//!
//! Bundles configuration, service flags, the external query port, the
//! clock, and the per-identity trackers. One instance serves every session.

use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, SystemConfig};
use crate::error::{Denial, ErrorKind};
use crate::guards::reasons;
use crate::limits::{PinLockoutTracker, RateLimiter, TransactionLimitEnforcer};
use crate::port::{ExternalQueryPort, QueryError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Service availability and maintenance flags.
///
/// Seeded from configuration; operators may flip them while sessions are
/// live and the next dispatch observes the change.
///
/// # Example
/// ```
/// use menuflow::config::SystemConfig;
/// use menuflow::env::ServiceStatus;
/// use menuflow::ErrorKind;
///
/// let status = ServiceStatus::from_config(&SystemConfig::default());
/// assert!(status.check().is_ok());
///
/// status.set_maintenance(true);
/// let denial = status.check().unwrap_err();
/// assert_eq!(denial.kind, ErrorKind::ServiceUnavailable);
/// assert_eq!(denial.guard, "system.maintenance");
/// ```
#[derive(Debug)]
pub struct ServiceStatus {
    available: AtomicBool,
    maintenance: AtomicBool,
}

impl ServiceStatus {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            available: AtomicBool::new(config.service_available),
            maintenance: AtomicBool::new(config.maintenance_mode),
        }
    }

    /// Turn maintenance mode on or off for all sessions.
    pub fn set_maintenance(&self, on: bool) {
        info!(maintenance = on, "maintenance mode changed");
        self.maintenance.store(on, Ordering::SeqCst);
    }

    /// Switch the whole service on or off.
    pub fn set_available(&self, available: bool) {
        info!(available, "service availability changed");
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_maintenance(&self) -> bool {
        self.maintenance.load(Ordering::SeqCst)
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Deny when in maintenance or switched off; maintenance wins.
    pub fn check(&self) -> Result<(), Denial> {
        if self.is_maintenance() {
            return Err(Denial::new(
                ErrorKind::ServiceUnavailable,
                "system.maintenance",
                reasons::SERVICE_UNAVAILABLE,
            ));
        }
        if !self.is_available() {
            return Err(Denial::new(
                ErrorKind::ServiceUnavailable,
                "system.service",
                reasons::SERVICE_UNAVAILABLE,
            ));
        }
        Ok(())
    }
}

/// Everything guards and runtimes read besides the session itself.
pub struct EngineEnv {
    pub config: Arc<EngineConfig>,
    /// Live service flags
    pub status: Arc<ServiceStatus>,
    /// Identity, balance and claim lookups
    pub port: Arc<dyn ExternalQueryPort>,
    pub clock: Arc<dyn Clock>,
    /// PIN failures, shared across sessions
    pub lockout: Arc<PinLockoutTracker>,
    /// Daily transfer totals, shared across sessions
    pub transactions: Arc<TransactionLimitEnforcer>,
    /// Per-identity request budget
    pub rate_limiter: Arc<RateLimiter>,
}

impl EngineEnv {
    /// Environment on the system clock with trackers built from `config`.
    pub fn new(config: EngineConfig, port: Arc<dyn ExternalQueryPort>) -> Self {
        Self::with_clock(config, port, Arc::new(SystemClock::new()))
    }

    /// Environment with an explicit time source.
    pub fn with_clock(
        config: EngineConfig,
        port: Arc<dyn ExternalQueryPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            status: Arc::new(ServiceStatus::from_config(&config.system)),
            lockout: Arc::new(PinLockoutTracker::from_config(&config.pin)),
            transactions: Arc::new(TransactionLimitEnforcer::from_config(&config.transaction)),
            rate_limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            config: Arc::new(config),
            port,
            clock,
        }
    }

    /// Run an external query under the configured timeout.
    pub async fn query<T, F>(&self, query: F) -> Result<T, QueryError>
    where
        F: Future<Output = Result<T, QueryError>>,
    {
        match tokio::time::timeout(self.config.external.timeout(), query).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout),
        }
    }
}

impl std::fmt::Debug for EngineEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEnv")
            .field("config", &self.config)
            .field("status", &self.status)
            .field("clock", &self.clock)
            .finish()
    }
}
