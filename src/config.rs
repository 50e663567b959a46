//! Engine configuration.
//!
//! Policy values (PIN attempts, transaction limits, rate limits, session
//! timeout, service flags) are injected as one immutable structure at
//! startup. Every field has a default so partial documents are accepted.

use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Complete engine policy.
///
/// # Example
/// ```
/// use menuflow::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{ "pin": { "max_attempts": 5 } }"#).unwrap();
/// assert_eq!(config.pin.max_attempts, 5);
/// assert_eq!(config.session.timeout_minutes, 3);
///
/// assert!(EngineConfig::from_json_str(r#"{ "pin": { "length": 0 } }"#).is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pin: PinConfig,
    pub transaction: TransactionConfig,
    pub rate_limit: RateLimitConfig,
    /// Idle timeout and sweep period
    pub session: SessionConfig,
    /// Initial service flags; changed at runtime through `ServiceStatus`
    pub system: SystemConfig,
    /// Bounds on external queries
    pub external: ExternalConfig,
}

/// PIN format and lockout policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// Consecutive failures that trigger a lockout
    pub max_attempts: u32,
    /// How long a lockout lasts; 0 disables lockouts
    pub lockout_minutes: i64,
    /// Exact number of digits a PIN must have
    pub length: usize,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            lockout_minutes: 30,
            length: 4,
        }
    }
}

impl PinConfig {
    pub fn lockout_duration(&self) -> Duration {
        Duration::minutes(self.lockout_minutes)
    }
}

/// Amounts are integral minor units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Maximum total reserved per identity per calendar day
    pub daily_limit: i64,
    /// Maximum number of transfers per identity per calendar day
    pub daily_count: u32,
    /// Balance that must remain after a transfer
    pub minimum_balance: i64,
    /// Largest amount accepted for one transfer
    pub max_single_amount: i64,
    /// Offset from UTC defining where a calendar day starts
    pub utc_offset_minutes: i32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            daily_limit: 50_000,
            daily_count: 10,
            minimum_balance: 0,
            max_single_amount: 50_000,
            utc_offset_minutes: 0,
        }
    }
}

impl TransactionConfig {
    /// `None` when the offset is outside +/-24h.
    pub fn timezone(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
    }
}

/// Fixed-window request budget per identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per identity per window
    pub requests_per_window: u32,
    /// Window length; a window opens on the first request
    pub window_seconds: i64,
    /// Extra idle time before a finished window is dropped from memory
    pub grace_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 30,
            window_seconds: 60,
            grace_seconds: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_seconds)
    }

    pub fn grace(&self) -> Duration {
        Duration::seconds(self.grace_seconds)
    }
}

/// Session lifetime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session expires
    pub timeout_minutes: i64,
    /// Period of the background sweeper
    pub sweep_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 3,
            sweep_interval_seconds: 30,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::minutes(self.timeout_minutes)
    }

    /// Sweeper period as a `std` duration, for `tokio::time`.
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds)
    }
}

/// Service flags at startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Initial value of the service switch
    pub service_available: bool,
    /// Start in maintenance mode
    pub maintenance_mode: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            service_available: true,
            maintenance_mode: false,
        }
    }
}

/// External query port settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    /// Upper bound on a single external query made by a domain guard
    pub timeout_ms: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

impl ExternalConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

// Upper bounds keep every derived duration far from chrono's overflow range.
const MAX_LOCKOUT_MINUTES: i64 = 365 * 24 * 60;
const MAX_WINDOW_SECONDS: i64 = 24 * 60 * 60;
const MAX_SESSION_MINUTES: i64 = 24 * 60;
const MAX_SWEEP_SECONDS: u64 = 24 * 60 * 60;
const MAX_EXTERNAL_TIMEOUT_MS: u64 = 10 * 60 * 1000;

fn require(ok: bool, message: &str) -> Validation<(), NonEmptyVec<String>> {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(message.to_string())
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every limit, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = vec![
            require(self.pin.max_attempts > 0, "pin.max_attempts must be positive"),
            require(
                (0..=MAX_LOCKOUT_MINUTES).contains(&self.pin.lockout_minutes),
                "pin.lockout_minutes must be between 0 and one year",
            ),
            require(self.pin.length > 0, "pin.length must be positive"),
            require(
                self.transaction.daily_limit > 0,
                "transaction.daily_limit must be positive",
            ),
            require(
                self.transaction.daily_count > 0,
                "transaction.daily_count must be positive",
            ),
            require(
                self.transaction.max_single_amount > 0,
                "transaction.max_single_amount must be positive",
            ),
            require(
                self.transaction.timezone().is_some(),
                "transaction.utc_offset_minutes is out of range",
            ),
            require(
                self.rate_limit.requests_per_window > 0,
                "rate_limit.requests_per_window must be positive",
            ),
            require(
                (1..=MAX_WINDOW_SECONDS).contains(&self.rate_limit.window_seconds),
                "rate_limit.window_seconds must be between 1 and one day",
            ),
            require(
                (0..=MAX_WINDOW_SECONDS).contains(&self.rate_limit.grace_seconds),
                "rate_limit.grace_seconds must be between 0 and one day",
            ),
            require(
                (1..=MAX_SESSION_MINUTES).contains(&self.session.timeout_minutes),
                "session.timeout_minutes must be between 1 and one day",
            ),
            require(
                (1..=MAX_SWEEP_SECONDS).contains(&self.session.sweep_interval_seconds),
                "session.sweep_interval_seconds must be between 1 and one day",
            ),
            require(
                (1..=MAX_EXTERNAL_TIMEOUT_MS).contains(&self.external.timeout_ms),
                "external.timeout_ms must be between 1 and ten minutes",
            ),
        ];

        match Validation::all_vec(checks).map(|_| ()) {
            Validation::Success(_) => Ok(()),
            Validation::Failure(errors) => Err(ConfigError::Invalid(errors.iter().cloned().collect())),
        }
    }
}
