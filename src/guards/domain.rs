//! Domain guards backed by the external query port.
//!
//! These are the only guards that perform I/O. Query failures and timeouts
//! become `ExternalUnavailable` denials; none of them ever allows.

use crate::core::{DomainCheck, Guard, MachineContext, Verdict};
use crate::env::EngineEnv;
use crate::error::{Denial, ErrorKind};
use crate::guards::reasons::{
    ACCOUNT_NOT_FOUND, BALANCE_UNAVAILABLE, CLAIMS_UNAVAILABLE, CLAIM_NOT_FOUND,
    IDENTITY_UNAVAILABLE, INSUFFICIENT_BALANCE, INVALID_AMOUNT, INVALID_PIN, LOCKED,
};
use crate::guards::validation::parse_amount;
use crate::port::QueryError;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Where a domain guard reads the transaction amount from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AmountSource {
    /// The current input
    Input,
    /// A context field captured by an earlier step
    Field(String),
}

impl AmountSource {
    /// Read the amount from a captured context field.
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    fn resolve(&self, context: &MachineContext, input: &str) -> Option<i64> {
        match self {
            Self::Input => parse_amount(input),
            Self::Field(name) => context.field(name).and_then(parse_amount),
        }
    }
}

fn query_failure(id: &str, error: &QueryError, unavailable: &str, not_found: &str) -> Denial {
    match error {
        QueryError::NotFound { .. } => Denial::rejected(id, not_found),
        other => {
            warn!(guard = id, error = %other, "external query failed");
            Denial::unavailable(id, unavailable)
        }
    }
}

struct PinAuthenticated;

#[async_trait]
impl DomainCheck for PinAuthenticated {
    async fn check(&self, env: &EngineEnv, context: &MachineContext, input: &str) -> Verdict {
        const ID: &str = "domain.pin";
        let key = context.identity_key.as_str();

        if env.lockout.is_locked(key, env.clock.now()) {
            return Verdict::Deny(Denial::new(ErrorKind::Locked, ID, LOCKED).with_attempts_remaining(0));
        }

        match env.query(env.port.verify_identity(key, input)).await {
            Ok(true) => {
                env.lockout.record_success(key);
                Verdict::allow(ID)
            }
            Ok(false) => {
                // The threshold-reaching attempt still reports the wrong PIN;
                // later attempts see the lock before any query.
                let status = env.lockout.record_failure(key, env.clock.now());
                Verdict::Deny(
                    Denial::rejected(ID, INVALID_PIN).with_attempts_remaining(status.attempts_remaining),
                )
            }
            Err(error) => Verdict::Deny(query_failure(
                ID,
                &error,
                IDENTITY_UNAVAILABLE,
                "identity not found",
            )),
        }
    }
}

/// The input is the identity's PIN.
///
/// Consults the lockout tracker first; a locked identity is denied without
/// querying the port. Failed verifications count towards the lockout and
/// report the attempts left.
pub fn pin_authenticated() -> Guard {
    Guard::domain("domain.pin", PinAuthenticated)
}

struct BalanceCovers {
    id: String,
    source: AmountSource,
}

#[async_trait]
impl DomainCheck for BalanceCovers {
    async fn check(&self, env: &EngineEnv, context: &MachineContext, input: &str) -> Verdict {
        let Some(amount) = self.source.resolve(context, input) else {
            return Verdict::Deny(Denial::rejected(self.id.as_str(), INVALID_AMOUNT));
        };
        match env.query(env.port.get_balance(&context.identity_key)).await {
            Ok(balance) => {
                let required = env.config.transaction.minimum_balance.saturating_add(amount);
                if balance >= required {
                    Verdict::allow(self.id.as_str())
                } else {
                    Verdict::Deny(Denial::rejected(self.id.as_str(), INSUFFICIENT_BALANCE))
                }
            }
            Err(error) => Verdict::Deny(query_failure(
                &self.id,
                &error,
                BALANCE_UNAVAILABLE,
                ACCOUNT_NOT_FOUND,
            )),
        }
    }
}

/// The balance covers the amount and still keeps the configured minimum.
pub fn balance_covers(source: AmountSource) -> Guard {
    let id = "domain.balance".to_string();
    Guard::domain(id.clone(), BalanceCovers { id, source })
}

struct WithinTransactionLimits {
    id: String,
    source: AmountSource,
}

#[async_trait]
impl DomainCheck for WithinTransactionLimits {
    async fn check(&self, env: &EngineEnv, context: &MachineContext, input: &str) -> Verdict {
        let Some(amount) = self.source.resolve(context, input) else {
            return Verdict::Deny(Denial::rejected(self.id.as_str(), INVALID_AMOUNT));
        };
        let key = context.identity_key.as_str();
        let balance = match env.query(env.port.get_balance(key)).await {
            Ok(balance) => balance,
            Err(error) => {
                return Verdict::Deny(query_failure(
                    &self.id,
                    &error,
                    BALANCE_UNAVAILABLE,
                    ACCOUNT_NOT_FOUND,
                ))
            }
        };

        match env
            .transactions
            .check_and_reserve(key, amount, balance, env.clock.now())
        {
            Ok(reservation) => {
                debug!(identity = %key, amount = reservation.amount, "limits passed");
                Verdict::allow(self.id.as_str())
            }
            Err(violation) => Verdict::Deny(Denial::rejected(self.id.as_str(), violation.to_string())),
        }
    }

    fn reserves(&self) -> bool {
        true
    }
}

/// Daily total, daily count and minimum balance all hold for the amount.
///
/// Passing reserves the amount against today's totals. A denied transition
/// never holds a reservation: the builder rejects chains that evaluate
/// anything after this guard or wrap it in OR / NOT. Use
/// [`crate::limits::TransactionLimitEnforcer::release`] when the downstream
/// transfer fails.
pub fn within_transaction_limits(source: AmountSource) -> Guard {
    let id = "domain.limits".to_string();
    Guard::domain(id.clone(), WithinTransactionLimits { id, source })
}

struct ClaimExists;

#[async_trait]
impl DomainCheck for ClaimExists {
    async fn check(&self, env: &EngineEnv, _context: &MachineContext, input: &str) -> Verdict {
        const ID: &str = "domain.claim";
        match env.query(env.port.lookup_claim(input)).await {
            Ok(_) => Verdict::allow(ID),
            Err(error) => Verdict::Deny(query_failure(ID, &error, CLAIMS_UNAVAILABLE, CLAIM_NOT_FOUND)),
        }
    }
}

/// The input names a claim known to the claims service.
pub fn claim_exists() -> Guard {
    Guard::domain("domain.claim", ClaimExists)
}
