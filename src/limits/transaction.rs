//! Daily transaction limits with eager reservation.

use crate::config::TransactionConfig;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

/// Day-scoped totals for one identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionAccumulator {
    /// Local calendar day the totals belong to
    pub date: NaiveDate,
    /// Sum reserved on `date`
    pub total: i64,
    pub count: u32,
}

/// Proof of a reservation, used to release it if the downstream transfer
/// fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reservation {
    pub identity_key: String,
    pub date: NaiveDate,
    /// Amount added to the accumulator
    pub amount: i64,
}

/// Why a transaction was refused. Display strings double as denial reasons.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LimitViolation {
    #[error("invalid amount")]
    InvalidAmount { amount: i64 },

    #[error("daily limit exceeded")]
    DailyLimitExceeded { limit: i64, attempted_total: i64 },

    #[error("daily transaction count exceeded")]
    DailyCountExceeded { max: u32 },

    #[error("insufficient balance")]
    BelowMinimumBalance { minimum: i64, resulting: i64 },
}

/// Daily amount and count limits per identity, plus a minimum
/// remaining balance.
///
/// Checking and reserving happen under one map entry lock, so two
/// concurrent transfers can never both fit under the same remaining limit.
#[derive(Debug)]
pub struct TransactionLimitEnforcer {
    accumulators: DashMap<String, TransactionAccumulator>,
    daily_limit: i64,
    daily_count: u32,
    minimum_balance: i64,
    offset: FixedOffset,
}

impl TransactionLimitEnforcer {
    /// Enforcer with explicit limits; `offset` decides where a day starts.
    pub fn new(daily_limit: i64, daily_count: u32, minimum_balance: i64, offset: FixedOffset) -> Self {
        Self {
            accumulators: DashMap::new(),
            daily_limit,
            daily_count,
            minimum_balance,
            offset,
        }
    }

    pub fn from_config(config: &TransactionConfig) -> Self {
        Self::new(
            config.daily_limit,
            config.daily_count,
            config.minimum_balance,
            config.timezone().unwrap_or_else(|| Utc.fix()),
        )
    }

    /// Calendar day of `now` in the configured timezone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Check all limits and, if they pass, add `amount` to today's totals
    /// in the same critical section.
    ///
    /// # Example
    /// ```
    /// use menuflow::limits::{LimitViolation, TransactionLimitEnforcer};
    /// use chrono::{FixedOffset, Utc};
    ///
    /// let offset = FixedOffset::east_opt(0).unwrap();
    /// let limits = TransactionLimitEnforcer::new(1_000, 5, 0, offset);
    /// let now = Utc::now();
    ///
    /// limits.check_and_reserve("254700", 700, 5_000, now).unwrap();
    /// let refused = limits.check_and_reserve("254700", 400, 5_000, now);
    /// assert!(matches!(refused, Err(LimitViolation::DailyLimitExceeded { .. })));
    /// assert_eq!(limits.accumulator("254700").unwrap().total, 700);
    /// ```
    pub fn check_and_reserve(
        &self,
        identity_key: &str,
        amount: i64,
        balance: i64,
        now: DateTime<Utc>,
    ) -> Result<Reservation, LimitViolation> {
        if amount <= 0 {
            return Err(LimitViolation::InvalidAmount { amount });
        }

        let today = self.local_date(now);
        let mut acc = self
            .accumulators
            .entry(identity_key.to_string())
            .or_insert_with(|| TransactionAccumulator {
                date: today,
                total: 0,
                count: 0,
            });

        if acc.date != today {
            acc.date = today;
            acc.total = 0;
            acc.count = 0;
        }

        if acc.count >= self.daily_count {
            return Err(LimitViolation::DailyCountExceeded {
                max: self.daily_count,
            });
        }

        let attempted_total = acc.total.saturating_add(amount);
        if attempted_total > self.daily_limit {
            return Err(LimitViolation::DailyLimitExceeded {
                limit: self.daily_limit,
                attempted_total,
            });
        }

        let resulting = balance.saturating_sub(amount);
        if resulting < self.minimum_balance {
            return Err(LimitViolation::BelowMinimumBalance {
                minimum: self.minimum_balance,
                resulting,
            });
        }

        acc.total = attempted_total;
        acc.count += 1;
        debug!(identity = %identity_key, amount, total = acc.total, "transaction reserved");

        Ok(Reservation {
            identity_key: identity_key.to_string(),
            date: today,
            amount,
        })
    }

    /// Give back a reservation whose transfer failed. Has no effect once the
    /// accumulator has rolled over to another day.
    pub fn release(&self, reservation: &Reservation) -> bool {
        match self.accumulators.get_mut(&reservation.identity_key) {
            Some(mut acc) if acc.date == reservation.date => {
                acc.total = acc.total.saturating_sub(reservation.amount).max(0);
                acc.count = acc.count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Today's (or the last recorded day's) totals for an identity.
    pub fn accumulator(&self, identity_key: &str) -> Option<TransactionAccumulator> {
        self.accumulators.get(identity_key).map(|acc| acc.clone())
    }
}
