//! Validation guards: structural correctness of the input and context.

use crate::core::{Guard, GuardFamily, Verdict};
use crate::error::Denial;
use crate::guards::reasons::INVALID_AMOUNT;

fn decide(id: &str, ok: bool, reason: impl Into<String>) -> Verdict {
    if ok {
        Verdict::allow(id)
    } else {
        Verdict::Deny(Denial::rejected(id, reason))
    }
}

/// Parse a positive integral amount in minor units.
pub fn parse_amount(input: &str) -> Option<i64> {
    input.trim().parse::<i64>().ok().filter(|amount| *amount > 0)
}

fn is_pin(input: &str, length: usize) -> bool {
    input.len() == length && input.chars().all(|c| c.is_ascii_digit())
}

/// Input is exactly `length` ASCII digits.
pub fn pin_format(length: usize) -> Guard {
    let id = "valid.pin_format".to_string();
    Guard::local(id.clone(), GuardFamily::Validation, move |_, _, input| {
        decide(
            &id,
            is_pin(input, length),
            format!("PIN must be {} digits", length),
        )
    })
}

/// Like [`pin_format`], with the length taken from `pin.length`.
pub fn configured_pin_format() -> Guard {
    Guard::local(
        "valid.pin_format",
        GuardFamily::Validation,
        |env, _, input| {
            let length = env.config.pin.length;
            decide(
                "valid.pin_format",
                is_pin(input, length),
                format!("PIN must be {} digits", length),
            )
        },
    )
}

/// Input is an amount in `min..=max`.
pub fn amount_between(min: i64, max: i64) -> Guard {
    let id = format!("valid.amount({}..={})", min, max);
    Guard::local(id.clone(), GuardFamily::Validation, move |_, _, input| {
        let ok = parse_amount(input).is_some_and(|amount| (min..=max).contains(&amount));
        decide(&id, ok, INVALID_AMOUNT)
    })
}

/// Input is a positive amount no larger than `transaction.max_single_amount`.
pub fn amount_within_single_limit() -> Guard {
    Guard::local(
        "valid.single_amount",
        GuardFamily::Validation,
        |env, _, input| match parse_amount(input) {
            None => decide("valid.single_amount", false, INVALID_AMOUNT),
            Some(amount) => decide(
                "valid.single_amount",
                amount <= env.config.transaction.max_single_amount,
                "amount exceeds single transaction limit",
            ),
        },
    )
}

/// Input is one or more ASCII digits.
pub fn numeric() -> Guard {
    Guard::local("valid.numeric", GuardFamily::Validation, |_, _, input| {
        decide(
            "valid.numeric",
            !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()),
            "input must be numeric",
        )
    })
}

pub fn non_empty() -> Guard {
    Guard::local("valid.non_empty", GuardFamily::Validation, |_, _, input| {
        decide("valid.non_empty", !input.trim().is_empty(), "input required")
    })
}

/// Input equals the value previously stored under `field`, e.g. a PIN
/// confirmation.
pub fn matches_field(field: &str, reason: &str) -> Guard {
    let id = format!("valid.matches({})", field);
    let (field, reason) = (field.to_string(), reason.to_string());
    Guard::local(id.clone(), GuardFamily::Validation, move |_, ctx, input| {
        decide(&id, ctx.field(&field) == Some(input), reason.as_str())
    })
}

/// The context already holds a value for `field`.
pub fn field_present(field: &str) -> Guard {
    let id = format!("valid.present({})", field);
    let field = field.to_string();
    Guard::local(id.clone(), GuardFamily::Validation, move |_, ctx, _| {
        decide(&id, ctx.field(&field).is_some(), format!("{} missing", field))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::MachineContext;
    use crate::env::EngineEnv;
    use crate::guards::GuardEngine;
    use crate::port::InMemoryQueryPort;
    use std::sync::Arc;

    async fn check_with(guard: &Guard, ctx: &MachineContext, input: &str) -> Verdict {
        let mut config = EngineConfig::default();
        config.pin.length = 5;
        config.transaction.max_single_amount = 1_000;
        let env = EngineEnv::new(config, Arc::new(InMemoryQueryPort::new()));
        GuardEngine::new(&env).evaluate(guard, ctx, input).await
    }

    async fn check(guard: &Guard, input: &str) -> Verdict {
        check_with(guard, &MachineContext::new("s1", "254700", "*123#"), input).await
    }

    #[test]
    fn parse_amount_rejects_non_positive() {
        assert_eq!(parse_amount("250"), Some(250));
        assert_eq!(parse_amount("0"), None);
        assert_eq!(parse_amount("-4"), None);
        assert_eq!(parse_amount("12.5"), None);
    }

    #[tokio::test]
    async fn pin_format_requires_exact_digits() {
        let guard = pin_format(4);
        assert!(check(&guard, "1234").await.is_allowed());
        assert!(!check(&guard, "123").await.is_allowed());
        assert!(!check(&guard, "12a4").await.is_allowed());
        let verdict = check(&guard, "12345").await;
        assert_eq!(verdict.denial().unwrap().reason, "PIN must be 4 digits");
    }

    #[tokio::test]
    async fn configured_pin_format_reads_config() {
        let guard = configured_pin_format();
        assert!(check(&guard, "12345").await.is_allowed());
        assert!(!check(&guard, "1234").await.is_allowed());
    }

    #[tokio::test]
    async fn amount_bounds() {
        let guard = amount_between(10, 100);
        assert!(check(&guard, "10").await.is_allowed());
        assert!(check(&guard, "100").await.is_allowed());
        let verdict = check(&guard, "101").await;
        assert_eq!(verdict.denial().unwrap().reason, "invalid amount");
    }

    #[tokio::test]
    async fn single_amount_limit_from_config() {
        let guard = amount_within_single_limit();
        assert!(check(&guard, "1000").await.is_allowed());
        assert_eq!(
            check(&guard, "1001").await.denial().unwrap().reason,
            "amount exceeds single transaction limit"
        );
        assert_eq!(
            check(&guard, "abc").await.denial().unwrap().reason,
            "invalid amount"
        );
    }

    #[tokio::test]
    async fn matches_field_compares_with_context() {
        let ctx = MachineContext::new("s1", "254700", "*123#").with_field("new_pin", "4321");
        let guard = matches_field("new_pin", "PINs do not match");

        assert!(check_with(&guard, &ctx, "4321").await.is_allowed());
        let verdict = check_with(&guard, &ctx, "1234").await;
        assert_eq!(verdict.denial().unwrap().reason, "PINs do not match");
    }

    #[tokio::test]
    async fn simple_structural_checks() {
        assert!(check(&numeric(), "0712").await.is_allowed());
        assert!(!check(&numeric(), "").await.is_allowed());
        assert!(!check(&non_empty(), "  ").await.is_allowed());
        assert!(!check(&field_present("amount"), "").await.is_allowed());
    }
}
