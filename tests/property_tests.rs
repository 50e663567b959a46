//! Property-based tests for limits, history and runtime dispatch.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

mod common;

use chrono::{Duration, TimeZone, Utc};
use menuflow::core::{Event, MachineContext, StateHistory, TransitionRecord};
use menuflow::env::EngineEnv;
use menuflow::limits::{PinLockoutTracker, RateLimiter};
use menuflow::{EngineConfig, MachineRuntime};
use proptest::prelude::*;

fn base_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

prop_compose! {
    fn menu_input()(choice in 0..8u8, digits in "[0-9]{1,6}") -> String {
        match choice {
            0 => "1".to_string(),
            1 => "2".to_string(),
            2 => "0".to_string(),
            3 => common::PIN.to_string(),
            4 => "0000".to_string(),
            5 => String::new(),
            6 => "abc".to_string(),
            _ => digits,
        }
    }
}

proptest! {
    #[test]
    fn rate_limiter_allows_exactly_the_budget(max in 1..20u32, extra in 1..10u32) {
        let limiter = RateLimiter::new(max, Duration::seconds(60), Duration::seconds(30));
        let now = base_time();

        for _ in 0..max {
            prop_assert!(limiter.allow("id", now));
        }
        for _ in 0..extra {
            prop_assert!(!limiter.allow("id", now));
        }
        prop_assert_eq!(limiter.window("id").unwrap().count, max);

        prop_assert!(limiter.allow("id", now + Duration::seconds(60)));
    }

    #[test]
    fn lockout_engages_on_threshold_and_holds(max in 1..6u32, extra in 0..5u32) {
        let tracker = PinLockoutTracker::new(max, Duration::minutes(30));
        let now = base_time();

        for attempt in 1..=max {
            let status = tracker.record_failure("id", now);
            prop_assert_eq!(status.attempts_remaining, max - attempt);
            prop_assert_eq!(status.locked, attempt == max);
        }
        for _ in 0..extra {
            let status = tracker.record_failure("id", now);
            prop_assert!(status.locked);
        }
        prop_assert!(tracker.is_locked("id", now + Duration::minutes(29)));
        prop_assert!(!tracker.is_locked("id", now + Duration::minutes(30)));
    }

    #[test]
    fn repeated_rejection_is_idempotent(input in "[3-9]{1,3}", repeats in 1..6usize) {
        let env = EngineEnv::new(EngineConfig::default(), common::port());
        let ctx = MachineContext::new("s1", common::PHONE, common::SERVICE);
        let mut runtime = MachineRuntime::start(common::account(), ctx);

        let first = block_on(runtime.dispatch(&env, &Event::input(&input))).unwrap();
        prop_assert!(!first.transitioned);

        for _ in 0..repeats {
            let again = block_on(runtime.dispatch(&env, &Event::input(&input))).unwrap();
            prop_assert_eq!(&again.denial, &first.denial);
            prop_assert_eq!(&again.state_path, &first.state_path);
            prop_assert_eq!(&again.context, &first.context);
        }
        prop_assert!(runtime.history().is_empty());
    }

    #[test]
    fn dispatch_moves_the_root_at_most_once(
        inputs in prop::collection::vec(menu_input(), 1..25)
    ) {
        let env = EngineEnv::new(EngineConfig::default(), common::port());
        let ctx = MachineContext::new("s1", common::PHONE, common::SERVICE);
        let mut runtime = MachineRuntime::start(common::account(), ctx);

        block_on(async {
            for input in &inputs {
                if runtime.is_terminated() {
                    break;
                }
                let before = runtime.history().len();
                let result = runtime.dispatch(&env, &Event::input(input)).await.unwrap();
                let moved = runtime.history().len() - before;
                prop_assert!(moved <= 1);
                if result.denial.is_some() {
                    prop_assert_eq!(moved, 0);
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn history_preserves_order(
        states in prop::collection::vec("[a-z]{1,8}", 1..10)
    ) {
        let mut history = StateHistory::new();
        let mut expected_path = vec!["start".to_string()];
        let mut from = "start".to_string();

        for (i, to) in states.iter().enumerate() {
            history.record(TransitionRecord {
                from: from.clone(),
                to: to.clone(),
                event: "input".to_string(),
                timestamp: base_time() + Duration::seconds(i as i64),
            });
            expected_path.push(to.clone());
            from = to.clone();
        }

        prop_assert_eq!(history.get_path(), expected_path.iter().map(String::as_str).collect::<Vec<_>>());
        prop_assert_eq!(history.len(), states.len());
        prop_assert!(history.duration().is_some());
    }

    #[test]
    fn history_roundtrip_serialization(
        states in prop::collection::vec("[a-z]{1,8}", 0..6)
    ) {
        let mut history = StateHistory::new();
        for window in states.windows(2) {
            history.record(TransitionRecord {
                from: window[0].clone(),
                to: window[1].clone(),
                event: "input".to_string(),
                timestamp: base_time(),
            });
        }

        let json = serde_json::to_string(&history).unwrap();
        let restored: StateHistory = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(history, restored);
    }
}
