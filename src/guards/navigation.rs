//! Navigation guards: the input must select a defined menu option.

use crate::core::{Guard, GuardFamily, Verdict};
use crate::error::Denial;
use crate::guards::reasons::INVALID_SELECTION;

fn decide(id: &str, ok: bool) -> Verdict {
    if ok {
        Verdict::allow(id)
    } else {
        Verdict::Deny(Denial::rejected(id, INVALID_SELECTION))
    }
}

/// Input equals exactly `value`.
pub fn option(value: &str) -> Guard {
    let id = format!("nav.option({})", value);
    let value = value.to_string();
    Guard::local(id.clone(), GuardFamily::Navigation, move |_, _, input| {
        decide(&id, input == value)
    })
}

/// Input is a number in `low..=high`.
///
/// # Example
/// ```
/// use menuflow::config::EngineConfig;
/// use menuflow::core::MachineContext;
/// use menuflow::env::EngineEnv;
/// use menuflow::guards::{navigation, GuardEngine};
/// use menuflow::port::InMemoryQueryPort;
/// use std::sync::Arc;
///
/// let env = EngineEnv::new(EngineConfig::default(), Arc::new(InMemoryQueryPort::new()));
/// let ctx = MachineContext::new("s1", "254700", "*100#");
/// let guard = navigation::option_in_range(1, 4);
///
/// let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
/// rt.block_on(async {
///     let engine = GuardEngine::new(&env);
///     assert!(engine.evaluate(&guard, &ctx, "3").await.is_allowed());
///     assert!(!engine.evaluate(&guard, &ctx, "5").await.is_allowed());
/// });
/// ```
pub fn option_in_range(low: u32, high: u32) -> Guard {
    let id = format!("nav.range({}..={})", low, high);
    Guard::local(id.clone(), GuardFamily::Navigation, move |_, _, input| {
        let ok = input
            .parse::<u32>()
            .is_ok_and(|choice| (low..=high).contains(&choice));
        decide(&id, ok)
    })
}

/// Input is one of `options`.
pub fn one_of(options: &[&str]) -> Guard {
    let id = format!("nav.one_of({})", options.join("|"));
    let options: Vec<String> = options.iter().map(|o| o.to_string()).collect();
    Guard::local(id.clone(), GuardFamily::Navigation, move |_, _, input| {
        decide(&id, options.iter().any(|o| o == input))
    })
}
