//! Recursive guard evaluation.

use crate::core::{Guard, MachineContext, Verdict};
use crate::env::EngineEnv;
use crate::error::{Denial, ErrorKind};
use crate::guards::reasons;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Boxed future returned by recursive evaluation.
pub type GuardFuture<'a> = Pin<Box<dyn Future<Output = Verdict> + Send + 'a>>;

/// Evaluates guard trees against one environment.
///
/// AND stops at the first denial and OR at the first allow, so domain
/// guards placed after a failing local guard are never queried.
#[derive(Clone, Copy, Debug)]
pub struct GuardEngine<'e> {
    env: &'e EngineEnv,
}

impl<'e> GuardEngine<'e> {
    pub fn new(env: &'e EngineEnv) -> Self {
        Self { env }
    }

    /// Evaluate one guard tree.
    pub fn evaluate<'a>(
        &'a self,
        guard: &'a Guard,
        context: &'a MachineContext,
        input: &'a str,
    ) -> GuardFuture<'a> {
        Box::pin(async move {
            match guard {
                Guard::Local { check, .. } => check(self.env, context, input),
                Guard::Domain { check, .. } => check.check(self.env, context, input).await,
                Guard::All(guards) => {
                    for child in guards {
                        if let Verdict::Deny(denial) = self.evaluate(child, context, input).await {
                            return Verdict::Deny(denial);
                        }
                    }
                    Verdict::allow(guard.id())
                }
                Guard::Any(guards) => {
                    let mut denials = Vec::with_capacity(guards.len());
                    for child in guards {
                        match self.evaluate(child, context, input).await {
                            allowed @ Verdict::Allow { .. } => return allowed,
                            Verdict::Deny(denial) => denials.push(denial),
                        }
                    }
                    Verdict::Deny(join_denials(guard.id(), denials))
                }
                Guard::Not(inner) => match self.evaluate(inner, context, input).await {
                    Verdict::Allow { guard: passed } => Verdict::Deny(Denial::rejected(
                        guard.id(),
                        format!("{} must not hold", passed),
                    )),
                    Verdict::Deny(denial) if denial.kind == ErrorKind::InputRejected => {
                        Verdict::allow(guard.id())
                    }
                    // Infrastructure failures never invert into an allow
                    Verdict::Deny(denial) => Verdict::Deny(denial),
                },
            }
        })
    }

    /// Evaluate a transition's guard list in order. System status is
    /// checked first and overrides every other guard.
    pub async fn evaluate_chain(
        &self,
        guards: &[Guard],
        context: &MachineContext,
        input: &str,
    ) -> Verdict {
        if let Err(denial) = self.env.status.check() {
            return Verdict::Deny(denial);
        }
        for guard in guards {
            if let Verdict::Deny(denial) = self.evaluate(guard, context, input).await {
                debug!(
                    guard = %denial.guard,
                    family = ?guard.family(),
                    reason = %denial.reason,
                    "guard denied"
                );
                return Verdict::Deny(denial);
            }
        }
        Verdict::allow("chain")
    }
}

/// Combine the denials of a failed OR. An unavailable dependency wins so
/// the caller can tell the failure may be transient.
fn join_denials(id: String, denials: Vec<Denial>) -> Denial {
    if denials.is_empty() {
        return Denial::rejected(id, reasons::NO_ALTERNATIVE);
    }
    let kind = if denials
        .iter()
        .any(|d| d.kind == ErrorKind::ExternalUnavailable)
    {
        ErrorKind::ExternalUnavailable
    } else {
        denials[0].kind
    };
    let attempts_remaining = denials.iter().find_map(|d| d.attempts_remaining);
    let reason = denials
        .iter()
        .map(|d| d.reason.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    Denial {
        kind,
        guard: id,
        reason,
        attempts_remaining,
    }
}
