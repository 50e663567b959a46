//! Guard predicates for controlling state transitions.
//!
//! Guards are a tagged tree: local leaves (closures over the context and
//! input), domain leaves (async checks that consult the external query
//! port), and AND / OR / NOT nodes. A single recursive evaluator in
//! [`crate::guards::GuardEngine`] walks the tree.

use crate::core::context::MachineContext;
use crate::env::EngineEnv;
use crate::error::Denial;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Outcome of evaluating a guard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allow { guard: String },
    Deny(Denial),
}

impl Verdict {
    /// Allow, attributed to `guard`.
    pub fn allow(guard: impl Into<String>) -> Self {
        Self::Allow {
            guard: guard.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// The denial, if this verdict refused.
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Deny(denial) => Some(denial),
            Self::Allow { .. } => None,
        }
    }

    /// Convert into a `Result`, keeping the denial as the error.
    pub fn into_result(self) -> Result<(), Denial> {
        match self {
            Self::Allow { .. } => Ok(()),
            Self::Deny(denial) => Err(denial),
        }
    }
}

/// Which family a guard belongs to. Local families never perform I/O.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GuardFamily {
    /// Menu option selection
    Navigation,
    Validation,
    System,
    Domain,
    /// AND / OR / NOT over other guards
    Composite,
}

/// Synchronous predicate over the environment, context and input.
pub type LocalCheck = Arc<dyn Fn(&EngineEnv, &MachineContext, &str) -> Verdict + Send + Sync>;

/// Business predicate that may consult the external query port.
///
/// Implementations may record side effects in the shared trackers (PIN
/// failures, transaction reservations) but must never move the machine.
#[async_trait]
pub trait DomainCheck: Send + Sync {
    async fn check(&self, env: &EngineEnv, context: &MachineContext, input: &str) -> Verdict;

    /// Whether passing this check holds back shared quota (a transaction
    /// reservation). Reserving checks must be the last guard a chain runs.
    fn reserves(&self) -> bool {
        false
    }
}

/// A guard tree.
///
/// Leaves carry an id that ends up in the [`Denial`] they produce.
#[derive(Clone)]
pub enum Guard {
    Local {
        id: String,
        family: GuardFamily,
        check: LocalCheck,
    },
    Domain {
        id: String,
        check: Arc<dyn DomainCheck>,
    },
    All(Vec<Guard>),
    Any(Vec<Guard>),
    Not(Box<Guard>),
}

impl Guard {
    /// Create a local guard from a pure predicate.
    ///
    /// # Example
    ///
    /// ```rust
    /// use menuflow::core::{Guard, GuardFamily, Verdict};
    /// use menuflow::error::Denial;
    ///
    /// let non_empty = Guard::local("non_empty", GuardFamily::Validation, |_env, _ctx, input| {
    ///     if input.is_empty() {
    ///         Verdict::Deny(Denial::rejected("non_empty", "input required"))
    ///     } else {
    ///         Verdict::allow("non_empty")
    ///     }
    /// });
    /// assert!(non_empty.is_local());
    /// ```
    pub fn local<F>(id: impl Into<String>, family: GuardFamily, check: F) -> Self
    where
        F: Fn(&EngineEnv, &MachineContext, &str) -> Verdict + Send + Sync + 'static,
    {
        Guard::Local {
            id: id.into(),
            family,
            check: Arc::new(check),
        }
    }

    /// Wrap a [`DomainCheck`] as a domain leaf.
    pub fn domain<D>(id: impl Into<String>, check: D) -> Self
    where
        D: DomainCheck + 'static,
    {
        Guard::Domain {
            id: id.into(),
            check: Arc::new(check),
        }
    }

    /// AND over `guards`. Nested ANDs are flattened so grouping is irrelevant.
    pub fn all(guards: Vec<Guard>) -> Self {
        let mut flat = Vec::with_capacity(guards.len());
        for guard in guards {
            match guard {
                Guard::All(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        Guard::All(flat)
    }

    /// OR over `guards`. Nested ORs are flattened so grouping is irrelevant.
    pub fn any(guards: Vec<Guard>) -> Self {
        let mut flat = Vec::with_capacity(guards.len());
        for guard in guards {
            match guard {
                Guard::Any(children) => flat.extend(children),
                other => flat.push(other),
            }
        }
        Guard::Any(flat)
    }

    /// Shorthand for `Guard::all(vec![self, other])`.
    pub fn and(self, other: Guard) -> Self {
        Guard::all(vec![self, other])
    }

    /// Shorthand for `Guard::any(vec![self, other])`.
    pub fn or(self, other: Guard) -> Self {
        Guard::any(vec![self, other])
    }

    /// Identifier for logs and denials. Composites render their children,
    /// e.g. `any(a, b)`.
    pub fn id(&self) -> String {
        match self {
            Guard::Local { id, .. } | Guard::Domain { id, .. } => id.clone(),
            Guard::All(guards) => format!("all({})", join_ids(guards)),
            Guard::Any(guards) => format!("any({})", join_ids(guards)),
            Guard::Not(inner) => format!("not({})", inner.id()),
        }
    }

    /// Family of a leaf; composites report [`GuardFamily::Composite`].
    pub fn family(&self) -> GuardFamily {
        match self {
            Guard::Local { family, .. } => *family,
            Guard::Domain { .. } => GuardFamily::Domain,
            Guard::All(_) | Guard::Any(_) | Guard::Not(_) => GuardFamily::Composite,
        }
    }

    /// True when evaluating this guard can never reach the external port.
    pub fn is_local(&self) -> bool {
        match self {
            Guard::Local { .. } => true,
            Guard::Domain { .. } => false,
            Guard::All(guards) | Guard::Any(guards) => guards.iter().all(Guard::is_local),
            Guard::Not(inner) => inner.is_local(),
        }
    }

    /// Ids of local guards that appear after a non-local one, at any depth.
    pub fn misordered(guards: &[Guard]) -> Vec<String> {
        let mut found = Vec::new();
        let mut seen_domain = false;
        for guard in guards {
            if seen_domain && guard.is_local() {
                found.push(guard.id());
            }
            match guard {
                Guard::All(children) | Guard::Any(children) => {
                    found.extend(Guard::misordered(children))
                }
                Guard::Not(inner) => {
                    found.extend(Guard::misordered(std::slice::from_ref(inner.as_ref())))
                }
                _ => {}
            }
            if !guard.is_local() {
                seen_domain = true;
            }
        }
        found
    }

    /// Whether this tree contains a reserving domain check.
    pub fn reserves(&self) -> bool {
        match self {
            Guard::Local { .. } => false,
            Guard::Domain { check, .. } => check.reserves(),
            Guard::All(guards) | Guard::Any(guards) => guards.iter().any(Guard::reserves),
            Guard::Not(inner) => inner.reserves(),
        }
    }

    /// Ids of guards whose reservation could outlive a denied chain: a
    /// reserving check with anything evaluated after it, or an OR / NOT
    /// wrapped around one.
    pub fn unsafe_reservations(guards: &[Guard]) -> Vec<String> {
        let mut sequence = Vec::new();
        flatten_all(guards, &mut sequence);
        let last = sequence.len().saturating_sub(1);

        sequence
            .iter()
            .enumerate()
            .filter(|(position, guard)| {
                guard.reserves()
                    && (guard.family() == GuardFamily::Composite || *position != last)
            })
            .map(|(_, guard)| guard.id())
            .collect()
    }

    /// Whether any composite node in this tree has no children.
    pub fn has_empty_composite(&self) -> bool {
        match self {
            Guard::All(guards) | Guard::Any(guards) => {
                guards.is_empty() || guards.iter().any(Guard::has_empty_composite)
            }
            Guard::Not(inner) => inner.has_empty_composite(),
            _ => false,
        }
    }
}

/// Guards of a chain in evaluation order, with AND nodes inlined.
fn flatten_all<'g>(guards: &'g [Guard], out: &mut Vec<&'g Guard>) {
    for guard in guards {
        match guard {
            Guard::All(children) => flatten_all(children, out),
            other => out.push(other),
        }
    }
}

impl std::ops::Not for Guard {
    type Output = Guard;

    fn not(self) -> Guard {
        match self {
            Guard::Not(inner) => *inner,
            other => Guard::Not(Box::new(other)),
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guard({})", self.id())
    }
}

fn join_ids(guards: &[Guard]) -> String {
    guards.iter().map(Guard::id).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverCalled;

    #[async_trait]
    impl DomainCheck for NeverCalled {
        async fn check(&self, _env: &EngineEnv, _ctx: &MachineContext, _input: &str) -> Verdict {
            Verdict::allow("never")
        }
    }

    struct Reserving;

    #[async_trait]
    impl DomainCheck for Reserving {
        async fn check(&self, _env: &EngineEnv, _ctx: &MachineContext, _input: &str) -> Verdict {
            Verdict::allow("reserve")
        }

        fn reserves(&self) -> bool {
            true
        }
    }

    fn leaf(id: &str) -> Guard {
        let owned = id.to_string();
        Guard::local(id, GuardFamily::Validation, move |_, _, _| {
            Verdict::allow(owned.clone())
        })
    }

    #[test]
    fn and_is_associative_by_construction() {
        let left = leaf("a").and(leaf("b")).and(leaf("c"));
        let right = leaf("a").and(leaf("b").and(leaf("c")));
        assert_eq!(left.id(), right.id());
        assert_eq!(left.id(), "all(a, b, c)");
    }

    #[test]
    fn or_is_associative_by_construction() {
        let left = leaf("a").or(leaf("b")).or(leaf("c"));
        let right = leaf("a").or(leaf("b").or(leaf("c")));
        assert_eq!(left.id(), right.id());
    }

    #[test]
    fn double_negation_collapses() {
        let guard = !!leaf("a");
        assert_eq!(guard.id(), "a");
        assert_eq!((!leaf("a")).id(), "not(a)");
    }

    #[test]
    fn locality_propagates_through_composites() {
        let domain = Guard::domain("balance", NeverCalled);
        assert!(leaf("a").and(leaf("b")).is_local());
        assert!(!leaf("a").and(domain.clone()).is_local());
        assert!(!(!domain).is_local());
    }

    #[test]
    fn misordered_finds_local_after_domain() {
        let domain = Guard::domain("balance", NeverCalled);
        assert!(Guard::misordered(&[leaf("a"), domain.clone()]).is_empty());
        assert_eq!(Guard::misordered(&[domain.clone(), leaf("a")]), vec!["a"]);
        assert_eq!(
            Guard::misordered(&[Guard::all(vec![domain, leaf("b")])]),
            vec!["b"]
        );
    }

    #[test]
    fn reservation_must_run_last() {
        let reserve = || Guard::domain("reserve", Reserving);
        let pin = || Guard::domain("pin", NeverCalled);

        assert!(Guard::unsafe_reservations(&[leaf("a"), pin(), reserve()]).is_empty());
        assert!(Guard::unsafe_reservations(&[leaf("a"), Guard::all(vec![pin(), reserve()])]).is_empty());
        assert_eq!(Guard::unsafe_reservations(&[leaf("a"), reserve(), pin()]), vec!["reserve"]);
        assert_eq!(
            Guard::unsafe_reservations(&[Guard::all(vec![reserve(), pin()])]),
            vec!["reserve"]
        );
    }

    #[test]
    fn reservation_under_or_and_not_is_unsafe() {
        let reserve = || Guard::domain("reserve", Reserving);
        assert_eq!(Guard::unsafe_reservations(&[!reserve()]), vec!["not(reserve)"]);
        assert_eq!(
            Guard::unsafe_reservations(&[reserve().or(leaf("a"))]),
            vec!["any(reserve, a)"]
        );
        assert!(!Guard::domain("pin", NeverCalled).reserves());
    }

    #[test]
    fn family_reports_leaf_kind() {
        assert_eq!(leaf("a").family(), GuardFamily::Validation);
        assert_eq!(Guard::domain("pin", NeverCalled).family(), GuardFamily::Domain);
        assert_eq!(leaf("a").or(leaf("b")).family(), GuardFamily::Composite);
    }

    #[test]
    fn empty_composites_are_detected() {
        assert!(Guard::any(Vec::new()).has_empty_composite());
        assert!((!Guard::all(Vec::new())).has_empty_composite());
        assert!(!leaf("a").or(leaf("b")).has_empty_composite());
    }

    #[test]
    fn verdict_helpers() {
        let allow = Verdict::allow("a");
        assert!(allow.is_allowed());
        assert!(allow.denial().is_none());

        let deny = Verdict::Deny(Denial::rejected("a", "no"));
        assert_eq!(deny.clone().into_result().unwrap_err().reason, "no");
        assert_eq!(deny.denial().map(|d| d.guard.as_str()), Some("a"));
    }
}
