//! Builder for constructing guarded transitions.

use crate::builder::error::BuildError;
use crate::core::{ContextAction, Guard, MachineContext, Transition, INPUT_EVENT};
use std::sync::Arc;

/// Builder for constructing transitions with a fluent API.
///
/// Use [`TransitionBuilder::input`] for transitions triggered by user input. Sub-flow exits
/// name the event their output mapping produces.
#[derive(Default)]
pub struct TransitionBuilder {
    from: Option<String>,
    event: Option<String>,
    to: Option<String>,
    guards: Vec<Guard>,
    action: Option<ContextAction>,
}

impl TransitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transition triggered by user input.
    ///
    /// # Example
    ///
    /// ```
    /// use menuflow::builder::TransitionBuilder;
    /// use menuflow::guards::navigation;
    ///
    /// let transition = TransitionBuilder::input("menu", "balance")
    ///     .guard(navigation::option("1"))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(transition.event, "input");
    /// ```
    pub fn input(from: &str, to: &str) -> Self {
        Self::new().from(from).on(INPUT_EVENT).to(to)
    }

    /// Set the source state (required).
    pub fn from(mut self, state: impl Into<String>) -> Self {
        self.from = Some(state.into());
        self
    }

    /// Set the triggering event kind (required).
    pub fn on(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the target state (required).
    pub fn to(mut self, state: impl Into<String>) -> Self {
        self.to = Some(state.into());
        self
    }

    /// Append a guard. Guards run in the order they are added.
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    /// Append several guards in order.
    pub fn guards(mut self, guards: impl IntoIterator<Item = Guard>) -> Self {
        self.guards.extend(guards);
        self
    }

    /// Set the context action applied when the transition fires.
    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&MachineContext, &str) -> MachineContext + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    /// Store the event input under `field` when the transition fires.
    pub fn capture(self, field: &str) -> Self {
        let field = field.to_string();
        self.action(move |ctx, input| ctx.clone().with_field(field.clone(), input))
    }

    /// Fails if the source, event or target is missing.
    pub fn build(self) -> Result<Transition, BuildError> {
        let from = self.from.ok_or(BuildError::MissingFromState)?;
        let event = self.event.ok_or(BuildError::MissingEvent)?;
        let to = self.to.ok_or(BuildError::MissingToState)?;

        Ok(Transition {
            from,
            event,
            to,
            guards: self.guards,
            action: self.action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guards::navigation;

    #[test]
    fn builder_validates_required_fields() {
        let result = TransitionBuilder::new().from("menu").build();
        assert!(matches!(result, Err(BuildError::MissingEvent)));

        let result = TransitionBuilder::new().from("menu").on("input").build();
        assert!(matches!(result, Err(BuildError::MissingToState)));

        let result = TransitionBuilder::new().to("menu").build();
        assert!(matches!(result, Err(BuildError::MissingFromState)));
    }

    #[test]
    fn guards_keep_declaration_order() {
        let transition = TransitionBuilder::input("menu", "amount")
            .guard(navigation::option("1"))
            .guards([navigation::option_in_range(1, 3)])
            .build()
            .unwrap();

        let ids: Vec<String> = transition.guards.iter().map(Guard::id).collect();
        assert_eq!(ids, vec!["nav.option(1)", "nav.range(1..=3)"]);
    }

    #[test]
    fn capture_stores_input() {
        let transition = TransitionBuilder::input("amount", "pin").capture("amount").build().unwrap();
        let ctx = MachineContext::new("s1", "254700", "*123#");

        let next = transition.apply_action(&ctx, "500");
        assert_eq!(next.field("amount"), Some("500"));
    }
}
