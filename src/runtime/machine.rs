//! Runtime that executes one flow definition, delegating to live child
//! runtimes while a sub-flow state is active.

use crate::checkpoint::{CheckpointError, RuntimeSnapshot};
use crate::core::{
    Event, MachineContext, MachineDefinition, Output, StateHistory, StateKind, Transition,
    TransitionRecord, Verdict,
};
use crate::env::EngineEnv;
use crate::error::{Denial, EngineError};
use crate::guards::{reasons, GuardEngine};
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Result of dispatching one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeResult {
    /// Active state of the root followed by the active state of each live
    /// child, outermost first
    pub state_path: Vec<String>,
    /// Context of the innermost active runtime
    pub context: MachineContext,
    /// Set when the root reached a final state
    pub output: Option<Output>,
    /// Some machine in the chain moved
    pub transitioned: bool,
    /// Why the event was refused, when it was
    pub denial: Option<Denial>,
}

/// Outcome of one dispatch level.
#[derive(Clone, Debug, Default)]
struct Step {
    transitioned: bool,
    denial: Option<Denial>,
}

impl Step {
    fn moved() -> Self {
        Self {
            transitioned: true,
            denial: None,
        }
    }

    fn denied(denial: Denial) -> Self {
        Self {
            transitioned: false,
            denial: Some(denial),
        }
    }
}

type StepFuture<'a> = Pin<Box<dyn Future<Output = Step> + Send + 'a>>;

/// Live execution of a [`MachineDefinition`].
///
/// Cloning yields an independent copy; the engine dispatches on a clone and
/// commits it only if the session is still live afterwards.
#[derive(Clone)]
pub struct MachineRuntime {
    definition: Arc<MachineDefinition>,
    state: String,
    context: MachineContext,
    child: Option<Box<MachineRuntime>>,
    history: StateHistory,
    output: Option<Output>,
}

impl MachineRuntime {
    /// Enter the definition's initial state, running its entry action and
    /// spawning a child if it is a sub-flow state.
    pub fn start(definition: Arc<MachineDefinition>, context: MachineContext) -> Self {
        let mut runtime = Self {
            state: definition.initial().to_string(),
            definition,
            context,
            child: None,
            history: StateHistory::new(),
            output: None,
        };
        runtime.enter("");
        runtime
    }

    pub fn definition(&self) -> &Arc<MachineDefinition> {
        &self.definition
    }

    /// Active state of this runtime (not of its child).
    pub fn current_state(&self) -> &str {
        &self.state
    }

    pub fn context(&self) -> &MachineContext {
        &self.context
    }

    /// Live child runtime while a sub-flow state is active.
    pub fn child(&self) -> Option<&MachineRuntime> {
        self.child.as_deref()
    }

    /// Transitions taken by this runtime (children keep their own).
    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    /// Output of the final state, once reached.
    pub fn output(&self) -> Option<&Output> {
        self.output.as_ref()
    }

    /// Whether this runtime reached a final state.
    pub fn is_terminated(&self) -> bool {
        self.output.is_some()
    }

    /// Active states from this runtime down to the innermost child.
    pub fn state_path(&self) -> Vec<String> {
        let mut path = vec![self.state.clone()];
        if let Some(child) = &self.child {
            path.extend(child.state_path());
        }
        path
    }

    /// Context of the innermost active runtime.
    pub fn active_context(&self) -> &MachineContext {
        match &self.child {
            Some(child) => child.active_context(),
            None => &self.context,
        }
    }

    /// Dispatch one event.
    ///
    /// Guard denials are not errors: the runtime stays where it is and the
    /// denial is returned in the result. At most one externally visible
    /// state change happens per call, even when a child finishes and its
    /// output moves the parent.
    ///
    /// # Example
    /// ```
    /// use menuflow::builder::TransitionBuilder;
    /// use menuflow::core::{Event, MachineContext, MachineDefinition, Output};
    /// use menuflow::env::EngineEnv;
    /// use menuflow::guards::navigation;
    /// use menuflow::port::InMemoryQueryPort;
    /// use menuflow::{EngineConfig, MachineRuntime};
    /// use std::sync::Arc;
    ///
    /// let flow = MachineDefinition::builder("menu")
    ///     .initial("home")
    ///     .state("home")
    ///     .final_state("bye", Output::new("closed"))
    ///     .transition(TransitionBuilder::input("home", "bye").guard(navigation::option("0")))
    ///     .unwrap()
    ///     .build()
    ///     .unwrap();
    /// let env = EngineEnv::new(EngineConfig::default(), Arc::new(InMemoryQueryPort::new()));
    /// let mut runtime = MachineRuntime::start(flow, MachineContext::new("s1", "254700", "*100#"));
    ///
    /// let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    /// rt.block_on(async {
    ///     let refused = runtime.dispatch(&env, &Event::input("7")).await.unwrap();
    ///     assert!(refused.denial.is_some());
    ///     assert_eq!(runtime.current_state(), "home");
    ///
    ///     let done = runtime.dispatch(&env, &Event::input("0")).await.unwrap();
    ///     assert_eq!(done.output, Some(Output::new("closed")));
    /// });
    /// ```
    pub async fn dispatch(
        &mut self,
        env: &EngineEnv,
        event: &Event,
    ) -> Result<RuntimeResult, EngineError> {
        if self.is_terminated() {
            return Err(EngineError::RuntimeTerminated {
                flow: self.definition.name().to_string(),
            });
        }

        let step = match env.status.check() {
            Err(denial) => {
                self.record_denial(&denial);
                Step::denied(denial)
            }
            Ok(()) => self.dispatch_inner(env, event).await,
        };

        Ok(RuntimeResult {
            state_path: self.state_path(),
            context: self.active_context().clone(),
            output: self.output.clone(),
            transitioned: step.transitioned,
            denial: step.denial,
        })
    }

    fn dispatch_inner<'a>(&'a mut self, env: &'a EngineEnv, event: &'a Event) -> StepFuture<'a> {
        Box::pin(async move {
            if self.child.is_none() {
                return self.step(env, event).await;
            }

            let (step, output) = match self.child.as_mut() {
                Some(child) => {
                    let step = child.dispatch_inner(env, event).await;
                    (step, child.output.clone())
                }
                None => return Step::default(),
            };
            let Some(output) = output else {
                return step;
            };

            let mapping = match self.definition.state(&self.state).map(|spec| &spec.kind) {
                Some(StateKind::SubFlow { mapping, .. }) => Arc::clone(mapping),
                _ => return step,
            };
            let finished = self.child.take();
            let mapped = mapping(&output);
            debug!(
                flow = %self.definition.name(),
                state = %self.state,
                output = %output,
                event = %mapped.kind,
                "sub-flow finished"
            );

            let parent = self.step(env, &mapped).await;
            if !parent.transitioned {
                // The parent refused the child's result: run the child again
                if let Some(finished) = finished {
                    let mut context = self.child_context();
                    context.last_error = parent.denial.clone();
                    self.child = Some(Box::new(Self::start(
                        Arc::clone(&finished.definition),
                        context,
                    )));
                }
            }
            parent
        })
    }

    /// Evaluate candidate transitions in declaration order and take the
    /// first whose guard chain passes.
    async fn step(&mut self, env: &EngineEnv, event: &Event) -> Step {
        let engine = GuardEngine::new(env);
        let definition = Arc::clone(&self.definition);
        let state = self.state.clone();
        let mut denial: Option<Denial> = None;

        for transition in definition.candidates(&state, &event.kind) {
            match engine
                .evaluate_chain(&transition.guards, &self.context, &event.input)
                .await
            {
                Verdict::Allow { .. } => {
                    self.apply(transition, event, env.clock.now());
                    return Step::moved();
                }
                Verdict::Deny(found) => {
                    // The last refusal is reported; an unselected menu option
                    // never hides a candidate that was selected and refused
                    let replace = match &denial {
                        None => true,
                        Some(kept) => {
                            found.reason != reasons::INVALID_SELECTION
                                || kept.reason == reasons::INVALID_SELECTION
                        }
                    };
                    if replace {
                        denial = Some(found);
                    }
                }
            }
        }

        let denial = denial.unwrap_or_else(|| {
            Denial::rejected(
                format!("{}.{}", definition.name(), state),
                reasons::INVALID_SELECTION,
            )
        });
        if definition.records_denials() {
            self.context.last_error = Some(denial.clone());
        }
        Step::denied(denial)
    }

    fn apply(&mut self, transition: &Transition, event: &Event, now: DateTime<Utc>) {
        let definition = Arc::clone(&self.definition);
        let mut context = self.context.clone();

        if let Some(exit) = definition.state(&self.state).and_then(|s| s.on_exit.as_ref()) {
            context = exit(&context, &event.input);
        }
        context = transition.apply_action(&context, &event.input);
        context.last_error = None;

        debug!(
            flow = %definition.name(),
            from = %transition.from,
            to = %transition.to,
            event = %event.kind,
            "transition"
        );
        self.history.record(TransitionRecord {
            from: transition.from.clone(),
            to: transition.to.clone(),
            event: event.kind.clone(),
            timestamp: now,
        });
        self.state = transition.to.clone();
        self.context = context;
        self.enter(&event.input);
    }

    fn enter(&mut self, input: &str) {
        let definition = Arc::clone(&self.definition);
        let Some(spec) = definition.state(&self.state) else {
            return;
        };
        if let Some(entry) = &spec.on_entry {
            self.context = entry(&self.context, input);
        }
        match &spec.kind {
            StateKind::Plain => {}
            StateKind::Final(output) => {
                debug!(flow = %definition.name(), output = %output, "flow reached final state");
                self.output = Some(output.clone());
            }
            StateKind::SubFlow { child, .. } => {
                self.child = Some(Box::new(Self::start(Arc::clone(child), self.child_context())));
            }
        }
    }

    /// Children start from a copy of the parent's context; changes they
    /// make stay in the child.
    fn child_context(&self) -> MachineContext {
        let mut context = self.context.clone();
        context.last_error = None;
        context
    }

    fn record_denial(&mut self, denial: &Denial) {
        match self.child.as_mut() {
            Some(child) => child.record_denial(denial),
            None => {
                if self.definition.records_denials() {
                    self.context.last_error = Some(denial.clone());
                }
            }
        }
    }

    /// Serializable copy of this runtime and its live children.
    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            flow: self.definition.name().to_string(),
            state: self.state.clone(),
            context: self.context.clone(),
            history: self.history.clone(),
            output: self.output.clone(),
            child: self.child.as_ref().map(|child| Box::new(child.snapshot())),
        }
    }

    /// Rebuild a runtime from a snapshot taken against `definition`.
    ///
    /// Entry actions are not replayed; the snapshot already holds their
    /// effects.
    pub fn restore(
        definition: Arc<MachineDefinition>,
        snapshot: RuntimeSnapshot,
    ) -> Result<Self, CheckpointError> {
        if snapshot.flow != definition.name() {
            return Err(CheckpointError::ValidationFailed(format!(
                "snapshot of flow '{}' cannot restore flow '{}'",
                snapshot.flow,
                definition.name()
            )));
        }
        let spec = definition.state(&snapshot.state).ok_or_else(|| {
            CheckpointError::ValidationFailed(format!(
                "flow '{}' has no state '{}'",
                snapshot.flow, snapshot.state
            ))
        })?;

        let child = match (spec.child(), snapshot.child) {
            (Some(child_definition), Some(child_snapshot)) => Some(Box::new(Self::restore(
                Arc::clone(child_definition),
                *child_snapshot,
            )?)),
            (None, None) => None,
            (Some(_), None) => {
                return Err(CheckpointError::ValidationFailed(format!(
                    "sub-flow state '{}' has no child snapshot",
                    snapshot.state
                )))
            }
            (None, Some(_)) => {
                return Err(CheckpointError::ValidationFailed(format!(
                    "state '{}' is not a sub-flow state",
                    snapshot.state
                )))
            }
        };

        Ok(Self {
            definition,
            state: snapshot.state,
            context: snapshot.context,
            child,
            history: snapshot.history,
            output: snapshot.output,
        })
    }
}

impl fmt::Debug for MachineRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineRuntime")
            .field("flow", &self.definition.name())
            .field("state", &self.state)
            .field("child", &self.child)
            .field("transitions", &self.history.len())
            .field("output", &self.output)
            .finish()
    }
}
