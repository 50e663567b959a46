//! Session engine facade.
//!
//! Turns inbound gateway events into replies: rate limiting per identity,
//! flow lookup by service code, session resolution, serialized dispatch,
//! and cleanup of finished sessions.

use crate::builder::MachineDefinitionBuilder;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::core::{Event, MachineDefinition};
use crate::env::EngineEnv;
use crate::error::{Denial, EngineError, ErrorKind};
use crate::guards::reasons;
use crate::port::ExternalQueryPort;
use crate::runtime::MachineRuntime;
use crate::session::{Continuity, SessionRegistry, SessionSeed};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

/// One request from the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Gateway session identifier, stable across requests of one dialogue
    pub session_id: String,
    /// Subscriber identity (typically the MSISDN)
    pub identity_key: String,
    /// Service code dialled, used to pick the root flow
    pub service_code: String,
    /// What the user typed; empty on the opening request
    pub raw_input: String,
    /// Locale for a newly created session; ignored for live ones
    pub locale: Option<String>,
    /// Fail with `SessionExpired` instead of restarting an expired session
    pub require_continuity: bool,
}

impl InboundEvent {
    /// Event with no locale that restarts expired sessions.
    pub fn new(
        session_id: impl Into<String>,
        identity_key: impl Into<String>,
        service_code: impl Into<String>,
        raw_input: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            identity_key: identity_key.into(),
            service_code: service_code.into(),
            raw_input: raw_input.into(),
            locale: None,
            require_continuity: false,
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Ask for `SessionExpired` rather than a silent restart.
    pub fn requiring_continuity(mut self) -> Self {
        self.require_continuity = true;
        self
    }
}

/// What the gateway sends back to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReply {
    pub session_id: String,
    /// Semantic identifier of the screen: root flow name and active state
    /// path joined with `.`
    pub message_key: String,
    /// Text produced by the [`LocaleResolver`] for `message_key`
    pub display_text: String,
    /// Active state of the root and of each live sub-flow, outermost first
    pub state_path: Vec<String>,
    /// The session ended; the gateway should close the dialogue
    pub is_terminal: bool,
    /// Set when the input was refused
    pub error_kind: Option<ErrorKind>,
    /// Stable reason text from the denial
    pub error_reason: Option<String>,
    /// PIN attempts left after an authentication failure
    pub attempts_remaining: Option<u32>,
    /// An expired session was replaced by a fresh one
    pub restarted: bool,
}

/// Renders message keys into user-facing text.
pub trait LocaleResolver: Send + Sync {
    fn resolve_text(&self, key: &str, locale: &str, params: &BTreeMap<String, String>) -> String;
}

/// Resolver that returns the key itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyEchoResolver;

impl LocaleResolver for KeyEchoResolver {
    fn resolve_text(&self, key: &str, _locale: &str, _params: &BTreeMap<String, String>) -> String {
        key.to_string()
    }
}

/// Root flow definitions keyed by service code.
///
/// # Example
/// ```
/// use menuflow::core::{MachineDefinition, Output};
/// use menuflow::engine::FlowCatalog;
///
/// let flow = MachineDefinition::builder("balance")
///     .initial("menu")
///     .state("menu")
///     .final_state("done", Output::new("shown"))
///     .build()
///     .unwrap();
///
/// let mut catalog = FlowCatalog::new();
/// catalog.register("*144#", flow.clone()).unwrap();
/// assert!(catalog.register("*144#", flow).is_err());
/// assert_eq!(catalog.get("*144#").map(|f| f.name()), Some("balance"));
/// ```
#[derive(Debug, Default)]
pub struct FlowCatalog {
    flows: HashMap<String, Arc<MachineDefinition>>,
}

impl FlowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `DuplicateService` if the code is already taken.
    pub fn register(
        &mut self,
        service_code: impl Into<String>,
        definition: Arc<MachineDefinition>,
    ) -> Result<(), EngineError> {
        let service_code = service_code.into();
        if self.flows.contains_key(&service_code) {
            return Err(EngineError::DuplicateService { service_code });
        }
        self.flows.insert(service_code, definition);
        Ok(())
    }

    /// Root flow registered under `service_code`.
    pub fn get(&self, service_code: &str) -> Option<&Arc<MachineDefinition>> {
        self.flows.get(service_code)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

/// Counts from one maintenance sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Idle sessions evicted
    pub sessions: usize,
    /// Rate-limit windows dropped
    pub rate_windows: usize,
    /// Expired lockout records dropped
    pub lockouts: usize,
}

/// Assembles an [`Engine`] from configuration, the external port and
/// registered flows.
///
/// Defaults to [`SystemClock`] and [`KeyEchoResolver`]. Configuration is
/// validated and service codes are checked for duplicates in
/// [`EngineBuilder::build`].
pub struct EngineBuilder {
    config: EngineConfig,
    port: Arc<dyn ExternalQueryPort>,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn LocaleResolver>,
    flows: Vec<(String, Arc<MachineDefinition>)>,
}

impl EngineBuilder {
    /// Replace the time source, e.g. with a `MockClock` in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the text resolver used for `display_text`.
    pub fn resolver(mut self, resolver: Arc<dyn LocaleResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Register a root flow under a service code.
    pub fn flow(mut self, service_code: impl Into<String>, definition: Arc<MachineDefinition>) -> Self {
        self.flows.push((service_code.into(), definition));
        self
    }

    /// Build and register a flow; an invalid definition is an error here
    /// rather than a flow that fails at runtime.
    pub fn flow_from(
        self,
        service_code: impl Into<String>,
        builder: MachineDefinitionBuilder,
    ) -> Result<Self, EngineError> {
        let definition = builder.build()?;
        Ok(self.flow(service_code, definition))
    }

    /// Validate configuration and flows and produce the engine.
    pub fn build(self) -> Result<Engine, EngineError> {
        self.config.validate()?;

        let mut catalog = FlowCatalog::new();
        for (service_code, definition) in self.flows {
            catalog.register(service_code, definition)?;
        }

        let registry = SessionRegistry::from_config(&self.config.session, Arc::clone(&self.clock));
        let env = EngineEnv::with_clock(self.config, self.port, self.clock);
        info!(flows = catalog.len(), "engine ready");

        Ok(Engine {
            env: Arc::new(env),
            catalog,
            registry,
            resolver: self.resolver,
        })
    }
}

/// Drives sessions for every registered flow.
pub struct Engine {
    env: Arc<EngineEnv>,
    catalog: FlowCatalog,
    registry: SessionRegistry,
    resolver: Arc<dyn LocaleResolver>,
}

impl Engine {
    /// Start building an engine with the default clock and resolver.
    pub fn builder(config: EngineConfig, port: Arc<dyn ExternalQueryPort>) -> EngineBuilder {
        EngineBuilder {
            config,
            port,
            clock: Arc::new(SystemClock::new()),
            resolver: Arc::new(KeyEchoResolver),
            flows: Vec::new(),
        }
    }

    /// Shared environment: configuration, service flags, trackers.
    pub fn env(&self) -> &Arc<EngineEnv> {
        &self.env
    }

    /// Live sessions.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &FlowCatalog {
        &self.catalog
    }

    /// Handle one inbound event.
    ///
    /// Guard denials come back as replies carrying the error kind and
    /// reason. `Err` is reserved for unknown service codes and expired
    /// sessions the caller asked to continue. A session evicted while this
    /// request was in flight never receives its result; without continuity
    /// the request lands on a fresh session instead.
    #[instrument(skip(self, event), fields(session = %event.session_id, service = %event.service_code))]
    pub async fn handle(&self, event: InboundEvent) -> Result<SessionReply, EngineError> {
        let now = self.env.clock.now();
        if !self.env.rate_limiter.allow(&event.identity_key, now) {
            debug!(identity = %event.identity_key, "request rate limited");
            return Ok(self.rate_limited(&event));
        }

        let root = self
            .catalog
            .get(&event.service_code)
            .ok_or_else(|| EngineError::UnknownService {
                service_code: event.service_code.clone(),
            })?;

        let continuity = if event.require_continuity {
            Continuity::Require
        } else {
            Continuity::Restart
        };

        let resolved = self.registry.resolve(seed(&event), root, continuity)?;
        let handle = resolved.handle;
        let mut session = handle.lock().await;
        if handle.is_evicted() {
            drop(session);
            return self.after_eviction(&event, root).await;
        }

        if resolved.created {
            // The opening request shows the initial screen without dispatching
            let denial = match self.env.status.check() {
                Err(denial) => Some(denial),
                Ok(()) if resolved.expired => Some(Denial::new(
                    ErrorKind::SessionExpired,
                    "session",
                    reasons::SESSION_EXPIRED,
                )),
                Ok(()) => None,
            };
            return Ok(self.reply(root, &session.runtime, denial.as_ref(), resolved.expired));
        }

        let mut runtime = session.runtime.clone();
        let result = runtime.dispatch(&self.env, &Event::input(&event.raw_input)).await?;

        if handle.is_evicted() {
            debug!("session evicted during dispatch, result discarded");
            drop(session);
            return self.after_eviction(&event, root).await;
        }
        session.runtime = runtime;
        handle.touch(self.env.clock.now());

        let reply = self.reply(root, &session.runtime, result.denial.as_ref(), false);
        drop(session);

        if reply.is_terminal {
            self.registry.evict(&event.session_id);
            info!(output = ?result.output, "session terminated");
        }
        Ok(reply)
    }

    /// Explicitly end a session. In-flight dispatches on it are discarded.
    pub fn cancel(&self, session_id: &str) -> bool {
        let evicted = self.registry.evict(session_id);
        if evicted {
            info!(session = %session_id, "session cancelled");
        }
        evicted
    }

    /// Drop expired sessions, stale rate windows and stale lockout records.
    pub fn sweep(&self) -> SweepStats {
        let now = self.env.clock.now();
        SweepStats {
            sessions: self.registry.sweep_expired(now),
            rate_windows: self.env.rate_limiter.sweep(now),
            lockouts: self.env.lockout.sweep(now),
        }
    }

    /// Run [`Engine::sweep`] every `session.sweep_interval_seconds` until
    /// the engine is dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let period = self.env.config.session.sweep_interval();
        let engine = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                let stats = engine.sweep();
                debug!(?stats, "sweep finished");
            }
        })
    }

    /// Answer a request whose session was evicted while it waited. Callers
    /// that require continuity get the error; everyone else is restarted.
    async fn after_eviction(
        &self,
        event: &InboundEvent,
        root: &Arc<MachineDefinition>,
    ) -> Result<SessionReply, EngineError> {
        if event.require_continuity {
            return Err(EngineError::SessionExpired {
                session_id: event.session_id.clone(),
            });
        }

        let resolved = self.registry.resolve(seed(event), root, Continuity::Restart)?;
        let session = resolved.handle.lock().await;
        if resolved.handle.is_evicted() {
            return Err(EngineError::SessionExpired {
                session_id: event.session_id.clone(),
            });
        }
        info!(session = %event.session_id, "evicted session restarted");

        let denial = match self.env.status.check() {
            Err(denial) => denial,
            Ok(()) => Denial::new(ErrorKind::SessionExpired, "session", reasons::SESSION_EXPIRED),
        };
        Ok(self.reply(root, &session.runtime, Some(&denial), true))
    }

    fn reply(
        &self,
        root: &MachineDefinition,
        runtime: &MachineRuntime,
        denial: Option<&Denial>,
        restarted: bool,
    ) -> SessionReply {
        let context = runtime.active_context();
        let state_path = runtime.state_path();
        let message_key = format!("{}.{}", root.name(), state_path.join("."));

        let mut params = context.fields.clone();
        if let Some(denial) = denial {
            params.insert("error".to_string(), denial.reason.clone());
            if let Some(remaining) = denial.attempts_remaining {
                params.insert("attempts_remaining".to_string(), remaining.to_string());
            }
        }
        let display_text = self
            .resolver
            .resolve_text(&message_key, &context.locale, &params);

        SessionReply {
            session_id: context.session_id.clone(),
            message_key,
            display_text,
            state_path,
            is_terminal: runtime.is_terminated(),
            error_kind: denial.map(|d| d.kind),
            error_reason: denial.map(|d| d.reason.clone()),
            attempts_remaining: denial.and_then(|d| d.attempts_remaining),
            restarted,
        }
    }

    fn rate_limited(&self, event: &InboundEvent) -> SessionReply {
        let message_key = "rate_limited".to_string();
        let locale = event.locale.as_deref().unwrap_or("en");
        let display_text = self
            .resolver
            .resolve_text(&message_key, locale, &BTreeMap::new());
        SessionReply {
            session_id: event.session_id.clone(),
            message_key,
            display_text,
            state_path: Vec::new(),
            is_terminal: false,
            error_kind: Some(ErrorKind::RateLimited),
            error_reason: Some(reasons::RATE_LIMITED.to_string()),
            attempts_remaining: None,
            restarted: false,
        }
    }
}

fn seed(event: &InboundEvent) -> SessionSeed {
    let seed = SessionSeed::new(&event.session_id, &event.identity_key, &event.service_code);
    match &event.locale {
        Some(locale) => seed.with_locale(locale),
        None => seed,
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("env", &self.env)
            .field("catalog", &self.catalog)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TransitionBuilder;
    use crate::clock::MockClock;
    use crate::core::Output;
    use crate::guards::navigation;
    use crate::port::InMemoryQueryPort;
    use chrono::{TimeZone, Utc};

    fn menu() -> Arc<MachineDefinition> {
        MachineDefinition::builder("menu")
            .initial("home")
            .state("home")
            .state("info")
            .final_state("bye", Output::new("closed"))
            .transition(TransitionBuilder::input("home", "info").guard(navigation::option("1")))
            .unwrap()
            .transition(TransitionBuilder::input("info", "bye").guard(navigation::option("0")))
            .unwrap()
            .build()
            .unwrap()
    }

    fn engine(config: EngineConfig) -> Engine {
        let clock = MockClock::new(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap());
        Engine::builder(config, Arc::new(InMemoryQueryPort::new()))
            .clock(Arc::new(clock))
            .flow("*100#", menu())
            .build()
            .unwrap()
    }

    fn event(input: &str) -> InboundEvent {
        InboundEvent::new("s1", "254700", "*100#", input)
    }

    #[tokio::test]
    async fn opening_request_shows_initial_screen() {
        let engine = engine(EngineConfig::default());
        let reply = engine.handle(event("")).await.unwrap();

        assert_eq!(reply.message_key, "menu.home");
        assert_eq!(reply.display_text, "menu.home");
        assert_eq!(reply.error_kind, None);
        assert!(!reply.is_terminal);
    }

    #[tokio::test]
    async fn terminal_reply_evicts_session() {
        let engine = engine(EngineConfig::default());
        engine.handle(event("")).await.unwrap();
        engine.handle(event("1")).await.unwrap();

        let reply = engine.handle(event("0")).await.unwrap();
        assert!(reply.is_terminal);
        assert_eq!(reply.state_path, vec!["bye"]);
        assert!(engine.registry().get("s1").is_none());
    }

    #[tokio::test]
    async fn denial_is_reported_in_reply() {
        let engine = engine(EngineConfig::default());
        engine.handle(event("")).await.unwrap();

        let reply = engine.handle(event("7")).await.unwrap();
        assert_eq!(reply.error_kind, Some(ErrorKind::InputRejected));
        assert_eq!(reply.error_reason.as_deref(), Some("invalid selection"));
        assert_eq!(reply.state_path, vec!["home"]);
    }

    #[tokio::test]
    async fn unknown_service_code_is_an_error() {
        let engine = engine(EngineConfig::default());
        let err = engine
            .handle(InboundEvent::new("s1", "254700", "*999#", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownService { .. }));
    }

    #[tokio::test]
    async fn rate_limit_applies_before_session_lookup() {
        let mut config = EngineConfig::default();
        config.rate_limit.requests_per_window = 2;
        let engine = engine(config);

        engine.handle(event("")).await.unwrap();
        engine.handle(event("1")).await.unwrap();
        let reply = engine.handle(event("0")).await.unwrap();

        assert_eq!(reply.error_kind, Some(ErrorKind::RateLimited));
        assert_eq!(reply.error_reason.as_deref(), Some("rate limited"));
        assert!(engine.registry().get("s1").is_some());
    }

    #[test]
    fn duplicate_service_codes_are_rejected() {
        let result = Engine::builder(EngineConfig::default(), Arc::new(InMemoryQueryPort::new()))
            .flow("*100#", menu())
            .flow("*100#", menu())
            .build();
        assert!(matches!(result, Err(EngineError::DuplicateService { .. })));
    }

    #[test]
    fn invalid_flow_is_never_registered() {
        let result = Engine::builder(EngineConfig::default(), Arc::new(InMemoryQueryPort::new()))
            .flow_from("*100#", MachineDefinition::builder("broken").initial("missing"));
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn invalid_config_fails_build() {
        let mut config = EngineConfig::default();
        config.pin.max_attempts = 0;
        let result = Engine::builder(config, Arc::new(InMemoryQueryPort::new())).build();
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_idle_sessions_without_traffic() {
        let mut config = EngineConfig::default();
        config.session.sweep_interval_seconds = 10;
        let clock = MockClock::new(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap());
        let engine = Arc::new(
            Engine::builder(config, Arc::new(InMemoryQueryPort::new()))
                .clock(Arc::new(clock.clone()))
                .flow("*100#", menu())
                .build()
                .unwrap(),
        );
        engine.handle(event("")).await.unwrap();
        let sweeper = engine.spawn_sweeper();

        tokio::time::sleep(std::time::Duration::from_secs(11)).await;
        assert!(engine.registry().get("s1").is_some());

        clock.advance(chrono::Duration::minutes(4));
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert!(engine.registry().get("s1").is_none());

        drop(engine);
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert!(sweeper.is_finished());
    }

    #[tokio::test]
    async fn cancel_evicts() {
        let engine = engine(EngineConfig::default());
        engine.handle(event("")).await.unwrap();

        assert!(engine.cancel("s1"));
        assert!(!engine.cancel("s1"));
    }
}
