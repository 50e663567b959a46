//! Sample flows and engine fixtures shared by the integration tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use menuflow::builder::TransitionBuilder;
use menuflow::clock::MockClock;
use menuflow::core::{Event, MachineDefinition, Output};
use menuflow::guards::domain::{self, AmountSource};
use menuflow::guards::{navigation, validation};
use menuflow::port::InMemoryQueryPort;
use menuflow::{Engine, EngineConfig, InboundEvent};
use std::sync::Arc;

pub const SERVICE: &str = "*123#";
pub const PHONE: &str = "254700111222";
pub const PIN: &str = "1234";
pub const BALANCE: i64 = 100_000;

pub fn login() -> Arc<MachineDefinition> {
    MachineDefinition::builder("login")
        .initial("enter_pin")
        .state("enter_pin")
        .final_state("authenticated", Output::new("authenticated"))
        .transition(
            TransitionBuilder::input("enter_pin", "authenticated")
                .guard(validation::pin_format(4))
                .guard(domain::pin_authenticated()),
        )
        .unwrap()
        .build()
        .unwrap()
}

pub fn create_account() -> Arc<MachineDefinition> {
    MachineDefinition::builder("create_account")
        .initial("new_pin")
        .state("new_pin")
        .state("confirm_pin")
        .final_state("created", Output::new("account_created"))
        .transition(
            TransitionBuilder::input("new_pin", "confirm_pin")
                .guard(validation::pin_format(4))
                .capture("new_pin"),
        )
        .unwrap()
        .transition(
            TransitionBuilder::input("confirm_pin", "created")
                .guard(validation::matches_field("new_pin", "PINs do not match")),
        )
        .unwrap()
        .build()
        .unwrap()
}

pub fn transfer() -> Arc<MachineDefinition> {
    MachineDefinition::builder("transfer")
        .initial("enter_recipient")
        .state("enter_recipient")
        .state("enter_amount")
        .state("enter_pin")
        .final_state("done", Output::new("transfer_done"))
        .transition(
            TransitionBuilder::input("enter_recipient", "enter_amount")
                .guard(validation::numeric())
                .capture("recipient"),
        )
        .unwrap()
        .transition(
            TransitionBuilder::input("enter_amount", "enter_pin")
                .guard(validation::amount_within_single_limit())
                .capture("amount"),
        )
        .unwrap()
        .transition(
            TransitionBuilder::input("enter_pin", "done")
                .guard(validation::pin_format(4))
                .guard(domain::pin_authenticated())
                .guard(domain::within_transaction_limits(AmountSource::field("amount"))),
        )
        .unwrap()
        .build()
        .unwrap()
}

fn output_event(output: &Output) -> Event {
    Event::new(output.as_str(), "")
}

/// Root flow: welcome menu, then login or account creation, then the main
/// menu with transfers.
pub fn account() -> Arc<MachineDefinition> {
    MachineDefinition::builder("account")
        .initial("welcome")
        .state("welcome")
        .sub_flow("login", login(), output_event)
        .sub_flow("register", create_account(), output_event)
        .state("menu")
        .sub_flow("transfer", transfer(), output_event)
        .final_state("bye", Output::new("closed"))
        .transition(TransitionBuilder::input("welcome", "login").guard(navigation::option("1")))
        .unwrap()
        .transition(TransitionBuilder::input("welcome", "register").guard(navigation::option("2")))
        .unwrap()
        .transition(TransitionBuilder::new().from("login").on("authenticated").to("menu"))
        .unwrap()
        .transition(TransitionBuilder::new().from("register").on("account_created").to("menu"))
        .unwrap()
        .transition(TransitionBuilder::input("menu", "transfer").guard(navigation::option("2")))
        .unwrap()
        .transition(TransitionBuilder::new().from("transfer").on("transfer_done").to("menu"))
        .unwrap()
        .transition(TransitionBuilder::input("menu", "bye").guard(navigation::one_of(&["0", "00"])))
        .unwrap()
        .build()
        .unwrap()
}

/// The account flow with the login sub-flow replaced by a plain state,
/// used to check that composition is transparent to the parent.
pub fn account_without_login_child() -> Arc<MachineDefinition> {
    MachineDefinition::builder("account")
        .initial("welcome")
        .state("welcome")
        .state("login")
        .state("menu")
        .transition(TransitionBuilder::input("welcome", "login").guard(navigation::option("1")))
        .unwrap()
        .transition(TransitionBuilder::new().from("login").on("authenticated").to("menu"))
        .unwrap()
        .build()
        .unwrap()
}

pub fn port() -> Arc<InMemoryQueryPort> {
    let port = Arc::new(InMemoryQueryPort::new());
    port.set_credential(PHONE, PIN);
    port.set_balance(PHONE, BALANCE);
    port
}

pub struct Fixture {
    pub engine: Arc<Engine>,
    pub port: Arc<InMemoryQueryPort>,
    pub clock: MockClock,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let port = port();
        let clock = MockClock::new(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap());
        let engine = Engine::builder(config, port.clone())
            .clock(Arc::new(clock.clone()))
            .flow(SERVICE, account())
            .build()
            .unwrap();
        Self {
            engine: Arc::new(engine),
            port,
            clock,
        }
    }

    pub fn event(&self, session_id: &str, input: &str) -> InboundEvent {
        InboundEvent::new(session_id, PHONE, SERVICE, input)
    }

    /// Send inputs in order on one session, panicking on engine errors.
    pub async fn send(&self, session_id: &str, inputs: &[&str]) -> Vec<menuflow::SessionReply> {
        let mut replies = Vec::with_capacity(inputs.len());
        for input in inputs {
            replies.push(self.engine.handle(self.event(session_id, input)).await.unwrap());
        }
        replies
    }
}
