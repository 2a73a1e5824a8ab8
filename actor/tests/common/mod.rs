// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Counter actor and helpers shared by the integration tests.

#![allow(dead_code)]

use actor::{
    spawn, start, Actor, ActorConfig, ActorContext, ActorRef, Directive, Error,
    InitContext, Registry, SystemConfig, SystemRef,
};
use async_trait::async_trait;

use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum Tally {
    Add(u64),
    Fail,
    Get(ActorRef<u64>),
    Spawn(String, Directive, ActorRef<ActorRef<Tally>>),
}

pub struct Counter;

#[async_trait]
impl Actor for Counter {
    type Message = Tally;
    type State = u64;

    async fn initial_state(
        &self,
        _ctx: &InitContext<Tally>,
    ) -> Result<u64, Error> {
        Ok(0)
    }

    async fn handle(
        &self,
        state: u64,
        message: Tally,
        ctx: &ActorContext<Tally>,
    ) -> Result<u64, Error> {
        match message {
            Tally::Add(n) => Ok(state + n),
            Tally::Fail => Err(Error::Functional("boom".to_owned())),
            Tally::Get(reply_to) => {
                reply_to.dispatch(state)?;
                Ok(state)
            }
            Tally::Spawn(name, directive, reply_to) => {
                let child = spawn(
                    ctx.reference(),
                    Counter,
                    ActorConfig::named(&name).on_crash(directive),
                )?;
                reply_to.dispatch(child)?;
                Ok(state)
            }
        }
    }
}

/// Starts a system in a registry of its own.
pub fn system(name: &str) -> SystemRef {
    start(SystemConfig::new(name).registry(Registry::new())).unwrap()
}

/// Spawns a top-level counter.
pub fn counter(
    system: &SystemRef,
    name: &str,
    directive: Directive,
) -> ActorRef<Tally> {
    spawn(system, Counter, ActorConfig::named(name).on_crash(directive))
        .unwrap()
}

/// Asks `parent` to spawn a counter child.
pub async fn child(
    parent: &ActorRef<Tally>,
    name: &str,
    directive: Directive,
) -> ActorRef<Tally> {
    parent
        .query(
            |reply_to| Tally::Spawn(name.to_owned(), directive, reply_to),
            TIMEOUT,
        )
        .await
        .unwrap()
}

pub async fn total(counter: &ActorRef<Tally>) -> Result<u64, Error> {
    counter.query(Tally::Get, TIMEOUT).await
}

/// Polls `check` for up to a second.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Polls the counter until it reports `expected`.
pub async fn settles(counter: &ActorRef<Tally>, expected: u64) -> bool {
    for _ in 0..50 {
        if total(counter).await == Ok(expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
