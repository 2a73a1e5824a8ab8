// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runtime
//!
//! An in-process actor runtime: a tree of addressable, stateful actors that communicate
//! only by asynchronous messages, are supervised by their parent for fault recovery, and
//! may persist the messages they accept as an event-sourced journal with periodic
//! snapshots.
//!
//! ## Overview
//!
//! Every actor lives under a parent (another actor or the root of an [`ActorSystem`]) and is
//! addressed by an [`ActorPath`] such as `orders://billing/invoices`. Callers hold a
//! [`Reference`] (or its typed form, [`ActorRef`]) which is resolved through the
//! [`Registry`] on every use, so a reference never keeps an actor alive and never exposes
//! its internals.
//!
//! An actor processes its mailbox one message at a time, in dispatch order. Its state is
//! owned by its own task and threaded through [`Actor::handle`]; no lock protects it
//! because nothing else can reach it. Different actors run concurrently.
//!
//! ### Supervision
//!
//! A handler that fails does not report to whoever sent the message. The failure becomes a
//! [`Fault`] and the faulted actor's [`SupervisionPolicy`] picks one of ten
//! [`Directive`]s: resume, reset, stop, escalate to the parent, or act on siblings or
//! children. Escalation past the top level stops only the escalating actor, never the
//! system.
//!
//! ### Request and response
//!
//! Messages are one-way. [`ActorRef::query`] turns a message into a call: it registers a
//! temporary reference, hands it to a message builder so the receiver knows where to reply,
//! and waits for the reply or the timeout, whichever comes first.
//!
//! ### Persistence
//!
//! A [`PersistentActor`] records accepted messages through a [`PersistenceEngine`] and
//! rebuilds its state from the latest snapshot and the journal when it starts.
//!
//! ## Getting Started
//!
//! ```ignore
//! use actor::{
//!     spawn, start, Actor, ActorConfig, ActorContext, ActorRef, Error, InitContext,
//!     SystemConfig,
//! };
//! use async_trait::async_trait;
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone)]
//! enum Count {
//!     Add(u64),
//!     Get(ActorRef<u64>),
//! }
//!
//! struct Counter;
//!
//! #[async_trait]
//! impl Actor for Counter {
//!     type Message = Count;
//!     type State = u64;
//!
//!     async fn initial_state(&self, _ctx: &InitContext<Count>) -> Result<u64, Error> {
//!         Ok(0)
//!     }
//!
//!     async fn handle(
//!         &self,
//!         state: u64,
//!         message: Count,
//!         _ctx: &ActorContext<Count>,
//!     ) -> Result<u64, Error> {
//!         match message {
//!             Count::Add(n) => Ok(state + n),
//!             Count::Get(reply_to) => {
//!                 reply_to.dispatch(state)?;
//!                 Ok(state)
//!             }
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let system = start(SystemConfig::new("example"))?;
//!     let counter = spawn(&system, Counter, ActorConfig::named("counter"))?;
//!
//!     counter.dispatch(Count::Add(5))?;
//!     counter.dispatch(Count::Add(3))?;
//!     let total = counter.query(Count::Get, Duration::from_secs(1)).await?;
//!     assert_eq!(total, 8);
//!
//!     system.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## API Organization
//!
//! - **Actors**: [`Actor`], [`ActorContext`], [`InitContext`], [`StopContext`],
//!   [`ActorConfig`], [`spawn`], [`spawn_stateless`]
//! - **Addressing**: [`ActorPath`], [`Reference`], [`ActorRef`], [`Registry`]
//! - **Systems**: [`ActorSystem`], [`SystemRef`], [`SystemConfig`], [`start`]
//! - **Supervision**: [`Directive`], [`Fault`], [`SupervisionPolicy`],
//!   [`SupervisionContext`]
//! - **Persistence**: [`PersistentActor`], [`PersistentContext`], [`PersistentConfig`],
//!   [`PersistenceEngine`], [`PersistedEvent`], [`PersistedSnapshot`], [`Codec`],
//!   [`spawn_persistent`]
//! - **Errors**: [`Error`]
//!

mod actor;
mod cell;
mod deferral;
mod error;
mod path;
mod persistent;
mod reference;
mod registry;
mod runner;
mod stateless;
mod supervision;
mod system;

//
// Actors
//

/// Behavior and state of a stateful actor.
///
/// See [`ActorContext`] for what a handler can reach.
pub use actor::Actor;

/// Options used when spawning an actor.
pub use actor::ActorConfig;

/// Context handed to message handlers.
pub use actor::ActorContext;

/// Context handed to initial-state computations.
pub use actor::InitContext;

/// Messages accepted by actors, implemented for every suitable type.
pub use actor::Message;

/// Context handed to the after-stop hook, with the unprocessed messages.
pub use actor::StopContext;

/// Spawns a stateful actor under a parent.
pub use actor::spawn;

/// Spawns an actor running each message in its own task.
pub use stateless::spawn_stateless;

//
// Addressing
//

/// Hierarchical actor address.
pub use path::ActorPath;

/// Validates a system name or path segment.
pub use path::is_valid_name;

/// Untyped actor, system, temporary or nobody reference.
pub use reference::Reference;

/// Reference to an actor with a known message type.
pub use reference::ActorRef;

/// System name to live system table.
pub use registry::Registry;

//
// Systems
//

/// Entry point to start actor systems.
pub use system::ActorSystem;

/// Options used when starting a system.
pub use system::SystemConfig;

/// Handle to a running system.
pub use system::SystemRef;

//
// Supervision
//

/// The closed set of supervision decisions.
pub use supervision::Directive;

/// A failure routed to a supervision policy.
pub use supervision::Fault;

/// Where a fault was raised.
pub use supervision::FaultOrigin;

/// What a policy sees when it decides.
pub use supervision::SupervisionContext;

/// Supervision decision procedure.
pub use supervision::SupervisionPolicy;

//
// Persistence
//

pub use persistent::BincodeCodec;
pub use persistent::Codec;
pub use persistent::PersistedEvent;
pub use persistent::PersistedSnapshot;
pub use persistent::PersistenceEngine;
pub use persistent::PersistentActor;
pub use persistent::PersistentConfig;
pub use persistent::PersistentContext;

/// Spawns a persistent actor, replaying its journal before it handles messages.
pub use persistent::spawn_persistent;

/// Error type for the actor runtime.
pub use error::Error;

use std::time::Duration;

/// Starts an actor system. See [`ActorSystem::start`].
pub fn start(config: SystemConfig) -> Result<SystemRef, Error> {
    ActorSystem::start(config)
}

/// Sends `message` to the actor behind `reference`. See [`Reference::dispatch`].
pub fn dispatch<M: Message>(
    reference: &Reference,
    message: M,
) -> Result<(), Error> {
    reference.dispatch(message)
}

/// Sends the message built by `builder` and waits for the reply. See
/// [`Reference::query`].
pub async fn query<M, R, F>(
    reference: &Reference,
    builder: F,
    timeout: impl Into<Option<Duration>>,
) -> Result<R, Error>
where
    M: Message,
    R: Message,
    F: FnOnce(ActorRef<R>) -> M,
{
    reference.query(builder, timeout).await
}

/// Stops the actor or system behind `reference`, with all its descendants.
pub fn stop(reference: &Reference) {
    reference.stop()
}
