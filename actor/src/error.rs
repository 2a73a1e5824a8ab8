// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Errors module
//!

use crate::ActorPath;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::time::Duration;

/// Error type for the actor system.
///
/// Faults raised by behaviors (a message handler, an initial-state computation or a replayed
/// event) never reach the caller that dispatched the message: they are routed to the
/// supervision policy of the faulted actor. The variants a caller observes directly are
/// `InvalidName`, `DuplicateName`, `ActorStopped`, `ActorNotFound`, `MissingTimeout`,
/// `QueryTimeout` and `Start`.
#[derive(Clone, Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// A path segment or system name failed validation.
    #[error("Invalid name: '{0}'.")]
    InvalidName(String),
    /// A sibling (or system) with the same name already exists.
    #[error("Name '{name}' is already taken under {parent}.")]
    DuplicateName { name: String, parent: String },
    /// The actor or system has been stopped.
    #[error("Actor {0} is stopped.")]
    ActorStopped(ActorPath),
    /// The reference does not resolve to a live actor.
    #[error("Actor {0} not found.")]
    ActorNotFound(String),
    /// A query was issued without a timeout.
    #[error("A query requires a non-zero timeout.")]
    MissingTimeout,
    /// No reply arrived before the query deadline.
    #[error("Query timed out after {0:?}.")]
    QueryTimeout(Duration),
    /// An internal invariant was violated.
    #[error("Assertion failure: {0}")]
    Assertion(String),
    /// A persisted event could not be replayed.
    #[error("Recovery error: {0}")]
    Recovery(String),
    /// The persistence engine rejected an operation.
    #[error("Persistence error: {0}")]
    Persistence(String),
    /// An error occurred while sending a message to an actor.
    #[error("An error occurred while sending a message to actor: {0}.")]
    Send(String),
    /// A deferred reply was dropped before it was settled.
    #[error("An error occurred while receiving a reply: {0}.")]
    Receive(String),
    /// The actor could not be started.
    #[error("An error occurred while starting the actor: {0}.")]
    Start(String),
    /// Error raised by user code while handling a message.
    #[error("Error: {0}")]
    Functional(String),
}

impl Error {
    /// True for errors that indicate a broken runtime invariant. These are never handed to
    /// a supervision policy.
    pub fn is_assertion(&self) -> bool {
        matches!(self, Error::Assertion(_))
    }
}
