// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Supervision
//!
//! When a behavior fails, the faulted actor asks its supervision policy for exactly one
//! [`Directive`]. A policy is any [`SupervisionPolicy`]: a constant directive, a closure
//! over the [`Fault`] and its [`SupervisionContext`], or a type with an asynchronous
//! decision procedure. Escalated faults are decided again by the parent's policy, with the
//! escalating actor named as the faulted child.
//!

use crate::{
    actor::Message,
    cell::{ActorCell, Node},
    reference::ActorRef,
    ActorPath, Error, Reference,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use std::{any::Any, fmt::Debug, sync::Arc};

/// Supervision directive.
///
/// `S` below is the actor whose policy produced the directive and `C` the faulted child
/// when `S` is deciding on an escalated fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Directive {
    /// `S` keeps processing its mailbox with its state unchanged. Only meaningful when the
    /// fault happened in `S`'s own message handling.
    Resume,
    /// `S` stops its children, recomputes its initial state and keeps processing.
    Reset,
    /// `S` stops, together with all its descendants.
    Stop,
    /// The fault is handed to `S`'s parent, naming `S` as the faulted child.
    Escalate,
    /// `S` and every sibling of `S` stop.
    StopAll,
    /// Every child of `S` stops; `S` continues.
    StopAllChildren,
    /// The faulted child `C` stops.
    StopChild,
    /// `S` and every sibling of `S` are reset.
    ResetAll,
    /// Every child of `S` is reset; `S` continues.
    ResetAllChildren,
    /// The faulted child `C` is reset.
    ResetChild,
}

/// Where a fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOrigin {
    /// A message handler failed.
    Message,
    /// The initial-state computation failed.
    Initialization,
    /// Replaying a persisted event failed.
    Recovery,
}

/// Type-erased message carried by a fault, so that supervisors of any message type can
/// inspect what their children were processing.
pub(crate) trait FaultMessage: Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Debug + Send + Sync> FaultMessage for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A failure routed to a supervision policy.
#[derive(Clone)]
pub struct Fault {
    message: Option<Arc<dyn FaultMessage>>,
    error: Error,
    child: Option<Reference>,
    origin: FaultOrigin,
}

impl Fault {
    pub(crate) fn message_handling<M: Message>(message: M, error: Error) -> Self {
        Self {
            message: Some(Arc::new(message)),
            error,
            child: None,
            origin: FaultOrigin::Message,
        }
    }

    pub(crate) fn initialization(error: Error) -> Self {
        Self {
            message: None,
            error,
            child: None,
            origin: FaultOrigin::Initialization,
        }
    }

    pub(crate) fn recovery<M: Message>(message: Option<M>, error: Error) -> Self {
        Self {
            message: message
                .map(|message| Arc::new(message) as Arc<dyn FaultMessage>),
            error,
            child: None,
            origin: FaultOrigin::Recovery,
        }
    }

    /// The same fault as seen by the parent of `child`.
    pub(crate) fn escalated(self, child: Reference) -> Self {
        Self {
            child: Some(child),
            ..self
        }
    }

    /// The message being processed when the fault was raised, if it is a `T`.
    pub fn message<T: Any>(&self) -> Option<&T> {
        self.message
            .as_deref()
            .and_then(|message| message.as_any().downcast_ref::<T>())
    }

    /// True if the fault was raised while processing a message.
    pub fn has_message(&self) -> bool {
        self.message.is_some()
    }

    pub fn error(&self) -> &Error {
        &self.error
    }

    /// The faulted child, when the fault was escalated to this supervisor.
    pub fn child(&self) -> Option<&Reference> {
        self.child.as_ref()
    }

    pub fn origin(&self) -> FaultOrigin {
        self.origin
    }
}

impl Debug for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fault")
            .field("message", &self.message)
            .field("error", &self.error)
            .field("child", &self.child)
            .field("origin", &self.origin)
            .finish()
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => {
                write!(f, "'{}' while processing {:?}", self.error, message)
            }
            None => write!(f, "'{}'", self.error),
        }
    }
}

/// What the policy of a faulted actor can see.
pub struct SupervisionContext<M: Message> {
    cell: Arc<ActorCell<M>>,
    mailbox: Vec<M>,
    child: Option<Reference>,
}

impl<M: Message> SupervisionContext<M> {
    pub(crate) fn new(cell: Arc<ActorCell<M>>, child: Option<Reference>) -> Self {
        let mailbox = cell.mailbox_snapshot();
        Self {
            cell,
            mailbox,
            child,
        }
    }

    /// Reference to the supervisor of the faulted actor.
    pub fn parent(&self) -> &Reference {
        self.cell.parent_reference()
    }

    /// Reference to the actor whose policy is being consulted.
    pub fn reference(&self) -> ActorRef<M> {
        self.cell.actor_ref()
    }

    pub fn name(&self) -> &str {
        self.cell.name()
    }

    pub fn path(&self) -> &ActorPath {
        self.cell.path()
    }

    /// Messages still queued at the time of the fault, oldest first.
    pub fn mailbox(&self) -> &[M] {
        &self.mailbox
    }

    /// The faulted child when deciding on an escalated fault.
    pub fn child(&self) -> Option<&Reference> {
        self.child.as_ref()
    }
}

/// Supervision policy.
#[async_trait]
pub trait SupervisionPolicy<M: Message>: Send + Sync + 'static {
    /// Decides what to do about `fault`.
    async fn decide(&self, fault: &Fault, ctx: &SupervisionContext<M>) -> Directive;
}

/// A constant policy.
#[async_trait]
impl<M: Message> SupervisionPolicy<M> for Directive {
    async fn decide(&self, _fault: &Fault, _ctx: &SupervisionContext<M>) -> Directive {
        *self
    }
}

#[async_trait]
impl<M, F> SupervisionPolicy<M> for F
where
    M: Message,
    F: Fn(&Fault, &SupervisionContext<M>) -> Directive + Send + Sync + 'static,
{
    async fn decide(&self, fault: &Fault, ctx: &SupervisionContext<M>) -> Directive {
        (self)(fault, ctx)
    }
}

/// Policy used when none is configured: log the fault and stop the faulted actor.
pub(crate) fn stop_and_log(fault: &Fault, path: &ActorPath) -> Directive {
    match (&fault.message, &fault.child) {
        (Some(message), Some(child)) => error!(
            "{}: child {} raised '{}' while processing {:?}. Stopping faulted actor.",
            path, child, fault.error, message
        ),
        (Some(message), None) => error!(
            "{}: '{}' raised while processing {:?}. Stopping faulted actor.",
            path, fault.error, message
        ),
        (None, Some(child)) => error!(
            "{}: child {} raised '{}'. Stopping faulted actor.",
            path, child, fault.error
        ),
        (None, None) => error!(
            "{}: '{}' raised while computing initial state. Stopping faulted actor.",
            path, fault.error
        ),
    }
    Directive::Stop
}
