// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the `Actor` trait, the contexts handed to its hooks and the
//! `spawn` operation. An actor is a behavior plus a state value: each message is handled by
//! a call that receives the current state and returns the next one, one message at a time.
//!

use crate::{
    cell::{ActorCell, Control, Node},
    reference::{ActorRef, Reference},
    registry::Resolved,
    runner::ActorRunner,
    supervision::{
        stop_and_log, Directive, Fault, SupervisionContext, SupervisionPolicy,
    },
    system::SystemRef,
    ActorPath, Error,
};

use async_trait::async_trait;

use tokio::sync::mpsc;

use std::{
    collections::BTreeMap,
    fmt::Debug,
    ops::Deref,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

/// Messages accepted by actors.
///
/// Implemented for every `Clone + Debug + Send + Sync + 'static` type. `Clone` lets
/// supervision policies inspect the pending mailbox and `Debug` lets the default policy log
/// the offending message.
pub trait Message: Clone + Debug + Send + Sync + 'static {}

impl<T> Message for T where T: Clone + Debug + Send + Sync + 'static {}

/// The `Actor` trait is the main trait that actors must implement.
///
/// The behavior itself is immutable (`&self`); everything that changes between messages
/// lives in [`Actor::State`], which the runtime owns and passes in and out of
/// [`Actor::handle`]. A handler that returns an error does not reach the sender of the
/// message: the error becomes a [`Fault`] and is routed to the actor's supervision policy,
/// which is [`Actor::on_crash`] unless overridden in [`ActorConfig`].
///
/// # Lifecycle
///
/// 1. `initial_state` runs once the actor is spawned (and again after every reset). Messages
///    dispatched meanwhile wait in the mailbox.
/// 2. `handle` runs for every message, strictly one at a time and in dispatch order, and
///    is followed by `after_message` when it succeeds.
/// 3. `after_stop` runs once the actor has been stopped, with the final state and the
///    messages that were never processed.
///
/// # Examples
///
/// ```ignore
/// use actor::{Actor, ActorContext, ActorRef, Error, InitContext};
/// use async_trait::async_trait;
///
/// #[derive(Debug, Clone)]
/// enum Count {
///     Add(u64),
///     Get(ActorRef<u64>),
/// }
///
/// struct Counter;
///
/// #[async_trait]
/// impl Actor for Counter {
///     type Message = Count;
///     type State = u64;
///
///     async fn initial_state(&self, _ctx: &InitContext<Count>) -> Result<u64, Error> {
///         Ok(0)
///     }
///
///     async fn handle(
///         &self,
///         state: u64,
///         message: Count,
///         _ctx: &ActorContext<Count>,
///     ) -> Result<u64, Error> {
///         match message {
///             Count::Add(n) => Ok(state + n),
///             Count::Get(reply_to) => {
///                 reply_to.dispatch(state)?;
///                 Ok(state)
///             }
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Actor: Send + Sync + Sized + 'static {
    /// Messages this actor accepts.
    type Message: Message;

    /// State threaded through the handler.
    type State: Clone + Send + Sync + 'static;

    /// Computes the state the actor starts (or restarts after a reset) with.
    ///
    /// Skipped when [`ActorConfig::initial_state`] provides a value. An error is routed to
    /// the supervision policy as a fault with no message.
    async fn initial_state(
        &self,
        ctx: &InitContext<Self::Message>,
    ) -> Result<Self::State, Error>;

    /// Handles one message and returns the next state.
    async fn handle(
        &self,
        state: Self::State,
        message: Self::Message,
        ctx: &ActorContext<Self::Message>,
    ) -> Result<Self::State, Error>;

    /// Runs after every successfully handled message, before the next one.
    async fn after_message(
        &self,
        _state: &Self::State,
        _ctx: &ActorContext<Self::Message>,
    ) {
    }

    /// Supervision policy used when the configuration does not provide one. Logs the fault
    /// and stops the actor.
    async fn on_crash(
        &self,
        fault: &Fault,
        ctx: &SupervisionContext<Self::Message>,
    ) -> Directive {
        stop_and_log(fault, ctx.path())
    }

    /// Runs once after the actor has stopped.
    async fn after_stop(
        &self,
        _state: Self::State,
        _ctx: StopContext<Self::Message>,
    ) {
    }
}

/// Context handed to [`Actor::handle`] and [`Actor::after_message`].
///
/// Cheap to clone; it is only a handle on the actor's shared half.
pub struct ActorContext<M: Message> {
    cell: Arc<ActorCell<M>>,
}

impl<M: Message> ActorContext<M> {
    pub(crate) fn new(cell: Arc<ActorCell<M>>) -> Self {
        Self { cell }
    }

    pub(crate) fn cell(&self) -> &Arc<ActorCell<M>> {
        &self.cell
    }

    /// Reference to this actor.
    pub fn reference(&self) -> ActorRef<M> {
        self.cell.actor_ref()
    }

    /// Reference to the supervisor of this actor.
    pub fn parent(&self) -> &Reference {
        self.cell.parent_reference()
    }

    pub fn name(&self) -> &str {
        self.cell.name()
    }

    pub fn path(&self) -> &ActorPath {
        self.cell.path()
    }

    /// A copy of the current child references, by name.
    pub fn children(&self) -> BTreeMap<String, Reference> {
        self.cell.children().references()
    }

    /// Reference to the child named `name`, if it exists.
    pub fn child(&self, name: &str) -> Option<Reference> {
        self.cell.children().get(name).map(|child| child.reference())
    }

    /// The system this actor belongs to, unless it is gone.
    pub fn system(&self) -> Option<SystemRef> {
        self.cell.system()
    }

    /// Stops this actor and its descendants once the current message is done.
    pub fn stop(&self) {
        self.cell.stop();
    }
}

impl<M: Message> Clone for ActorContext<M> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

/// Context handed to [`Actor::initial_state`].
///
/// Dereferences to [`ActorContext`].
pub struct InitContext<M: Message> {
    ctx: ActorContext<M>,
    policy: Arc<dyn SupervisionPolicy<M>>,
    decision: Mutex<Option<(Directive, Fault)>>,
}

impl<M: Message> InitContext<M> {
    pub(crate) fn new(
        cell: Arc<ActorCell<M>>,
        policy: Arc<dyn SupervisionPolicy<M>>,
    ) -> Self {
        Self {
            ctx: ActorContext::new(cell),
            policy,
            decision: Mutex::new(None),
        }
    }

    /// Asks the actor's policy about a fault raised during initialization.
    pub(crate) async fn supervise(&self, fault: &Fault) -> Directive {
        let ctx = SupervisionContext::new(self.ctx.cell.clone(), None);
        self.policy.decide(fault, &ctx).await
    }

    /// Records a directive already decided for `fault`; the runtime applies it instead of
    /// consulting the policy again when initialization fails.
    pub(crate) fn decide(&self, directive: Directive, fault: Fault) {
        *self.decision.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((directive, fault));
    }

    pub(crate) fn take_decision(&self) -> Option<(Directive, Fault)> {
        self.decision
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<M: Message> Deref for InitContext<M> {
    type Target = ActorContext<M>;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

/// Context handed to [`Actor::after_stop`], with the messages left in the mailbox.
///
/// Dereferences to [`ActorContext`].
pub struct StopContext<M: Message> {
    ctx: ActorContext<M>,
    mailbox: Vec<M>,
}

impl<M: Message> StopContext<M> {
    pub(crate) fn new(cell: Arc<ActorCell<M>>, mailbox: Vec<M>) -> Self {
        Self {
            ctx: ActorContext::new(cell),
            mailbox,
        }
    }

    /// Messages that were never processed, oldest first.
    pub fn mailbox(&self) -> &[M] {
        &self.mailbox
    }

    pub fn into_mailbox(self) -> Vec<M> {
        self.mailbox
    }
}

impl<M: Message> Deref for StopContext<M> {
    type Target = ActorContext<M>;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

/// Options for [`spawn`].
///
/// ```ignore
/// let config = ActorConfig::named("worker")
///     .shutdown_after(Duration::from_secs(30))
///     .on_crash(Directive::Resume);
/// ```
pub struct ActorConfig<M: Message, S> {
    pub(crate) name: Option<String>,
    pub(crate) shutdown_after: Option<Duration>,
    pub(crate) on_crash: Option<Arc<dyn SupervisionPolicy<M>>>,
    pub(crate) initial_state: Option<S>,
}

impl<M: Message, S> ActorConfig<M, S> {
    /// Default options: generated name, no idle shutdown, the actor's own policy.
    pub fn new() -> Self {
        Self {
            name: None,
            shutdown_after: None,
            on_crash: None,
            initial_state: None,
        }
    }

    /// Default options with the given name.
    pub fn named(name: &str) -> Self {
        Self::new().name(name)
    }

    /// Name of the actor, unique among its siblings. A random name is generated when
    /// none is given.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Stops the actor once its mailbox has stayed empty for `duration`.
    pub fn shutdown_after(mut self, duration: Duration) -> Self {
        self.shutdown_after = Some(duration);
        self
    }

    /// Supervision policy replacing [`Actor::on_crash`].
    pub fn on_crash<P: SupervisionPolicy<M>>(mut self, policy: P) -> Self {
        self.on_crash = Some(Arc::new(policy));
        self
    }

    /// Initial state replacing [`Actor::initial_state`].
    pub fn initial_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }
}

impl<M: Message, S> Default for ActorConfig<M, S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns `actor` as a child of `parent` and returns its reference.
///
/// The actor is registered in its parent's child table before this function returns, so
/// messages can be dispatched right away; they are processed once the initial state has
/// been computed.
///
/// # Error
///
/// * `Error::ActorNotFound` - `parent` does not resolve to a live actor or system.
/// * `Error::ActorStopped` - `parent` has been stopped.
/// * `Error::InvalidName` - the configured name fails validation.
/// * `Error::DuplicateName` - `parent` already has a child with that name.
/// * `Error::Start` - there is no Tokio runtime to host the actor.
///
pub fn spawn<A: Actor>(
    parent: impl Into<Reference>,
    actor: A,
    config: ActorConfig<A::Message, A::State>,
) -> Result<ActorRef<A::Message>, Error> {
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| Error::Start(e.to_string()))?;
    let (cell, control) =
        create_cell::<A::Message>(&parent.into(), config.name.as_deref())?;
    let runner = ActorRunner::new(cell.clone(), actor, control, config);
    handle.spawn(runner.run());
    Ok(cell.actor_ref())
}

/// Creates the cell of a new child of `parent` and registers it in the child table.
pub(crate) fn create_cell<M: Message>(
    parent: &Reference,
    name: Option<&str>,
) -> Result<(Arc<ActorCell<M>>, mpsc::UnboundedReceiver<Control>), Error> {
    let parent_node = match parent.registry().find(parent) {
        Some(Resolved::Node(node)) => node,
        _ => return Err(Error::ActorNotFound(parent.to_string())),
    };
    if parent_node.is_stopped() {
        return Err(Error::ActorStopped(parent_node.path().clone()));
    }
    let name = match name {
        Some(name) => name.to_owned(),
        None => uuid::Uuid::new_v4().simple().to_string(),
    };
    let path = parent_node.path().child(&name)?;
    let system = parent
        .registry()
        .system(path.system())
        .ok_or_else(|| Error::ActorNotFound(parent.to_string()))?;

    let (cell, control) = ActorCell::new(path, &parent_node, &system);
    parent_node
        .children()
        .insert(parent_node.path(), &name, cell.clone())?;
    Ok((cell, control))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{registry::Registry, ActorSystem, SystemConfig};

    use tracing_test::traced_test;

    #[derive(Debug, Clone, PartialEq)]
    enum Count {
        Add(u64),
        Get(ActorRef<u64>),
        Fail,
    }

    struct Counter;

    #[async_trait]
    impl Actor for Counter {
        type Message = Count;
        type State = u64;

        async fn initial_state(
            &self,
            _ctx: &InitContext<Count>,
        ) -> Result<u64, Error> {
            Ok(0)
        }

        async fn handle(
            &self,
            state: u64,
            message: Count,
            _ctx: &ActorContext<Count>,
        ) -> Result<u64, Error> {
            match message {
                Count::Add(n) => Ok(state + n),
                Count::Get(reply_to) => {
                    reply_to.dispatch(state)?;
                    Ok(state)
                }
                Count::Fail => Err(Error::Functional("fail".to_owned())),
            }
        }
    }

    fn system(name: &str) -> SystemRef {
        ActorSystem::start(SystemConfig::new(name).registry(Registry::new()))
            .unwrap()
    }

    async fn total(counter: &ActorRef<Count>) -> Result<u64, Error> {
        counter
            .query(Count::Get, Duration::from_millis(500))
            .await
    }

    #[tokio::test]
    async fn test_actor() {
        let system = system("actor-basic");
        let counter =
            spawn(&system, Counter, ActorConfig::named("counter")).unwrap();
        assert_eq!(
            counter.path().unwrap().to_string(),
            "actor-basic://counter"
        );
        counter.dispatch(Count::Add(10)).unwrap();
        counter.dispatch(Count::Add(10)).unwrap();
        assert_eq!(total(&counter).await, Ok(20));
        assert_eq!(system.pending_queries(), 0);
        system.stop();
    }

    #[tokio::test]
    async fn test_configured_initial_state() {
        let system = system("actor-initial");
        let counter = spawn(
            &system,
            Counter,
            ActorConfig::named("counter").initial_state(5),
        )
        .unwrap();
        assert_eq!(total(&counter).await, Ok(5));
        system.stop();
    }

    #[tokio::test]
    async fn test_generated_names_are_unique() {
        let system = system("actor-names");
        let one = spawn(&system, Counter, ActorConfig::new()).unwrap();
        let two = spawn(&system, Counter, ActorConfig::new()).unwrap();
        assert_ne!(one, two);
        assert_eq!(system.children().len(), 2);
        system.stop();
    }

    #[tokio::test]
    async fn test_duplicate_name() {
        let system = system("actor-duplicate");
        spawn(&system, Counter, ActorConfig::named("twin")).unwrap();
        let error =
            spawn(&system, Counter, ActorConfig::named("twin")).unwrap_err();
        assert_eq!(
            error,
            Error::DuplicateName {
                name: "twin".to_owned(),
                parent: "actor-duplicate://".to_owned()
            }
        );
        system.stop();
    }

    #[tokio::test]
    async fn test_invalid_name() {
        let system = system("actor-invalid");
        let error = spawn(&system, Counter, ActorConfig::named("two words"))
            .unwrap_err();
        assert_eq!(error, Error::InvalidName("two words".to_owned()));
        assert!(system.children().is_empty());
        system.stop();
    }

    #[tokio::test]
    async fn test_spawn_under_stopped_parent() {
        let system = system("actor-stopped-parent");
        let parent =
            spawn(&system, Counter, ActorConfig::named("parent")).unwrap();
        parent.stop();
        assert!(matches!(
            spawn(&parent, Counter, ActorConfig::named("child")),
            Err(Error::ActorNotFound(_))
        ));
        system.stop();
        assert!(matches!(
            spawn(&system, Counter, ActorConfig::named("late")),
            Err(Error::ActorNotFound(_)) | Err(Error::ActorStopped(_))
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_default_policy_stops_actor() {
        let system = system("actor-default-policy");
        let counter =
            spawn(&system, Counter, ActorConfig::named("counter")).unwrap();
        counter.dispatch(Count::Fail).unwrap();
        let mut stopped = false;
        for _ in 0..50 {
            if !counter.is_alive() {
                stopped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(stopped);
        assert!(logs_contain("Stopping faulted actor"));
        assert!(logs_contain("Fail"));
        assert!(!system.is_stopped());
        system.stop();
    }
}
