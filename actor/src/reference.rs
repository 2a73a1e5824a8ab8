// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # References
//!
//! The `reference` module provides the handles through which actors are addressed. A
//! [`Reference`] names an actor, a system, a temporary reply address or nobody at all, and
//! is resolved through the registry every time it is used. [`ActorRef`] is the same handle
//! tagged with the message type the actor accepts.
//!

use crate::{
    actor::Message,
    cell::{ActorCell, Node},
    deferral::Deferral,
    registry::{Registry, Resolved},
    system::SystemCore,
    ActorPath, Error,
};

use tracing::debug;

use std::{
    any::type_name, fmt::Formatter, hash::Hash, marker::PhantomData,
    sync::Arc, time::Duration,
};

/// What a reference points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Target {
    Actor(ActorPath),
    System(ActorPath),
    Temporary { system: String, id: u64 },
    Nobody,
}

/// Untyped handle to an actor, a system, a temporary reply address or nobody.
///
/// References are cheap to clone and compare by target only. Holding a reference never
/// keeps an actor alive: every operation resolves it again and fails with
/// `Error::ActorNotFound` once the actor is gone. The nobody reference silently absorbs
/// everything dispatched to it.
#[derive(Clone)]
pub struct Reference {
    target: Target,
    registry: Registry,
}

impl Reference {
    pub(crate) fn actor(path: ActorPath, registry: Registry) -> Self {
        Self {
            target: Target::Actor(path),
            registry,
        }
    }

    pub(crate) fn system(path: ActorPath, registry: Registry) -> Self {
        Self {
            target: Target::System(path),
            registry,
        }
    }

    pub(crate) fn temporary(system: &str, id: u64, registry: Registry) -> Self {
        Self {
            target: Target::Temporary {
                system: system.to_owned(),
                id,
            },
            registry,
        }
    }

    /// The reference that resolves to nothing.
    pub fn nobody() -> Self {
        Self {
            target: Target::Nobody,
            registry: Registry::global(),
        }
    }

    pub(crate) fn target(&self) -> &Target {
        &self.target
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Path of the actor or system. `None` for temporary and nobody references.
    pub fn path(&self) -> Option<&ActorPath> {
        match &self.target {
            Target::Actor(path) | Target::System(path) => Some(path),
            _ => None,
        }
    }

    /// Name of the referenced actor, or of the system for a system reference.
    pub fn name(&self) -> Option<String> {
        match &self.target {
            Target::Actor(path) => Some(path.key()),
            Target::System(path) => Some(path.system().to_owned()),
            _ => None,
        }
    }

    pub fn is_nobody(&self) -> bool {
        self.target == Target::Nobody
    }

    pub fn is_system(&self) -> bool {
        matches!(self.target, Target::System(_))
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.target, Target::Temporary { .. })
    }

    /// Views this reference as accepting messages of type `M`. The type is checked when a
    /// message is dispatched.
    pub fn typed<M: Message>(&self) -> ActorRef<M> {
        ActorRef::new(self.clone())
    }

    /// Sends `message` to the referenced actor.
    ///
    /// # Error
    ///
    /// * `Error::ActorNotFound` - the reference does not resolve to a live actor.
    /// * `Error::ActorStopped` - the actor was stopped while the message was being sent.
    /// * `Error::Send` - the actor does not accept messages of type `M`.
    ///
    pub fn dispatch<M: Message>(&self, message: M) -> Result<(), Error> {
        match &self.target {
            Target::Nobody => Ok(()),
            Target::Temporary { .. } => match self.registry.find(self) {
                Some(Resolved::Temporary(entry)) => {
                    let deferral =
                        entry.downcast::<Deferral<M>>().map_err(|_| {
                            Error::Send(format!(
                                "{} does not expect a reply of type {}",
                                self,
                                type_name::<M>()
                            ))
                        })?;
                    if deferral.is_settled() {
                        debug!("Reply to settled {} dropped.", self);
                    } else {
                        deferral.resolve(message);
                    }
                    Ok(())
                }
                _ => {
                    debug!("Reply to expired {} dropped.", self);
                    Ok(())
                }
            },
            Target::System(_) => Err(Error::Send(format!(
                "system {} does not accept messages",
                self
            ))),
            Target::Actor(_) => {
                self.registry.apply_or_throw_if_stopped(self, |resolved| {
                    resolve_cell::<M>(self, resolved)?.dispatch(message)
                })
            }
        }
    }

    /// Sends the message built by `builder` and waits for the reply sent to the temporary
    /// reference handed to the builder.
    ///
    /// # Error
    ///
    /// * `Error::MissingTimeout` - no timeout, or a zero timeout, was given.
    /// * `Error::QueryTimeout` - no reply arrived before the deadline.
    /// * Any error `dispatch` returns for the outgoing message.
    ///
    pub async fn query<M, R, F>(
        &self,
        builder: F,
        timeout: impl Into<Option<Duration>>,
    ) -> Result<R, Error>
    where
        M: Message,
        R: Message,
        F: FnOnce(ActorRef<R>) -> M,
    {
        let timeout = timeout
            .into()
            .filter(|timeout| !timeout.is_zero())
            .ok_or(Error::MissingTimeout)?;
        let system = self.owning_system()?;

        let (deferral, receiver) = Deferral::<R>::new();
        let deferral = Arc::new(deferral);
        let temporary = system.register_temporary(deferral.clone());
        let reply_to = ActorRef::new(Reference::temporary(
            system.name(),
            temporary.id(),
            self.registry.clone(),
        ));

        self.dispatch(builder(reply_to))?;

        match tokio::time::timeout(timeout, receiver.wait()).await {
            Ok(result) => result,
            Err(_) => {
                deferral.reject(Error::QueryTimeout(timeout));
                debug!("Query to {} timed out after {:?}.", self, timeout);
                Err(Error::QueryTimeout(timeout))
            }
        }
    }

    /// Stops the referenced actor and its descendants, or the whole system for a system
    /// reference. Stopping a reference that no longer resolves does nothing.
    pub fn stop(&self) {
        match self.registry.find(self) {
            Some(Resolved::Node(node)) => node.stop(),
            _ => debug!("Stop of {} ignored, nothing to stop.", self),
        }
    }

    /// True while the reference resolves to a live actor or system.
    pub fn is_alive(&self) -> bool {
        match self.registry.find(self) {
            Some(Resolved::Node(node)) => !node.is_stopped(),
            Some(Resolved::Temporary(_)) => true,
            None => false,
        }
    }

    fn owning_system(&self) -> Result<Arc<SystemCore>, Error> {
        let name = match &self.target {
            Target::Actor(path) | Target::System(path) => path.system(),
            Target::Temporary { system, .. } => system.as_str(),
            Target::Nobody => {
                return Err(Error::ActorNotFound(self.to_string()));
            }
        };
        self.registry
            .system(name)
            .ok_or_else(|| Error::ActorNotFound(self.to_string()))
    }
}

/// Downcasts a resolved node to the cell of an actor accepting `M`.
pub(crate) fn resolve_cell<M: Message>(
    reference: &Reference,
    resolved: Resolved,
) -> Result<Arc<ActorCell<M>>, Error> {
    match resolved {
        Resolved::Node(node) => {
            if node.is_stopped() {
                return Err(Error::ActorStopped(node.path().clone()));
            }
            node.into_any().downcast::<ActorCell<M>>().map_err(|_| {
                Error::Send(format!(
                    "{} does not accept messages of type {}",
                    reference,
                    type_name::<M>()
                ))
            })
        }
        Resolved::Temporary(_) => {
            Err(Error::ActorNotFound(reference.to_string()))
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
    }
}

impl Eq for Reference {}

impl Hash for Reference {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.target.hash(state);
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Target::Actor(path) | Target::System(path) => write!(f, "{}", path),
            Target::Temporary { system, id } => {
                write!(f, "{}://$temp/{}", system, id)
            }
            Target::Nobody => write!(f, "nobody"),
        }
    }
}

impl std::fmt::Debug for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Reference({})", self)
    }
}

/// Handle to an actor accepting messages of type `M`.
///
/// An `ActorRef` is a [`Reference`] with the message type attached, so that `dispatch` and
/// `query` are checked at compile time on the sending side.
///
/// ```ignore
/// let counter = spawn(&system, Counter, ActorConfig::named("counter"))?;
/// counter.dispatch(Count::Add(2))?;
/// let total = counter
///     .query(|reply_to| Count::Get(reply_to), Duration::from_millis(100))
///     .await?;
/// ```
pub struct ActorRef<M> {
    reference: Reference,
    _message: PhantomData<fn(M)>,
}

impl<M: Message> ActorRef<M> {
    pub(crate) fn new(reference: Reference) -> Self {
        Self {
            reference,
            _message: PhantomData,
        }
    }

    /// A typed nobody reference.
    pub fn nobody() -> Self {
        Self::new(Reference::nobody())
    }

    /// Sends `message` to the actor.
    ///
    /// # Error
    ///
    /// See [`Reference::dispatch`].
    ///
    pub fn dispatch(&self, message: M) -> Result<(), Error> {
        self.reference.dispatch(message)
    }

    /// Sends the message built by `builder` and waits for the reply. See
    /// [`Reference::query`].
    pub async fn query<R, F>(
        &self,
        builder: F,
        timeout: impl Into<Option<Duration>>,
    ) -> Result<R, Error>
    where
        R: Message,
        F: FnOnce(ActorRef<R>) -> M,
    {
        self.reference.query(builder, timeout).await
    }

    /// Stops the actor and its descendants.
    pub fn stop(&self) {
        self.reference.stop()
    }

    pub fn is_alive(&self) -> bool {
        self.reference.is_alive()
    }

    pub fn path(&self) -> Option<&ActorPath> {
        self.reference.path()
    }

    pub fn name(&self) -> Option<String> {
        self.reference.name()
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn into_reference(self) -> Reference {
        self.reference
    }
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            _message: PhantomData,
        }
    }
}

impl<M> PartialEq for ActorRef<M> {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl<M> Eq for ActorRef<M> {}

impl<M> Hash for ActorRef<M> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
    }
}

impl<M> std::fmt::Display for ActorRef<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reference)
    }
}

impl<M> std::fmt::Debug for ActorRef<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActorRef({})", self.reference)
    }
}

impl<M> From<ActorRef<M>> for Reference {
    fn from(actor: ActorRef<M>) -> Self {
        actor.reference
    }
}

impl<M> From<&ActorRef<M>> for Reference {
    fn from(actor: &ActorRef<M>) -> Self {
        actor.reference.clone()
    }
}

impl From<&Reference> for Reference {
    fn from(reference: &Reference) -> Self {
        reference.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_registry() {
        let path: ActorPath = "refs://a/b".parse().unwrap();
        let one = Reference::actor(path.clone(), Registry::new());
        let two = Reference::actor(path.clone(), Registry::new());
        assert_eq!(one, two);
        assert_ne!(one, Reference::system(path, Registry::new()));
        assert_eq!(Reference::nobody(), Reference::nobody());
    }

    #[test]
    fn test_display() {
        let registry = Registry::new();
        let actor =
            Reference::actor("refs://a/b".parse().unwrap(), registry.clone());
        assert_eq!(actor.to_string(), "refs://a/b");
        assert_eq!(actor.name(), Some("b".to_owned()));
        let temporary = Reference::temporary("refs", 7, registry);
        assert_eq!(temporary.to_string(), "refs://$temp/7");
        assert!(temporary.is_temporary());
        assert!(temporary.path().is_none());
        assert_eq!(Reference::nobody().to_string(), "nobody");
    }

    #[test]
    fn test_nobody_absorbs_dispatch() {
        let nobody = ActorRef::<u32>::nobody();
        assert!(nobody.dispatch(1).is_ok());
        assert!(!nobody.is_alive());
        nobody.stop();
    }

    #[tokio::test]
    async fn test_query_requires_timeout() {
        let nobody = ActorRef::<u32>::nobody();
        let result: Result<u32, Error> =
            nobody.query(|_reply: ActorRef<u32>| 1, None).await;
        assert_eq!(result, Err(Error::MissingTimeout));
        let result: Result<u32, Error> = nobody
            .query(|_reply: ActorRef<u32>| 1, Duration::ZERO)
            .await;
        assert_eq!(result, Err(Error::MissingTimeout));
    }

    #[test]
    fn test_unknown_actor() {
        let reference =
            Reference::actor("ghost://a".parse().unwrap(), Registry::new());
        assert_eq!(
            reference.dispatch(1_u8),
            Err(Error::ActorNotFound("ghost://a".to_owned()))
        );
    }
}
