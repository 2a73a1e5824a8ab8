// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor cell
//!
//! The `cell` module holds the shared half of a live actor: identity, child table, mailbox
//! and control channel. The runner owns the other half (behavior and state) and is the only
//! code that ever touches the state.
//!

use crate::{
    actor::Message,
    reference::{ActorRef, Reference},
    supervision::Fault,
    system::{SystemCore, SystemRef},
    ActorPath, Error,
};

use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use tracing::debug;

use std::{
    any::Any,
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError, Weak,
    },
};

/// A node of the supervision tree: an actor cell or a system root.
pub(crate) trait Node: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn path(&self) -> &ActorPath;

    fn reference(&self) -> Reference;

    fn parent(&self) -> Option<Arc<dyn Node>>;

    fn children(&self) -> &Children;

    fn is_stopped(&self) -> bool;

    /// Stops the node and every descendant. Idempotent.
    fn stop(&self);

    /// Asks the node to stop its children and recompute its initial state.
    fn reset(&self);

    /// Hands an escalated fault to this node's supervision policy.
    fn handle_child_fault(&self, fault: Fault);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

struct ChildTable {
    closed: bool,
    nodes: BTreeMap<String, Arc<dyn Node>>,
}

/// Direct children of a node, keyed by name.
///
/// Once closed (the owner stopped) the table accepts no further children. Callers never
/// hold the table lock while calling into a child.
pub(crate) struct Children {
    table: Mutex<ChildTable>,
}

impl Default for Children {
    fn default() -> Self {
        Self {
            table: Mutex::new(ChildTable {
                closed: false,
                nodes: BTreeMap::new(),
            }),
        }
    }
}

impl Children {
    /// Registers `node` under `name`.
    ///
    /// # Error
    ///
    /// `ActorStopped` if the owner is stopped, `DuplicateName` if the name is taken.
    ///
    pub(crate) fn insert(
        &self,
        owner: &ActorPath,
        name: &str,
        node: Arc<dyn Node>,
    ) -> Result<(), Error> {
        let mut table = self.lock();
        if table.closed {
            return Err(Error::ActorStopped(owner.clone()));
        }
        if table.nodes.contains_key(name) {
            return Err(Error::DuplicateName {
                name: name.to_owned(),
                parent: owner.to_string(),
            });
        }
        table.nodes.insert(name.to_owned(), node);
        Ok(())
    }

    /// Removes the entry `name` if it still points at `node`.
    pub(crate) fn remove(&self, name: &str, node: *const ()) {
        let mut table = self.lock();
        let same = table
            .nodes
            .get(name)
            .is_some_and(|current| Arc::as_ptr(current) as *const () == node);
        if same {
            table.nodes.remove(name);
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.lock().nodes.get(name).cloned()
    }

    /// Current children, in name order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Node>> {
        self.lock().nodes.values().cloned().collect()
    }

    /// Empties the table, returning its former entries.
    pub(crate) fn take(&self) -> Vec<Arc<dyn Node>> {
        std::mem::take(&mut self.lock().nodes).into_values().collect()
    }

    /// Empties and closes the table.
    pub(crate) fn close(&self) -> Vec<Arc<dyn Node>> {
        let mut table = self.lock();
        table.closed = true;
        std::mem::take(&mut table.nodes).into_values().collect()
    }

    pub(crate) fn references(&self) -> BTreeMap<String, Reference> {
        self.lock()
            .nodes
            .iter()
            .map(|(name, node)| (name.clone(), node.reference()))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChildTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Requests delivered to a runner outside of the mailbox.
pub(crate) enum Control {
    /// Stop the children and recompute the initial state.
    Reset,
    /// A child escalated a fault.
    ChildFault(Fault),
    /// A detached handler of this actor failed.
    Fault(Fault),
}

/// Shared half of a live actor with messages of type `M`.
pub(crate) struct ActorCell<M: Message> {
    name: String,
    path: ActorPath,
    reference: Reference,
    parent_reference: Reference,
    parent: Weak<dyn Node>,
    system: Weak<SystemCore>,
    children: Children,
    mailbox: Mutex<VecDeque<M>>,
    notify: Notify,
    control: mpsc::UnboundedSender<Control>,
    token: CancellationToken,
    stopped: AtomicBool,
}

impl<M: Message> ActorCell<M> {
    pub(crate) fn new(
        path: ActorPath,
        parent: &Arc<dyn Node>,
        system: &Arc<SystemCore>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Control>) {
        let (control, receiver) = mpsc::unbounded_channel();
        let cell = Arc::new(Self {
            name: path.key(),
            reference: Reference::actor(path.clone(), system.registry().clone()),
            path,
            parent_reference: parent.reference(),
            parent: Arc::downgrade(parent),
            system: Arc::downgrade(system),
            children: Children::default(),
            mailbox: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            control,
            token: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        });
        (cell, receiver)
    }

    /// Appends `message` to the mailbox tail and wakes the runner.
    ///
    /// # Error
    ///
    /// `ActorStopped` if the actor has been stopped.
    ///
    pub(crate) fn dispatch(&self, message: M) -> Result<(), Error> {
        if self.is_stopped() {
            return Err(Error::ActorStopped(self.path.clone()));
        }
        self.lock_mailbox().push_back(message);
        self.notify.notify_one();
        Ok(())
    }

    pub(crate) fn pop(&self) -> Option<M> {
        self.lock_mailbox().pop_front()
    }

    pub(crate) fn mailbox_snapshot(&self) -> Vec<M> {
        self.lock_mailbox().iter().cloned().collect()
    }

    pub(crate) fn drain(&self) -> Vec<M> {
        self.lock_mailbox().drain(..).collect()
    }

    /// Routes a fault raised outside the runner's own turn back into it.
    pub(crate) fn report_fault(&self, fault: Fault) {
        if self.control.send(Control::Fault(fault)).is_err() {
            debug!("Actor {} is gone, fault dropped.", self.path);
        }
    }

    pub(crate) async fn notified(&self) {
        self.notify.notified().await
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn parent_reference(&self) -> &Reference {
        &self.parent_reference
    }

    pub(crate) fn actor_ref(&self) -> ActorRef<M> {
        ActorRef::new(self.reference.clone())
    }

    pub(crate) fn system(&self) -> Option<SystemRef> {
        self.system.upgrade().map(SystemRef::from_core)
    }

    fn lock_mailbox(&self) -> std::sync::MutexGuard<'_, VecDeque<M>> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: Message> Node for ActorCell<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &ActorPath {
        &self.path
    }

    fn reference(&self) -> Reference {
        self.reference.clone()
    }

    fn parent(&self) -> Option<Arc<dyn Node>> {
        self.parent.upgrade()
    }

    fn children(&self) -> &Children {
        &self.children
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Stopping actor {}.", self.path);
        if let Some(parent) = self.parent.upgrade() {
            parent
                .children()
                .remove(&self.name, self as *const Self as *const ());
        }
        for child in self.children.close() {
            child.stop();
        }
        self.token.cancel();
    }

    fn reset(&self) {
        if self.control.send(Control::Reset).is_err() {
            debug!("Actor {} is gone, reset ignored.", self.path);
        }
    }

    fn handle_child_fault(&self, fault: Fault) {
        if self.control.send(Control::ChildFault(fault)).is_err() {
            debug!("Actor {} is gone, child fault dropped.", self.path);
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
