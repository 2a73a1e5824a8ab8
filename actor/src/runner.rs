// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runner
//!
//! The `runner` module drives a single actor. Each actor gets its own Tokio task running
//! [`ActorRunner::run`], which owns the behavior and the state, so no other task ever
//! touches them.
//!
//! ## Event loop
//!
//! Between two messages the runner first handles pending control requests (resets asked by
//! a supervisor and faults escalated by children), then computes the initial state if it
//! is missing, then takes the next message from the mailbox. When there is nothing to do
//! it waits, with a biased `select!`, for cancellation, a control request, a dispatch or
//! the idle-shutdown deadline.
//!
//! ## Faults
//!
//! A failed handler suspends the actor (its mailbox keeps filling but is not drained) until
//! the supervision policy's directive has been applied. Directives that do not resume the
//! actor (`Escalate` in particular) leave it suspended until its supervisor stops or resets
//! it.
//!

use crate::{
    actor::{Actor, ActorConfig, ActorContext, InitContext, StopContext},
    cell::{ActorCell, Control, Node},
    supervision::{Directive, Fault, SupervisionContext, SupervisionPolicy},
};

use async_trait::async_trait;

use tokio::{select, sync::mpsc};

use tracing::{debug, error, warn};

use std::{future::pending, sync::Arc, time::Duration};

/// Supervision policy backed by [`Actor::on_crash`].
struct OnCrash<A>(Arc<A>);

#[async_trait]
impl<A: Actor> SupervisionPolicy<A::Message> for OnCrash<A> {
    async fn decide(
        &self,
        fault: &Fault,
        ctx: &SupervisionContext<A::Message>,
    ) -> Directive {
        self.0.on_crash(fault, ctx).await
    }
}

/// Actor runner.
pub(crate) struct ActorRunner<A: Actor> {
    cell: Arc<ActorCell<A::Message>>,
    actor: Arc<A>,
    policy: Arc<dyn SupervisionPolicy<A::Message>>,
    initial: Option<A::State>,
    state: Option<A::State>,
    control: mpsc::UnboundedReceiver<Control>,
    shutdown_after: Option<Duration>,
    suspended: bool,
    needs_init: bool,
}

impl<A: Actor> ActorRunner<A> {
    pub(crate) fn new(
        cell: Arc<ActorCell<A::Message>>,
        actor: A,
        control: mpsc::UnboundedReceiver<Control>,
        config: ActorConfig<A::Message, A::State>,
    ) -> Self {
        let actor = Arc::new(actor);
        let policy = match config.on_crash {
            Some(policy) => policy,
            None => Arc::new(OnCrash(actor.clone())),
        };
        Self {
            cell,
            actor,
            policy,
            initial: config.initial_state,
            state: None,
            control,
            shutdown_after: config.shutdown_after,
            suspended: false,
            needs_init: true,
        }
    }

    /// Runs the actor until it is stopped.
    pub(crate) async fn run(mut self) {
        debug!("Running actor {}.", self.cell.path());
        loop {
            while let Ok(control) = self.control.try_recv() {
                if self.cell.is_stopped() {
                    break;
                }
                self.on_control(control).await;
            }
            if self.cell.is_stopped() {
                break;
            }
            if self.needs_init {
                self.needs_init = false;
                self.initialize().await;
                continue;
            }
            if !self.suspended && self.state.is_some() {
                if let Some(message) = self.cell.pop() {
                    self.process(message).await;
                    continue;
                }
            }

            let idle = if self.suspended {
                None
            } else {
                self.shutdown_after
            };
            select! {
                biased;
                _ = self.cell.token().cancelled() => break,
                Some(control) = self.control.recv() => {
                    self.on_control(control).await;
                }
                _ = self.cell.notified() => {}
                _ = idle_timer(idle) => {
                    debug!(
                        "Actor {} idle for {:?}, shutting down.",
                        self.cell.path(),
                        self.shutdown_after
                    );
                    self.cell.stop();
                }
            }
        }
        self.finish().await;
    }

    async fn initialize(&mut self) {
        // Keeps a reset loop on a failing initializer from monopolizing the worker.
        tokio::task::yield_now().await;
        debug!("Initializing actor {}.", self.cell.path());
        let ctx = InitContext::new(self.cell.clone(), self.policy.clone());
        let result = match self.initial.clone() {
            Some(state) => Ok(state),
            None => {
                select! {
                    biased;
                    _ = self.cell.token().cancelled() => return,
                    result = self.actor.initial_state(&ctx) => result,
                }
            }
        };
        match result {
            Ok(state) => {
                self.state = Some(state);
                self.suspended = false;
                debug!("Actor {} is started.", self.cell.path());
            }
            Err(error) if error.is_assertion() => {
                error!("{}: {}. Stopping actor.", self.cell.path(), error);
                self.cell.stop();
            }
            Err(error) => {
                self.suspended = true;
                match ctx.take_decision() {
                    Some((directive, fault)) => {
                        self.apply(directive, fault, true).await
                    }
                    None => self.supervise(Fault::initialization(error)).await,
                }
            }
        }
    }

    async fn process(&mut self, message: A::Message) {
        let Some(state) = self.state.clone() else {
            return;
        };
        let ctx = ActorContext::new(self.cell.clone());
        let result = select! {
            biased;
            _ = self.cell.token().cancelled() => return,
            result = self.actor.handle(state, message.clone(), &ctx) => result,
        };
        match result {
            Ok(state) => {
                let state = self.state.insert(state);
                self.actor.after_message(state, &ctx).await;
            }
            Err(error) => {
                self.suspended = true;
                self.supervise(Fault::message_handling(message, error)).await;
            }
        }
    }

    async fn on_control(&mut self, control: Control) {
        match control {
            Control::Reset => self.reset(),
            Control::Fault(fault) => {
                self.suspended = true;
                self.supervise(fault).await;
            }
            Control::ChildFault(fault) => {
                if fault.error().is_assertion() {
                    error!(
                        "{}: {}. Stopping actor.",
                        self.cell.path(),
                        fault.error()
                    );
                    self.cell.stop();
                    return;
                }
                let ctx = SupervisionContext::new(
                    self.cell.clone(),
                    fault.child().cloned(),
                );
                let directive = self.policy.decide(&fault, &ctx).await;
                debug!(
                    "{}: {:?} for fault of child {:?}.",
                    self.cell.path(),
                    directive,
                    fault.child()
                );
                self.apply(directive, fault, false).await;
            }
        }
    }

    /// Consults the policy about a fault raised by this actor.
    async fn supervise(&mut self, fault: Fault) {
        if fault.error().is_assertion() {
            error!("{}: {}. Stopping actor.", self.cell.path(), fault.error());
            self.cell.stop();
            return;
        }
        let ctx = SupervisionContext::new(self.cell.clone(), None);
        let directive = self.policy.decide(&fault, &ctx).await;
        debug!("{}: {:?} for {}.", self.cell.path(), directive, fault);
        self.apply(directive, fault, true).await;
    }

    /// Applies `directive`. `own` tells whether the fault was raised by this actor or
    /// escalated by one of its children.
    async fn apply(&mut self, directive: Directive, fault: Fault, own: bool) {
        match directive {
            Directive::Resume => {
                if own {
                    self.resume();
                } else {
                    debug!(
                        "{}: resume leaves faulted child {:?} suspended.",
                        self.cell.path(),
                        fault.child()
                    );
                }
            }
            Directive::Reset => self.reset(),
            Directive::Stop => self.cell.stop(),
            Directive::Escalate => self.escalate(fault),
            Directive::StopAll => {
                for sibling in self.siblings() {
                    sibling.stop();
                }
                self.cell.stop();
            }
            Directive::ResetAll => {
                if self.cell.parent().is_none() {
                    self.reset();
                    return;
                }
                for sibling in self.siblings() {
                    sibling.reset();
                }
            }
            Directive::StopAllChildren => {
                for child in self.cell.children().take() {
                    child.stop();
                }
                if own {
                    self.resume();
                }
            }
            Directive::ResetAllChildren => {
                for child in self.cell.children().snapshot() {
                    child.reset();
                }
                if own {
                    self.resume();
                }
            }
            Directive::StopChild | Directive::ResetChild => {
                let Some(child) = self.faulted_child(&fault) else {
                    error!(
                        "{}: assertion failure, {:?} requires a faulted child. Stopping actor.",
                        self.cell.path(),
                        directive
                    );
                    self.cell.stop();
                    return;
                };
                if directive == Directive::StopChild {
                    child.stop();
                } else {
                    child.reset();
                }
            }
        }
    }

    fn resume(&mut self) {
        if self.state.is_some() {
            self.suspended = false;
        } else {
            debug!(
                "Actor {} has no state to resume with, stopping.",
                self.cell.path()
            );
            self.cell.stop();
        }
    }

    fn reset(&mut self) {
        debug!("Resetting actor {}.", self.cell.path());
        for child in self.cell.children().take() {
            child.stop();
        }
        self.state = None;
        self.suspended = false;
        self.needs_init = true;
    }

    fn escalate(&mut self, fault: Fault) {
        let fault = fault.escalated(self.cell.reference());
        match self.cell.parent() {
            Some(parent) if !parent.is_stopped() => {
                debug!(
                    "Actor {} escalates to {}.",
                    self.cell.path(),
                    parent.path()
                );
                parent.handle_child_fault(fault);
            }
            _ => {
                warn!(
                    "Actor {} has no live supervisor to escalate {} to, stopping.",
                    self.cell.path(),
                    fault
                );
                self.cell.stop();
            }
        }
    }

    /// Children of this actor's parent, this actor included.
    fn siblings(&self) -> Vec<Arc<dyn Node>> {
        match self.cell.parent() {
            Some(parent) => parent.children().snapshot(),
            None => Vec::new(),
        }
    }

    fn faulted_child(&self, fault: &Fault) -> Option<Arc<dyn Node>> {
        let path = fault.child()?.path()?;
        if !path.is_child_of(self.cell.path()) {
            return None;
        }
        self.cell.children().get(&path.key())
    }

    async fn finish(&mut self) {
        let remaining = self.cell.drain();
        if let Some(state) = self.state.take() {
            let ctx = StopContext::new(self.cell.clone(), remaining);
            self.actor.after_stop(state, ctx).await;
        }
        debug!("Actor {} is stopped.", self.cell.path());
    }
}

/// Resolves after `duration`, or never.
async fn idle_timer(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => pending().await,
    }
}
