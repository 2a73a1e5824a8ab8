// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Stateless actors
//!
//! A stateless actor has no state to protect, so each message is handed to its handler in
//! a task of its own and handlers may overlap. Failures are still routed to the actor's
//! supervision policy, which resumes by default.
//!

use crate::{
    actor::{create_cell, Actor, ActorConfig, ActorContext, InitContext, Message},
    reference::{ActorRef, Reference},
    runner::ActorRunner,
    supervision::{Directive, Fault, SupervisionContext},
    Error,
};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use tracing::error;

use std::future::Future;

type BoxedHandler<M> = Box<
    dyn Fn(M, ActorContext<M>) -> BoxFuture<'static, Result<(), Error>>
        + Send
        + Sync,
>;

struct Stateless<M: Message> {
    handler: BoxedHandler<M>,
}

#[async_trait]
impl<M: Message> Actor for Stateless<M> {
    type Message = M;
    type State = ();

    async fn initial_state(&self, _ctx: &InitContext<M>) -> Result<(), Error> {
        Ok(())
    }

    async fn handle(
        &self,
        _state: (),
        message: M,
        ctx: &ActorContext<M>,
    ) -> Result<(), Error> {
        let work = (self.handler)(message.clone(), ctx.clone());
        let cell = ctx.cell().clone();
        tokio::spawn(async move {
            if let Err(error) = work.await {
                cell.report_fault(Fault::message_handling(message, error));
            }
        });
        Ok(())
    }

    async fn on_crash(
        &self,
        fault: &Fault,
        ctx: &SupervisionContext<M>,
    ) -> Directive {
        error!("{}: stateless handler failed with {}.", ctx.path(), fault);
        Directive::Resume
    }
}

/// Spawns a stateless actor running `handler` for every message.
///
/// Unlike [`spawn`](crate::spawn), messages are not processed one at a time: each call to
/// `handler` runs in its own task. A failed call is logged and ignored unless the
/// configuration provides another policy.
///
/// # Error
///
/// Same as [`spawn`](crate::spawn).
///
pub fn spawn_stateless<M, F, Fut>(
    parent: impl Into<Reference>,
    handler: F,
    config: ActorConfig<M, ()>,
) -> Result<ActorRef<M>, Error>
where
    M: Message,
    F: Fn(M, ActorContext<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| Error::Start(e.to_string()))?;
    let (cell, control) = create_cell::<M>(&parent.into(), config.name.as_deref())?;
    let actor = Stateless {
        handler: Box::new(move |message, ctx| handler(message, ctx).boxed()),
    };
    let runner = ActorRunner::new(cell.clone(), actor, control, config);
    handle.spawn(runner.run());
    Ok(cell.actor_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActorSystem, Registry, SystemConfig};

    use tokio::sync::mpsc;

    use std::time::Duration;

    #[tokio::test]
    async fn test_handlers_overlap() {
        let system = ActorSystem::start(
            SystemConfig::new("stateless-overlap").registry(Registry::new()),
        )
        .unwrap();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let echo = spawn_stateless(
            &system,
            move |delay: u64, _ctx| {
                let sender = sender.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    let _ = sender.send(delay);
                    Ok(())
                }
            },
            ActorConfig::named("echo"),
        )
        .unwrap();
        echo.dispatch(200).unwrap();
        echo.dispatch(10).unwrap();
        assert_eq!(receiver.recv().await, Some(10));
        assert_eq!(receiver.recv().await, Some(200));
        system.stop();
    }

    #[tokio::test]
    async fn test_failures_resume_by_default() {
        let system = ActorSystem::start(
            SystemConfig::new("stateless-resume").registry(Registry::new()),
        )
        .unwrap();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let picky = spawn_stateless(
            &system,
            move |n: u32, _ctx| {
                let sender = sender.clone();
                async move {
                    if n % 2 == 0 {
                        return Err(Error::Functional(format!("even {}", n)));
                    }
                    let _ = sender.send(n);
                    Ok(())
                }
            },
            ActorConfig::named("picky"),
        )
        .unwrap();
        picky.dispatch(2).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        picky.dispatch(3).unwrap();
        assert_eq!(receiver.recv().await, Some(3));
        assert!(picky.is_alive());
        system.stop();
    }

    #[tokio::test]
    async fn test_replies_through_query() {
        let system = ActorSystem::start(
            SystemConfig::new("stateless-query").registry(Registry::new()),
        )
        .unwrap();
        let doubler = spawn_stateless(
            &system,
            |(n, reply_to): (u32, ActorRef<u32>), _ctx| async move {
                reply_to.dispatch(n * 2)
            },
            ActorConfig::named("doubler"),
        )
        .unwrap();
        let doubled = doubler
            .query(|reply_to| (21, reply_to), Duration::from_millis(500))
            .await;
        assert_eq!(doubled, Ok(42));
        system.stop();
    }
}
