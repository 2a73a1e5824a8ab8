// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Persistent actors
//!
//! A persistent actor records the messages it accepts as events in a journal kept by a
//! [`PersistenceEngine`]. When it starts (and after every reset) it rebuilds its state by
//! replaying the journal on top of the latest snapshot, before any dispatched message is
//! handled. Snapshots are taken every `snapshot_every` persisted events.
//!
//! The engine is configured once per system with
//! [`SystemConfig::persistence`](crate::SystemConfig::persistence).
//!

use crate::{
    actor::{
        create_cell, Actor, ActorConfig, ActorContext, InitContext, Message,
        StopContext,
    },
    reference::{ActorRef, Reference},
    runner::ActorRunner,
    supervision::{
        stop_and_log, Directive, Fault, SupervisionContext, SupervisionPolicy,
    },
    Error,
};

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use tracing::{debug, error, warn};

use std::{
    ops::Deref,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// An event in the journal of a persistent actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEvent {
    data: Vec<u8>,
    sequence_nr: u64,
    key: String,
    tags: Vec<String>,
    created_at: u64,
    deleted: bool,
}

impl PersistedEvent {
    /// Creates an event. Tags are sorted and deduplicated.
    ///
    /// # Error
    ///
    /// Returns `Error::Assertion` for sequence number 0: journals start at 1.
    ///
    pub fn new(
        key: &str,
        sequence_nr: u64,
        data: Vec<u8>,
        tags: Vec<String>,
    ) -> Result<Self, Error> {
        if sequence_nr == 0 {
            return Err(Error::Assertion(format!(
                "event of '{}' persisted with sequence number 0",
                key
            )));
        }
        let mut tags = tags;
        tags.sort();
        tags.dedup();
        Ok(Self {
            data,
            sequence_nr,
            key: key.to_owned(),
            tags,
            created_at: now_millis(),
            deleted: false,
        })
    }

    /// The same event, marked as deleted. Deleted events are skipped during replay.
    pub fn into_deleted(self) -> Self {
        Self {
            deleted: true,
            ..self
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn sequence_nr(&self) -> u64 {
        self.sequence_nr
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Milliseconds since the Unix epoch.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// True if the event carries every tag in `tags`.
    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter().all(|tag| self.tags.binary_search(tag).is_ok())
    }
}

/// A snapshot of the state of a persistent actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    data: Vec<u8>,
    sequence_nr: u64,
    key: String,
    created_at: u64,
}

impl PersistedSnapshot {
    /// Creates a snapshot of the state reached after event `sequence_nr`.
    pub fn new(key: &str, sequence_nr: u64, data: Vec<u8>) -> Self {
        Self {
            data,
            sequence_nr,
            key: key.to_owned(),
            created_at: now_millis(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn sequence_nr(&self) -> u64 {
        self.sequence_nr
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Milliseconds since the Unix epoch.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// Storage for journals and snapshots.
#[async_trait]
pub trait PersistenceEngine: Send + Sync + 'static {
    /// Events of `key` with a sequence number greater than `offset`, ascending. At most
    /// `limit` events are produced; when `tags` is given only events carrying all of them.
    async fn events(
        &self,
        key: &str,
        offset: u64,
        limit: Option<u64>,
        tags: Option<&[String]>,
    ) -> Result<BoxStream<'static, Result<PersistedEvent, Error>>, Error>;

    /// The most recent snapshot of `key`.
    async fn latest_snapshot(
        &self,
        key: &str,
    ) -> Result<Option<PersistedSnapshot>, Error>;

    async fn take_snapshot(&self, snapshot: PersistedSnapshot) -> Result<(), Error>;

    /// Appends `event` to the journal of its key.
    async fn persist(&self, event: PersistedEvent) -> Result<(), Error>;
}

#[async_trait]
impl<E: PersistenceEngine + ?Sized> PersistenceEngine for Arc<E> {
    async fn events(
        &self,
        key: &str,
        offset: u64,
        limit: Option<u64>,
        tags: Option<&[String]>,
    ) -> Result<BoxStream<'static, Result<PersistedEvent, Error>>, Error> {
        self.as_ref().events(key, offset, limit, tags).await
    }

    async fn latest_snapshot(
        &self,
        key: &str,
    ) -> Result<Option<PersistedSnapshot>, Error> {
        self.as_ref().latest_snapshot(key).await
    }

    async fn take_snapshot(&self, snapshot: PersistedSnapshot) -> Result<(), Error> {
        self.as_ref().take_snapshot(snapshot).await
    }

    async fn persist(&self, event: PersistedEvent) -> Result<(), Error> {
        self.as_ref().persist(event).await
    }
}

/// Turns events or states into bytes and back.
pub trait Codec<T>: Send + Sync + 'static {
    fn encode(&self, value: &T) -> Result<Vec<u8>, Error>;

    fn decode(&self, bytes: &[u8]) -> Result<T, Error>;
}

/// [`Codec`] for serde types, using bincode.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<T: Serialize + DeserializeOwned> Codec<T> for BincodeCodec {
    fn encode(&self, value: &T) -> Result<Vec<u8>, Error> {
        bincode::serialize(value).map_err(|e| Error::Persistence(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, Error> {
        bincode::deserialize(bytes).map_err(|e| Error::Recovery(e.to_string()))
    }
}

/// A stateful actor whose accepted messages outlive the process.
///
/// Same contract as [`Actor`], except that `handle` receives a [`PersistentContext`]. A
/// handler records a message with [`PersistentContext::persist`]; on restart every
/// persisted message is handed to `handle` again, in order, with
/// [`PersistentContext::is_recovering`] set. Side effects other than the state update
/// should be skipped while recovering.
///
/// ```ignore
/// #[async_trait]
/// impl PersistentActor for Word {
///     type Message = char;
///     type State = String;
///
///     async fn initial_state(&self, _ctx: &InitContext<char>) -> Result<String, Error> {
///         Ok(String::new())
///     }
///
///     async fn handle(
///         &self,
///         mut state: String,
///         letter: char,
///         ctx: &PersistentContext<char>,
///     ) -> Result<String, Error> {
///         ctx.persist(&letter, &[]).await?;
///         state.push(letter);
///         Ok(state)
///     }
/// }
/// ```
#[async_trait]
pub trait PersistentActor: Send + Sync + Sized + 'static {
    type Message: Message;

    type State: Clone + Send + Sync + 'static;

    /// State replay starts from when there is no snapshot.
    async fn initial_state(
        &self,
        ctx: &InitContext<Self::Message>,
    ) -> Result<Self::State, Error>;

    async fn handle(
        &self,
        state: Self::State,
        message: Self::Message,
        ctx: &PersistentContext<Self::Message>,
    ) -> Result<Self::State, Error>;

    /// Supervision policy for live and replay faults. Logs the fault and stops the actor.
    async fn on_crash(
        &self,
        fault: &Fault,
        ctx: &SupervisionContext<Self::Message>,
    ) -> Directive {
        stop_and_log(fault, ctx.path())
    }

    async fn after_stop(
        &self,
        _state: Self::State,
        _ctx: StopContext<Self::Message>,
    ) {
    }
}

#[derive(Debug, Clone, Copy)]
struct Counters {
    sequence_nr: u64,
    countdown: Option<u64>,
}

/// Journal position of one persistent actor.
struct Journal<M> {
    key: String,
    engine: Arc<dyn PersistenceEngine>,
    codec: Arc<dyn Codec<M>>,
    snapshot_every: Option<u64>,
    counters: Mutex<Counters>,
}

impl<M: Message> Journal<M> {
    fn counters(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rewind(&self) {
        *self.counters() = Counters {
            sequence_nr: 0,
            countdown: self.snapshot_every,
        };
    }

    fn sequence_nr(&self) -> u64 {
        self.counters().sequence_nr
    }

    fn seek(&self, sequence_nr: u64) {
        self.counters().sequence_nr = sequence_nr;
    }

    /// Moves past a replayed event.
    fn advance(&self, sequence_nr: u64) -> Result<(), Error> {
        let mut counters = self.counters();
        if sequence_nr <= counters.sequence_nr {
            return Err(Error::Assertion(format!(
                "journal of '{}' replayed event {} after event {}",
                self.key, sequence_nr, counters.sequence_nr
            )));
        }
        counters.sequence_nr = sequence_nr;
        counters.countdown = counters.countdown.map(|n| n.saturating_sub(1));
        Ok(())
    }

    async fn persist(&self, message: &M, tags: Vec<String>) -> Result<(), Error> {
        let sequence_nr = {
            let mut counters = self.counters();
            counters.countdown = counters.countdown.map(|n| n.saturating_sub(1));
            counters.sequence_nr + 1
        };
        let data = self.codec.encode(message)?;
        let event = PersistedEvent::new(&self.key, sequence_nr, data, tags)?;
        self.engine.persist(event).await?;
        self.counters().sequence_nr = sequence_nr;
        Ok(())
    }

    fn snapshot_due(&self) -> bool {
        self.counters().countdown == Some(0)
    }

    fn rearm(&self) {
        self.counters().countdown = self.snapshot_every;
    }
}

/// Context handed to [`PersistentActor::handle`].
///
/// Dereferences to [`ActorContext`].
pub struct PersistentContext<M: Message> {
    ctx: ActorContext<M>,
    journal: Arc<Journal<M>>,
    recovering: bool,
}

impl<M: Message> PersistentContext<M> {
    fn new(ctx: ActorContext<M>, journal: Arc<Journal<M>>, recovering: bool) -> Self {
        Self {
            ctx,
            journal,
            recovering,
        }
    }

    /// True while the message comes from the journal rather than from a sender.
    pub fn is_recovering(&self) -> bool {
        self.recovering
    }

    /// Key of the journal.
    pub fn key(&self) -> &str {
        &self.journal.key
    }

    /// Sequence number of the last event persisted or replayed.
    pub fn sequence_nr(&self) -> u64 {
        self.journal.sequence_nr()
    }

    /// Appends `message` to the journal with the given tags. Does nothing while
    /// recovering.
    ///
    /// # Error
    ///
    /// Returns the error of the codec or of the engine. It is up to the handler whether it
    /// becomes a fault.
    ///
    pub async fn persist(&self, message: &M, tags: &[&str]) -> Result<(), Error> {
        if self.recovering {
            return Ok(());
        }
        let tags = tags.iter().map(|tag| (*tag).to_owned()).collect();
        self.journal.persist(message, tags).await
    }
}

impl<M: Message> Deref for PersistentContext<M> {
    type Target = ActorContext<M>;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

/// Options for [`spawn_persistent`].
///
/// `new` and `default` use [`BincodeCodec`] for events and snapshots; other codecs are
/// given with [`PersistentConfig::with_codecs`].
pub struct PersistentConfig<M: Message, S> {
    actor: ActorConfig<M, S>,
    snapshot_every: Option<u64>,
    codec: Arc<dyn Codec<M>>,
    snapshot_codec: Arc<dyn Codec<S>>,
}

impl<M, S> PersistentConfig<M, S>
where
    M: Message + Serialize + DeserializeOwned,
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_codecs(BincodeCodec, BincodeCodec)
    }

    pub fn named(name: &str) -> Self {
        Self::new().name(name)
    }
}

impl<M, S> Default for PersistentConfig<M, S>
where
    M: Message + Serialize + DeserializeOwned,
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message, S> PersistentConfig<M, S> {
    /// Options encoding events with `codec` and snapshots with `snapshot_codec`.
    pub fn with_codecs<E, C>(codec: E, snapshot_codec: C) -> Self
    where
        E: Codec<M>,
        C: Codec<S>,
    {
        Self {
            actor: ActorConfig::new(),
            snapshot_every: None,
            codec: Arc::new(codec),
            snapshot_codec: Arc::new(snapshot_codec),
        }
    }

    /// See [`ActorConfig::name`].
    pub fn name(mut self, name: &str) -> Self {
        self.actor = self.actor.name(name);
        self
    }

    /// See [`ActorConfig::shutdown_after`].
    pub fn shutdown_after(mut self, duration: Duration) -> Self {
        self.actor = self.actor.shutdown_after(duration);
        self
    }

    /// Supervision policy replacing [`PersistentActor::on_crash`], for live and replay
    /// faults alike.
    pub fn on_crash<P: SupervisionPolicy<M>>(mut self, policy: P) -> Self {
        self.actor = self.actor.on_crash(policy);
        self
    }

    /// State replay starts from when there is no snapshot, replacing
    /// [`PersistentActor::initial_state`].
    pub fn initial_state(mut self, state: S) -> Self {
        self.actor = self.actor.initial_state(state);
        self
    }

    /// Takes a snapshot every `events` persisted events. Zero disables snapshots, which is
    /// the default.
    pub fn snapshot_every(mut self, events: u64) -> Self {
        self.snapshot_every = (events > 0).then_some(events);
        self
    }

    /// Event codec.
    pub fn encoder<E: Codec<M>>(mut self, codec: E) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Snapshot codec.
    pub fn snapshot_encoder<C: Codec<S>>(mut self, codec: C) -> Self {
        self.snapshot_codec = Arc::new(codec);
        self
    }
}

/// Runs a [`PersistentActor`] as an [`Actor`]: replay in `initial_state`, snapshots in
/// `after_message`.
struct Persistent<P: PersistentActor> {
    inner: P,
    journal: Arc<Journal<P::Message>>,
    snapshot_codec: Arc<dyn Codec<P::State>>,
    initial: Option<P::State>,
}

impl<P: PersistentActor> Persistent<P> {
    /// Applies one replayed event. `Ok(None)` means the policy resumed past it.
    async fn replay(
        &self,
        state: P::State,
        event: &PersistedEvent,
        init: &InitContext<P::Message>,
        ctx: &PersistentContext<P::Message>,
    ) -> Result<Option<P::State>, Error> {
        let (message, result) = match self.journal.codec.decode(event.data()) {
            Ok(message) => {
                let result = self.inner.handle(state, message.clone(), ctx).await;
                (Some(message), result)
            }
            Err(error) => (None, Err(error)),
        };
        let error = match result {
            Ok(state) => return Ok(Some(state)),
            Err(error) if error.is_assertion() => return Err(error),
            Err(error) => error,
        };

        let fault = Fault::recovery(message, error.clone());
        let directive = init.supervise(&fault).await;
        match directive {
            Directive::Resume => {
                debug!(
                    "{}: event {} skipped during recovery.",
                    init.path(),
                    event.sequence_nr()
                );
                return Ok(None);
            }
            Directive::Reset | Directive::ResetAll => warn!(
                "{}: {:?} during recovery restarts the replay of '{}'.",
                init.path(),
                directive,
                self.journal.key
            ),
            _ => {}
        }
        init.decide(directive, fault);
        Err(error)
    }
}

#[async_trait]
impl<P: PersistentActor> Actor for Persistent<P> {
    type Message = P::Message;
    type State = P::State;

    async fn initial_state(
        &self,
        ctx: &InitContext<P::Message>,
    ) -> Result<P::State, Error> {
        let journal = &self.journal;
        journal.rewind();

        let mut state = match &self.initial {
            Some(state) => state.clone(),
            None => self.inner.initial_state(ctx).await?,
        };
        if let Some(snapshot) = journal.engine.latest_snapshot(&journal.key).await? {
            state = self.snapshot_codec.decode(snapshot.data())?;
            journal.seek(snapshot.sequence_nr());
            debug!(
                "{}: recovering '{}' from snapshot at {}.",
                ctx.path(),
                journal.key,
                snapshot.sequence_nr()
            );
        }

        let replay_ctx =
            PersistentContext::new(ActorContext::clone(ctx), journal.clone(), true);
        let mut events = journal
            .engine
            .events(&journal.key, journal.sequence_nr(), None, None)
            .await?;
        let mut replayed = 0_u64;
        while let Some(event) = events.next().await {
            let event = event?;
            journal.advance(event.sequence_nr())?;
            if event.is_deleted() {
                continue;
            }
            if let Some(next) =
                self.replay(state.clone(), &event, ctx, &replay_ctx).await?
            {
                state = next;
            }
            replayed += 1;
        }
        debug!(
            "{}: '{}' recovered, {} events replayed up to {}.",
            ctx.path(),
            journal.key,
            replayed,
            journal.sequence_nr()
        );
        Ok(state)
    }

    async fn handle(
        &self,
        state: P::State,
        message: P::Message,
        ctx: &ActorContext<P::Message>,
    ) -> Result<P::State, Error> {
        let ctx = PersistentContext::new(ctx.clone(), self.journal.clone(), false);
        self.inner.handle(state, message, &ctx).await
    }

    async fn after_message(&self, state: &P::State, ctx: &ActorContext<P::Message>) {
        if !self.journal.snapshot_due() {
            return;
        }
        let sequence_nr = self.journal.sequence_nr();
        let result = match self.snapshot_codec.encode(state) {
            Ok(data) => {
                let snapshot =
                    PersistedSnapshot::new(&self.journal.key, sequence_nr, data);
                self.journal.engine.take_snapshot(snapshot).await
            }
            Err(error) => Err(error),
        };
        match result {
            Ok(()) => debug!(
                "{}: snapshot of '{}' taken at {}.",
                ctx.path(),
                self.journal.key,
                sequence_nr
            ),
            Err(error) => error!(
                "{}: snapshot of '{}' at {} failed: {}",
                ctx.path(),
                self.journal.key,
                sequence_nr,
                error
            ),
        }
        self.journal.rearm();
    }

    async fn on_crash(
        &self,
        fault: &Fault,
        ctx: &SupervisionContext<P::Message>,
    ) -> Directive {
        self.inner.on_crash(fault, ctx).await
    }

    async fn after_stop(&self, state: P::State, ctx: StopContext<P::Message>) {
        self.inner.after_stop(state, ctx).await
    }
}

/// Spawns a persistent actor journaling under `key`, using the engine configured on the
/// parent's system.
///
/// # Error
///
/// * `Error::Persistence` - the system has no persistence engine.
/// * Any error of [`spawn`](crate::spawn).
///
pub fn spawn_persistent<P: PersistentActor>(
    parent: impl Into<Reference>,
    actor: P,
    key: &str,
    config: PersistentConfig<P::Message, P::State>,
) -> Result<ActorRef<P::Message>, Error> {
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| Error::Start(e.to_string()))?;
    let parent = parent.into();
    let system_name = parent
        .path()
        .map(|path| path.system().to_owned())
        .ok_or_else(|| Error::ActorNotFound(parent.to_string()))?;
    let engine = parent
        .registry()
        .system(&system_name)
        .ok_or_else(|| Error::ActorNotFound(parent.to_string()))?
        .persistence()
        .ok_or_else(|| {
            Error::Persistence(format!(
                "system {} has no persistence engine",
                system_name
            ))
        })?;

    let PersistentConfig {
        actor: mut actor_config,
        snapshot_every,
        codec,
        snapshot_codec,
    } = config;
    let initial = actor_config.initial_state.take();
    let (cell, control) =
        create_cell::<P::Message>(&parent, actor_config.name.as_deref())?;
    let persistent = Persistent {
        inner: actor,
        journal: Arc::new(Journal {
            key: key.to_owned(),
            engine,
            codec,
            snapshot_every,
            counters: Mutex::new(Counters {
                sequence_nr: 0,
                countdown: snapshot_every,
            }),
        }),
        snapshot_codec,
        initial,
    };
    let runner = ActorRunner::new(cell.clone(), persistent, control, actor_config);
    handle.spawn(runner.run());
    Ok(cell.actor_ref())
}
