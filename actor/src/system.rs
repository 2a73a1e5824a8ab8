// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The `system` module provides the `ActorSystem` type. The `ActorSystem` type is the root of
//! an actor tree: it registers itself under its name, supervises the top-level actors and
//! owns the temporary references used by queries.
//!

use crate::{
    cell::{Children, Node},
    deferral::Pending,
    persistent::PersistenceEngine,
    reference::Reference,
    registry::Registry,
    supervision::Fault,
    ActorPath, Error,
};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use tracing::{debug, error};

use std::{
    any::Any,
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError, Weak,
    },
};

/// Actor system.
///
pub struct ActorSystem {}

impl ActorSystem {
    /// Starts a new actor system.
    ///
    /// # Error
    ///
    /// * `Error::InvalidName` - the system name fails validation.
    /// * `Error::DuplicateName` - a system with the same name is registered.
    /// * `Error::Start` - there is no Tokio runtime to host the system.
    ///
    pub fn start(config: SystemConfig) -> Result<SystemRef, Error> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Start(e.to_string()))?;
        let path = ActorPath::root(&config.name)?;
        let core = Arc::new(SystemCore {
            name: config.name,
            reference: Reference::system(path.clone(), config.registry.clone()),
            path,
            registry: config.registry,
            children: Children::default(),
            temporaries: Mutex::new(HashMap::new()),
            next_temporary: AtomicU64::new(0),
            helpers: RwLock::new(HashMap::new()),
            persistence: config.persistence,
            stopped: AtomicBool::new(false),
            token: config.token.child_token(),
        });
        core.registry.add(core.clone())?;

        let watched = Arc::downgrade(&core);
        let token = core.token.clone();
        handle.spawn(async move {
            token.cancelled().await;
            if let Some(core) = watched.upgrade() {
                core.stop();
            }
        });

        debug!("Actor system {} started.", core.name);
        Ok(SystemRef { core })
    }
}

/// Options for [`ActorSystem::start`].
#[derive(Clone)]
pub struct SystemConfig {
    name: String,
    registry: Registry,
    persistence: Option<Arc<dyn PersistenceEngine>>,
    token: CancellationToken,
}

impl SystemConfig {
    /// Configuration for a system named `name`, registered in the process-wide registry.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Registers the system in `registry` instead of the process-wide one.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Engine used by the persistent actors of the system.
    pub fn persistence<E: PersistenceEngine>(mut self, engine: E) -> Self {
        self.persistence = Some(Arc::new(engine));
        self
    }

    /// Stops the system when `token` is cancelled.
    pub fn token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "system".to_owned(),
            registry: Registry::global(),
            persistence: None,
            token: CancellationToken::new(),
        }
    }
}

/// Root of an actor tree.
pub(crate) struct SystemCore {
    name: String,
    path: ActorPath,
    reference: Reference,
    registry: Registry,
    children: Children,
    temporaries: Mutex<HashMap<u64, Arc<dyn Pending>>>,
    next_temporary: AtomicU64,
    helpers: RwLock<HashMap<String, Box<dyn Any + Send + Sync + 'static>>>,
    persistence: Option<Arc<dyn PersistenceEngine>>,
    stopped: AtomicBool,
    token: CancellationToken,
}

impl SystemCore {
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn persistence(&self) -> Option<Arc<dyn PersistenceEngine>> {
        self.persistence.clone()
    }

    /// Registers a pending reply. The entry lives as long as the returned guard.
    pub(crate) fn register_temporary(
        self: &Arc<Self>,
        pending: Arc<dyn Pending>,
    ) -> Temporary {
        let id = self.next_temporary.fetch_add(1, Ordering::Relaxed);
        self.lock_temporaries().insert(id, pending);
        Temporary {
            system: Arc::downgrade(self),
            id,
        }
    }

    pub(crate) fn temporary(
        &self,
        id: u64,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        self.lock_temporaries()
            .get(&id)
            .cloned()
            .map(|pending| pending.into_any())
    }

    pub(crate) fn temporaries(&self) -> usize {
        self.lock_temporaries().len()
    }

    fn lock_temporaries(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<dyn Pending>>> {
        self.temporaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A registered temporary reference, removed from its table on drop.
pub(crate) struct Temporary {
    system: Weak<SystemCore>,
    id: u64,
}

impl Temporary {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Temporary {
    fn drop(&mut self) {
        if let Some(system) = self.system.upgrade() {
            system.lock_temporaries().remove(&self.id);
        }
    }
}

impl Node for SystemCore {
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
        None
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
        debug!("Stopping actor system {}...", self.name);
        self.registry.remove(&self.name, self);
        for child in self.children.close() {
            child.stop();
        }
        let pending: Vec<Arc<dyn Pending>> =
            self.lock_temporaries().drain().map(|(_, p)| p).collect();
        for pending in pending {
            pending.cancel(Error::ActorStopped(self.path.clone()));
        }
        self.token.cancel();
        debug!("Actor system {} stopped.", self.name);
    }

    fn reset(&self) {
        debug!("Reset of actor system {} ignored.", self.name);
    }

    /// Root absorber: the escalating top-level actor is stopped.
    fn handle_child_fault(&self, fault: Fault) {
        let child = fault
            .child()
            .and_then(|child| child.path())
            .filter(|path| path.is_child_of(&self.path))
            .and_then(|path| self.children.get(&path.key()));
        match child {
            Some(child) => {
                error!(
                    "{}: top-level actor {} escalated {}. Stopping it.",
                    self.path,
                    child.path(),
                    fault
                );
                child.stop();
            }
            None => debug!(
                "{}: escalated fault from a stopped actor ignored: {}",
                self.path, fault
            ),
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// System reference.
///
#[derive(Clone)]
pub struct SystemRef {
    core: Arc<SystemCore>,
}

impl SystemRef {
    pub(crate) fn from_core(core: Arc<SystemCore>) -> Self {
        Self { core }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The root path of the system, with no segments.
    pub fn path(&self) -> &ActorPath {
        &self.core.path
    }

    pub fn reference(&self) -> Reference {
        self.core.reference.clone()
    }

    pub fn registry(&self) -> &Registry {
        &self.core.registry
    }

    pub fn is_stopped(&self) -> bool {
        self.core.is_stopped()
    }

    /// Stops every top-level actor, rejects pending queries and removes the system from
    /// its registry. Idempotent.
    pub fn stop(&self) {
        self.core.stop();
    }

    /// Resolves once the system has been asked to stop.
    pub async fn stopped(&self) {
        self.core.token.cancelled().await
    }

    /// References to the top-level actors, by name.
    pub fn children(&self) -> BTreeMap<String, Reference> {
        self.core.children.references()
    }

    /// Number of queries waiting for a reply.
    pub fn pending_queries(&self) -> usize {
        self.core.temporaries()
    }

    /// Add a helper to the actor system.
    pub async fn add_helper<H>(&self, name: &str, helper: H)
    where
        H: Any + Send + Sync + Clone + 'static,
    {
        let mut helpers = self.core.helpers.write().await;
        helpers.insert(name.to_owned(), Box::new(helper));
    }

    /// Get a helper from the actor system.
    /// If the helper does not exist, a None is returned.
    pub async fn get_helper<H>(&self, name: &str) -> Option<H>
    where
        H: Any + Send + Sync + Clone + 'static,
    {
        let helpers = self.core.helpers.read().await;
        helpers
            .get(name)
            .and_then(|any| any.downcast_ref::<H>())
            .cloned()
    }
}

impl From<&SystemRef> for Reference {
    fn from(system: &SystemRef) -> Self {
        system.reference()
    }
}

impl From<SystemRef> for Reference {
    fn from(system: SystemRef) -> Self {
        system.reference()
    }
}

impl std::fmt::Debug for SystemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SystemRef({})", self.core.path)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use tracing_test::traced_test;

    fn config(name: &str) -> SystemConfig {
        SystemConfig::new(name).registry(Registry::new())
    }

    #[tokio::test]
    #[traced_test]
    async fn test_stop_actor_system() {
        let token = CancellationToken::new();
        let system = ActorSystem::start(config("stop-me").token(token.clone()))
            .unwrap();
        let registry = system.registry().clone();
        assert!(registry.contains("stop-me"));

        token.cancel();
        for _ in 0..100 {
            if system.is_stopped() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert!(system.is_stopped());
        assert!(!registry.contains("stop-me"));
        assert!(logs_contain("Stopping actor system stop-me..."));
        assert!(logs_contain("Actor system stop-me stopped."));
    }

    #[tokio::test]
    async fn test_stop_does_not_cancel_callers_token() {
        let token = CancellationToken::new();
        let system =
            ActorSystem::start(config("own-token").token(token.clone()))
                .unwrap();
        system.stop();
        system.stop();
        assert!(system.is_stopped());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_invalid_system_name() {
        assert_eq!(
            ActorSystem::start(config("bad name")).unwrap_err(),
            Error::InvalidName("bad name".to_owned())
        );
    }

    #[test]
    fn test_start_requires_runtime() {
        assert!(matches!(
            ActorSystem::start(config("no-runtime")),
            Err(Error::Start(_))
        ));
    }

    #[tokio::test]
    async fn test_helpers() {
        let system = ActorSystem::start(config("helpers")).unwrap();
        let helper = TestHelper { value: 42 };
        system.add_helper("test", helper).await;
        let helper: Option<TestHelper> = system.get_helper("test").await;
        assert_eq!(helper, Some(TestHelper { value: 42 }));
        let missing: Option<TestHelper> = system.get_helper("missing").await;
        assert_eq!(missing, None);
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct TestHelper {
        pub value: i32,
    }
}
