// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Registry
//!
//! The `registry` module maps system names to live systems, so that a [`Reference`] can be
//! resolved back into the actor it names without handing out pointers to actor internals.
//!

use crate::{
    cell::Node,
    reference::{Reference, Target},
    system::SystemCore,
    Error,
};

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

/// Name to system table.
///
/// Every system registers itself under its name when started and removes itself when
/// stopped. A process normally uses [`Registry::global`]; tests can inject their own
/// registry through `SystemConfig` to keep systems apart.
#[derive(Clone, Default)]
pub struct Registry {
    systems: Arc<RwLock<HashMap<String, Arc<SystemCore>>>>,
}

/// What a reference resolved to.
pub(crate) enum Resolved {
    Node(Arc<dyn Node>),
    Temporary(Arc<dyn Any + Send + Sync>),
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new).clone()
    }

    /// Names of the registered systems, sorted.
    pub fn systems(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .systems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// True if a system named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.systems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub(crate) fn add(&self, system: Arc<SystemCore>) -> Result<(), Error> {
        let mut systems =
            self.systems.write().unwrap_or_else(PoisonError::into_inner);
        if systems.contains_key(system.name()) {
            return Err(Error::DuplicateName {
                name: system.name().to_owned(),
                parent: "registry".to_owned(),
            });
        }
        systems.insert(system.name().to_owned(), system);
        Ok(())
    }

    /// Removes the entry `name` if it still points at `system`.
    pub(crate) fn remove(&self, name: &str, system: &SystemCore) {
        let mut systems =
            self.systems.write().unwrap_or_else(PoisonError::into_inner);
        let same = systems
            .get(name)
            .is_some_and(|current| std::ptr::eq(current.as_ref(), system));
        if same {
            systems.remove(name);
        }
    }

    pub(crate) fn system(&self, name: &str) -> Option<Arc<SystemCore>> {
        self.systems
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Resolves a reference.
    ///
    /// Actor paths are walked child table by child table from the system root; a path with
    /// no segments resolves to the system itself. Returns `None` as soon as a segment is
    /// missing.
    pub(crate) fn find(&self, reference: &Reference) -> Option<Resolved> {
        match reference.target() {
            Target::Nobody => None,
            Target::Temporary { system, id } => self
                .system(system)?
                .temporary(*id)
                .map(Resolved::Temporary),
            Target::System(path) => {
                let system: Arc<dyn Node> = self.system(path.system())?;
                Some(Resolved::Node(system))
            }
            Target::Actor(path) => {
                let mut node: Arc<dyn Node> = self.system(path.system())?;
                for segment in path.segments() {
                    node = node.children().get(segment)?;
                }
                Some(Resolved::Node(node))
            }
        }
    }

    /// Resolves `reference` and applies `f` to the result.
    ///
    /// # Error
    ///
    /// Returns `Error::ActorNotFound` if the reference does not resolve.
    ///
    pub(crate) fn apply_or_throw_if_stopped<T>(
        &self,
        reference: &Reference,
        f: impl FnOnce(Resolved) -> Result<T, Error>,
    ) -> Result<T, Error> {
        match self.find(reference) {
            Some(resolved) => f(resolved),
            None => Err(Error::ActorNotFound(reference.to_string())),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("systems", &self.systems())
            .finish()
    }
}
