// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Supervised, event-sourced actors.
//!
//! Re-exports the actor runtime and, behind the `store` and `sqlite` features, the
//! persistence engines that back persistent actors.

pub use actor::{
    dispatch, is_valid_name, query, spawn, spawn_persistent, spawn_stateless,
    start, stop, Actor, ActorConfig, ActorContext, ActorPath, ActorRef,
    ActorSystem, BincodeCodec, Codec, Directive, Error as ActorError, Fault,
    FaultOrigin, InitContext, Message, PersistedEvent, PersistedSnapshot,
    PersistenceEngine, PersistentActor, PersistentConfig, PersistentContext,
    Reference, Registry, StopContext, SupervisionContext, SupervisionPolicy,
    SystemConfig, SystemRef,
};

#[cfg(feature = "store")]
pub use store::{
    database::{Collection, DbManager},
    memory::{MemoryCollection, MemoryManager},
    store::Store,
    Error as StoreError,
};

#[cfg(feature = "sqlite")]
pub use sqlite_db::{SqliteCollection, SqliteManager};
