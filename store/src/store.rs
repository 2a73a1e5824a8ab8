// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Store engine
//!
//! [`Store`] implements `actor::PersistenceEngine` over any [`DbManager`]. Each persistence
//! key gets two collections, `<name>_events` and `<name>_snapshots`, both prefixed by the
//! key. Records are stored with bincode under their sequence number, zero-padded so that
//! the collection order is the journal order.
//!
//! Journals are read in pages of [`PAGE_SIZE`] records, so a replay never holds more than
//! one page in memory. A sequence number is written once; appending over an existing one
//! fails.
//!
//! When the store is created with a password, every record is sealed with
//! ChaCha20-Poly1305 before it reaches the backend. The password itself is kept encrypted
//! in memory and only decrypted for the duration of one operation.
//!

use crate::{
    database::{Collection, DbManager},
    error::Error,
};

use actor::{
    Error as ActorError, PersistedEvent, PersistedSnapshot, PersistenceEngine,
};

use async_trait::async_trait;

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};
use futures::stream::{self, BoxStream, StreamExt};
use memsecurity::EncryptedMem;

use serde::{de::DeserializeOwned, Serialize};

use tracing::{debug, error};

use std::{
    collections::{HashMap, VecDeque},
    marker::PhantomData,
    sync::{Arc, Mutex, PoisonError},
};

/// Nonce size.
const NONCE_SIZE: usize = 12;

/// Records fetched from the backend per journal read.
pub const PAGE_SIZE: usize = 64;

/// Collection key of a sequence number.
fn sequence_key(sequence_nr: u64) -> String {
    format!("{:020}", sequence_nr)
}

/// Persistence engine backed by a [`DbManager`].
///
/// ```ignore
/// let engine = Store::new("journal", MemoryManager::default(), None)?;
/// let system = start(SystemConfig::new("shop").persistence(engine))?;
/// ```
pub struct Store<M, C>
where
    M: DbManager<C>,
    C: Collection,
{
    name: String,
    manager: M,
    events: Mutex<HashMap<String, C>>,
    snapshots: Mutex<HashMap<String, C>>,
    seal: Seal,
    _collection: PhantomData<fn() -> C>,
}

impl<M, C> Store<M, C>
where
    M: DbManager<C>,
    C: Collection,
{
    /// Creates a store named `name` over `manager`, sealing records with `password` when
    /// one is given.
    ///
    /// # Error
    ///
    /// `Error::Store` if the password cannot be protected in memory.
    ///
    pub fn new(
        name: &str,
        manager: M,
        password: Option<[u8; 32]>,
    ) -> Result<Self, Error> {
        let key_box = match password {
            Some(key) => {
                let mut key_box = EncryptedMem::new();
                key_box.encrypt(&key).map_err(|_| {
                    Error::Store("Can't encrypt password.".to_owned())
                })?;
                Some(Arc::new(key_box))
            }
            None => None,
        };
        debug!("Store {} created, encrypted: {}.", name, key_box.is_some());
        Ok(Self {
            name: name.to_owned(),
            manager,
            events: Mutex::new(HashMap::new()),
            snapshots: Mutex::new(HashMap::new()),
            seal: Seal { key_box },
            _collection: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_encrypted(&self) -> bool {
        self.seal.key_box.is_some()
    }

    fn collection_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.name, suffix)
    }

    /// Runs `f` on the collection of `key` in `table`, opening it on first use.
    fn with_collection<T>(
        &self,
        table: &Mutex<HashMap<String, C>>,
        suffix: &str,
        key: &str,
        f: impl FnOnce(&mut C) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
        let collection = match table.entry(key.to_owned()) {
            std::collections::hash_map::Entry::Occupied(entry) => {
                entry.into_mut()
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                let collection = self
                    .manager
                    .create_collection(&self.collection_name(suffix), key)?;
                entry.insert(collection)
            }
        };
        f(collection)
    }

    /// Appends an event; an existing record under the same sequence number is never
    /// replaced.
    fn append(&self, event: &PersistedEvent) -> Result<(), Error> {
        let bytes = self.seal.seal(event)?;
        let sequence = sequence_key(event.sequence_nr());
        self.with_collection(&self.events, "events", event.key(), |collection| {
            match collection.get(&sequence) {
                Ok(_) => {
                    return Err(Error::Store(format!(
                        "event {} of '{}' is already journaled",
                        event.sequence_nr(),
                        event.key()
                    )))
                }
                Err(Error::EntryNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            collection.put(&sequence, &bytes)?;
            collection.flush()
        })
    }

    /// Removes the journal and snapshots of `key`.
    pub fn purge(&self, key: &str) -> Result<(), Error> {
        self.with_collection(&self.events, "events", key, |c| c.purge())?;
        self.with_collection(&self.snapshots, "snapshots", key, |c| c.purge())
    }
}

/// Serialization and optional encryption of records.
#[derive(Clone)]
struct Seal {
    /// Key box that encrypts contents.
    key_box: Option<Arc<EncryptedMem>>,
}

impl Seal {
    /// Serializes `record` and encrypts it if the store has a key.
    fn seal<T: Serialize>(&self, record: &T) -> Result<Vec<u8>, Error> {
        let bytes = bincode::serialize(record).map_err(|e| {
            error!("Can't serialize record: {}", e);
            Error::Store(format!("Can't serialize record: {}", e))
        })?;
        match &self.key_box {
            Some(key_box) => {
                let key = key_box.decrypt().map_err(|_| {
                    Error::Store("Can't decrypt key".to_owned())
                })?;
                Self::encrypt(key.as_ref(), &bytes)
            }
            None => Ok(bytes),
        }
    }

    /// Decrypts `bytes` if the store has a key and deserializes the record.
    fn open<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, Error> {
        let bytes = match &self.key_box {
            Some(key_box) => {
                let key = key_box.decrypt().map_err(|_| {
                    Error::Store("Can't decrypt key".to_owned())
                })?;
                Self::decrypt(key.as_ref(), bytes)?
            }
            None => bytes.to_vec(),
        };
        bincode::deserialize(&bytes).map_err(|e| {
            error!("Can't deserialize record: {}", e);
            Error::Store(format!("Can't deserialize record: {}", e))
        })
    }

    /// Encrypt bytes.
    fn encrypt(key: &[u8], bytes: &[u8]) -> Result<Vec<u8>, Error> {
        let cipher = ChaCha20Poly1305::new(key.into());
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext: Vec<u8> = cipher
            .encrypt(&nonce, bytes)
            .map_err(|e| Error::Store(format!("Encrypt error: {}", e)))?;

        Ok([nonce.to_vec(), ciphertext].concat())
    }

    /// Decrypt bytes.
    fn decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(Error::Store("Ciphertext too short".to_owned()));
        }
        let cipher = ChaCha20Poly1305::new(key.into());
        let (nonce, ciphertext) = ciphertext.split_at(NONCE_SIZE);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| Error::Store(format!("Decrypt error: {}", e)))
    }
}

/// Reads a journal one page at a time.
///
/// The stream ends after the first error, whether the page could not be read or a record
/// could not be opened.
struct Cursor<C: Collection> {
    collection: C,
    seal: Seal,
    after: String,
    tags: Option<Vec<String>>,
    remaining: Option<u64>,
    page: VecDeque<(String, Vec<u8>)>,
    done: bool,
}

impl<C: Collection> Cursor<C> {
    fn next_event(&mut self) -> Option<Result<PersistedEvent, ActorError>> {
        loop {
            if self.done || self.remaining == Some(0) {
                return None;
            }
            let Some((key, bytes)) = self.page.pop_front() else {
                let after = Some(self.after.as_str());
                match self.collection.get_by_range(after, PAGE_SIZE) {
                    Ok(page) if page.is_empty() => self.done = true,
                    Ok(page) => self.page = page.into(),
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e.into()));
                    }
                }
                continue;
            };
            self.after = key;
            match self.seal.open::<PersistedEvent>(&bytes) {
                Ok(event) => {
                    if self
                        .tags
                        .as_ref()
                        .map_or(true, |tags| event.has_tags(tags))
                    {
                        self.remaining = self.remaining.map(|n| n - 1);
                        return Some(Ok(event));
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

#[async_trait]
impl<M, C> PersistenceEngine for Store<M, C>
where
    M: DbManager<C>,
    C: Collection,
{
    async fn events(
        &self,
        key: &str,
        offset: u64,
        limit: Option<u64>,
        tags: Option<&[String]>,
    ) -> Result<BoxStream<'static, Result<PersistedEvent, ActorError>>, ActorError>
    {
        let collection = self
            .manager
            .create_collection(&self.collection_name("events"), key)?;
        debug!(
            "Store {}: reading events of {} after {}.",
            self.name, key, offset
        );
        let cursor = Cursor {
            collection,
            seal: self.seal.clone(),
            after: sequence_key(offset),
            tags: tags.map(<[String]>::to_vec),
            remaining: limit,
            page: VecDeque::new(),
            done: false,
        };
        Ok(stream::unfold(cursor, |mut cursor| async move {
            cursor.next_event().map(|event| (event, cursor))
        })
        .boxed())
    }

    async fn latest_snapshot(
        &self,
        key: &str,
    ) -> Result<Option<PersistedSnapshot>, ActorError> {
        let last = self.with_collection(
            &self.snapshots,
            "snapshots",
            key,
            |collection| collection.last(),
        )?;
        match last {
            Some((_, bytes)) => Ok(Some(self.seal.open(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn take_snapshot(
        &self,
        snapshot: PersistedSnapshot,
    ) -> Result<(), ActorError> {
        debug!(
            "Store {}: snapshot of {} at {}.",
            self.name,
            snapshot.key(),
            snapshot.sequence_nr()
        );
        let bytes = self.seal.seal(&snapshot)?;
        self.with_collection(
            &self.snapshots,
            "snapshots",
            snapshot.key(),
            |collection| {
                collection.put(&sequence_key(snapshot.sequence_nr()), &bytes)?;
                collection.flush()
            },
        )?;
        Ok(())
    }

    async fn persist(&self, event: PersistedEvent) -> Result<(), ActorError> {
        self.append(&event)?;
        Ok(())
    }
}
