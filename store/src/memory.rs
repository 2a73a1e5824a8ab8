// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! In-memory backend. Data lives as long as the manager (or one of its clones).
//!

use crate::{
    database::{Collection, DbManager},
    error::Error,
};

use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::{Arc, RwLock},
};

type Table = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

/// Manager of in-memory collections, keyed by name and prefix.
#[derive(Default, Clone)]
pub struct MemoryManager {
    tables: Arc<RwLock<HashMap<(String, String), Table>>>,
}

impl DbManager<MemoryCollection> for MemoryManager {
    fn create_collection(
        &self,
        name: &str,
        prefix: &str,
    ) -> Result<MemoryCollection, Error> {
        let mut tables = self.tables.write().map_err(|e| {
            Error::CreateStore(format!("Can not lock manager data: {}", e))
        })?;
        let data = tables
            .entry((name.to_owned(), prefix.to_owned()))
            .or_default()
            .clone();
        Ok(MemoryCollection {
            name: name.to_owned(),
            data,
        })
    }
}

/// A collection held in a `BTreeMap`.
#[derive(Default, Clone)]
pub struct MemoryCollection {
    name: String,
    data: Table,
}

impl MemoryCollection {
    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>, Error>
    {
        self.data
            .read()
            .map_err(|e| Error::Get(format!("Can not lock data: {}", e)))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>>, Error>
    {
        self.data
            .write()
            .map_err(|e| Error::Store(format!("Can not lock data: {}", e)))
    }
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        self.read()?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::EntryNotFound(key.to_owned()))
    }

    fn put(&mut self, key: &str, data: &[u8]) -> Result<(), Error> {
        self.write()?.insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    fn del(&mut self, key: &str) -> Result<(), Error> {
        self.write()?
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::EntryNotFound(key.to_owned()))
    }

    fn purge(&mut self) -> Result<(), Error> {
        self.write()?.clear();
        Ok(())
    }

    fn iter<'a>(
        &'a self,
        reverse: bool,
    ) -> Result<Box<dyn Iterator<Item = (String, Vec<u8>)> + 'a>, Error> {
        // Entries are copied out so that no lock is held while iterating.
        let entries: Vec<(String, Vec<u8>)> = self
            .read()?
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if reverse {
            Ok(Box::new(entries.into_iter().rev()))
        } else {
            Ok(Box::new(entries.into_iter()))
        }
    }

    fn get_by_range(
        &self,
        from: Option<&str>,
        quantity: usize,
    ) -> Result<Vec<(String, Vec<u8>)>, Error> {
        let data = self.read()?;
        let start = match from {
            Some(from) => Bound::Excluded(from.to_owned()),
            None => Bound::Unbounded,
        };
        Ok(data
            .range((start, Bound::Unbounded))
            .take(quantity)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_store_trait;

    test_store_trait! {
        unit_test_memory_manager: MemoryManager: MemoryCollection
    }
}
