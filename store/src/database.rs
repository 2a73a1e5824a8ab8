// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Storage backends
//!
//! The [`Store`](crate::store::Store) engine writes journals and snapshots into ordered
//! key/value collections. A backend provides two things:
//!
//! - a [`DbManager`], the factory that opens collections and owns shared resources such
//!   as a connection;
//! - a [`Collection`], a byte map ordered by key and namespaced by a prefix.
//!
//! Keys are compared as strings. The engine writes sequence numbers zero-padded to twenty
//! digits so that key order and numeric order agree.
//!
//! Backends are checked with the [`test_store_trait!`](crate::test_store_trait) macro:
//!
//! ```ignore
//! #[cfg(test)]
//! mod tests {
//!     use super::*;
//!     use store::{database::{Collection, DbManager}, test_store_trait};
//!
//!     test_store_trait! {
//!         unit_test_my_manager: MyManager: MyCollection
//!     }
//! }
//! ```
//!

use crate::error::Error;

use tracing::debug;

/// Opens collections on a storage backend.
///
/// Managers are cloned freely and shared between engines; two collections opened with the
/// same `name` and `prefix` see the same data.
pub trait DbManager<C>: Sync + Send + Clone + 'static
where
    C: Collection + 'static,
{
    /// Opens (creating it if needed) the collection `name`, restricted to the rows under
    /// `prefix`.
    ///
    /// # Error
    ///
    /// `Error::CreateStore` if the backend cannot prepare the collection.
    ///
    fn create_collection(&self, name: &str, prefix: &str) -> Result<C, Error>;

    /// Releases the backend.
    fn stop(self) -> Result<(), Error> {
        Ok(())
    }
}

/// Ordered key/value storage.
pub trait Collection: Sync + Send + 'static {
    /// Name of the collection.
    fn name(&self) -> &str;

    /// Value stored under `key`.
    ///
    /// # Error
    ///
    /// `Error::EntryNotFound` when there is no such key.
    ///
    fn get(&self, key: &str) -> Result<Vec<u8>, Error>;

    /// Stores `data` under `key`, replacing any previous value.
    fn put(&mut self, key: &str, data: &[u8]) -> Result<(), Error>;

    /// Removes `key`.
    ///
    /// # Error
    ///
    /// `Error::EntryNotFound` when there is no such key.
    ///
    fn del(&mut self, key: &str) -> Result<(), Error>;

    /// Entry with the greatest key.
    fn last(&self) -> Result<Option<(String, Vec<u8>)>, Error> {
        let value = self.iter(true)?.next();
        debug!(
            "Last key of {}: {:?}",
            self.name(),
            value.as_ref().map(|(key, _)| key)
        );
        Ok(value)
    }

    /// Removes every entry.
    fn purge(&mut self) -> Result<(), Error>;

    /// Entries in key order, or reverse key order.
    ///
    /// # Error
    ///
    /// `Error::Get` if the backend cannot be read.
    ///
    fn iter<'a>(
        &'a self,
        reverse: bool,
    ) -> Result<Box<dyn Iterator<Item = (String, Vec<u8>)> + 'a>, Error>;

    /// Makes pending writes durable.
    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Up to `quantity` entries in key order whose keys are greater than `from`, or from
    /// the start when `from` is `None`. `from` need not be a key of the collection.
    ///
    /// Backends with ordered indexes should override this so that a page does not scan
    /// the whole collection.
    fn get_by_range(
        &self,
        from: Option<&str>,
        quantity: usize,
    ) -> Result<Vec<(String, Vec<u8>)>, Error> {
        Ok(self
            .iter(false)?
            .filter(|(key, _)| from.map_or(true, |from| key.as_str() > from))
            .take(quantity)
            .collect())
    }
}

/// Generates the shared behavior tests for a [`DbManager`] and its [`Collection`]. The
/// manager type must implement `Default`.
#[macro_export]
macro_rules! test_store_trait {
    ($name:ident: $type:ty: $type2:ty) => {
        #[cfg(test)]
        mod $name {
            use super::*;
            use $crate::error::Error;

            fn filled(manager: &$type) -> $type2 {
                let mut store: $type2 =
                    manager.create_collection("test", "test").unwrap();
                Collection::put(&mut store, "key1", b"value1").unwrap();
                Collection::put(&mut store, "key2", b"value2").unwrap();
                Collection::put(&mut store, "key3", b"value3").unwrap();
                store
            }

            #[test]
            fn test_create_collection() {
                let manager = <$type>::default();
                let store: $type2 =
                    manager.create_collection("test", "test").unwrap();
                assert_eq!(Collection::name(&store), "test");
                assert!(manager.stop().is_ok())
            }

            #[test]
            fn test_put_get_collection() {
                let manager = <$type>::default();
                let mut store: $type2 =
                    manager.create_collection("test", "test").unwrap();
                Collection::put(&mut store, "key", b"value").unwrap();
                assert_eq!(Collection::get(&store, "key").unwrap(), b"value");
                Collection::put(&mut store, "key", b"other").unwrap();
                assert_eq!(Collection::get(&store, "key").unwrap(), b"other");
                assert!(manager.stop().is_ok())
            }

            #[test]
            fn test_del_collection() {
                let manager = <$type>::default();
                let mut store: $type2 =
                    manager.create_collection("test", "test").unwrap();
                Collection::put(&mut store, "key", b"value").unwrap();
                Collection::del(&mut store, "key").unwrap();
                assert!(matches!(
                    Collection::get(&store, "key"),
                    Err(Error::EntryNotFound(_))
                ));
                assert!(manager.stop().is_ok())
            }

            #[test]
            fn test_prefixes_are_isolated() {
                let manager = <$type>::default();
                let mut first: $type2 =
                    manager.create_collection("test", "first").unwrap();
                let second: $type2 =
                    manager.create_collection("test", "second").unwrap();
                Collection::put(&mut first, "key", b"value").unwrap();
                assert!(Collection::get(&second, "key").is_err());
                assert_eq!(second.iter(false).unwrap().count(), 0);
                let reopened: $type2 =
                    manager.create_collection("test", "first").unwrap();
                assert_eq!(
                    Collection::get(&reopened, "key").unwrap(),
                    b"value"
                );
                assert!(manager.stop().is_ok())
            }

            #[test]
            fn test_iter() {
                let manager = <$type>::default();
                let store = filled(&manager);
                let keys: Vec<String> =
                    store.iter(false).unwrap().map(|(key, _)| key).collect();
                assert_eq!(keys, vec!["key1", "key2", "key3"]);
                let keys: Vec<String> =
                    store.iter(true).unwrap().map(|(key, _)| key).collect();
                assert_eq!(keys, vec!["key3", "key2", "key1"]);
                assert!(manager.stop().is_ok())
            }

            #[test]
            fn test_last() {
                let manager = <$type>::default();
                let store = filled(&manager);
                assert_eq!(
                    store.last().unwrap(),
                    Some(("key3".to_string(), b"value3".to_vec()))
                );
                assert!(manager.stop().is_ok())
            }

            #[test]
            fn test_get_by_range() {
                let manager = <$type>::default();
                let store = filled(&manager);
                let keys = |from: Option<&str>, quantity: usize| -> Vec<String> {
                    store
                        .get_by_range(from, quantity)
                        .unwrap()
                        .into_iter()
                        .map(|(key, _)| key)
                        .collect()
                };
                assert_eq!(keys(None, 2), vec!["key1", "key2"]);
                assert_eq!(keys(Some("key1"), 5), vec!["key2", "key3"]);
                assert_eq!(keys(Some("key15"), 5), vec!["key2", "key3"]);
                assert!(keys(Some("key3"), 5).is_empty());
                assert!(keys(None, 0).is_empty());
                assert_eq!(
                    store.get_by_range(Some("key2"), 1).unwrap(),
                    vec![("key3".to_string(), b"value3".to_vec())]
                );
                assert!(manager.stop().is_ok())
            }

            #[test]
            fn test_purge_collection() {
                let manager = <$type>::default();
                let mut store = filled(&manager);
                Collection::purge(&mut store).unwrap();
                assert!(matches!(
                    Collection::get(&store, "key1"),
                    Err(Error::EntryNotFound(_))
                ));
                assert_eq!(store.last().unwrap(), None);
                assert!(manager.stop().is_ok())
            }
        }
    };
}
