// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Store errors
//!
//! Errors raised by storage backends and by the [`Store`](crate::store::Store) engine. At
//! the engine boundary they become `actor::Error::Persistence`, which is what persistent
//! actors see.
//!

use actor::Error as ActorError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the store crate.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq)]
pub enum Error {
    /// A backend could not be created or opened.
    #[error("Can't create store: {0}")]
    CreateStore(String),
    /// A read failed for a reason other than a missing entry.
    #[error("Get error: {0}")]
    Get(String),
    /// The requested entry does not exist.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),
    /// A write, a delete or a payload transformation failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl From<Error> for ActorError {
    fn from(error: Error) -> Self {
        ActorError::Persistence(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_actor_error() {
        let error: ActorError = Error::Store("disk full".to_owned()).into();
        assert_eq!(
            error,
            ActorError::Persistence("Store error: disk full".to_owned())
        );
    }

    #[test]
    fn test_entry_not_found_display() {
        let error = Error::EntryNotFound("00000000000000000007".to_owned());
        assert_eq!(
            error.to_string(),
            "Entry not found: 00000000000000000007"
        );
    }
}
