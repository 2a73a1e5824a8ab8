// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # SQLite database module.
//!
//! A durable [`store::database::Collection`] backend, so that the `Store` engine keeps
//! journals and snapshots across process restarts.
//!

mod sqlite;

pub use sqlite::{SqliteCollection, SqliteManager};
