// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Store
//!
//! Persistence engines for persistent actors. [`store::Store`] implements
//! `actor::PersistenceEngine` over the ordered key/value collections of any
//! [`database::DbManager`]; [`memory::MemoryManager`] is the in-memory backend.
//!

pub mod database;
pub mod error;
pub mod memory;
pub mod store;

pub use error::Error;
