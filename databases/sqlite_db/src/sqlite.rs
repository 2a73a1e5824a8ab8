// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # SQLite database backend.
//!
//! Every collection name maps to a table with the schema
//! `(prefix TEXT, sn TEXT, value BLOB, PRIMARY KEY (prefix, sn))`; the prefix selects the
//! rows of one collection instance. All collections of a manager share one connection,
//! opened in WAL mode.
//!

use store::{
    database::{Collection, DbManager},
    Error,
};

use rusqlite::{
    params, Connection, OpenFlags, Params, Result as SQLiteResult,
};
use tracing::{debug, info};

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

/// SQLite database manager.
///
/// The database lives in `database.db` inside the directory given to
/// [`SqliteManager::new`].
#[derive(Clone)]
pub struct SqliteManager {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteManager {
    /// Opens (creating it if needed) the database under `path`.
    ///
    /// # Errors
    ///
    /// `Error::CreateStore` if the directory cannot be created or the database cannot be
    /// opened.
    ///
    pub fn new(path: &str) -> Result<Self, Error> {
        info!("Creating SQLite database manager");
        if !Path::new(&path).exists() {
            info!("Path does not exist, creating it");
            fs::create_dir_all(path).map_err(|e| {
                Error::CreateStore(format!(
                    "fail SQLite create directory: {}",
                    e
                ))
            })?;
        }

        let conn = open(format!("{}/database.db", path)).map_err(|e| {
            Error::CreateStore(format!("fail SQLite open connection: {}", e))
        })?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl DbManager<SqliteCollection> for SqliteManager {
    fn create_collection(
        &self,
        identifier: &str,
        prefix: &str,
    ) -> Result<SqliteCollection, Error> {
        // The table name is interpolated into every statement.
        if !is_identifier(identifier) {
            return Err(Error::CreateStore(format!(
                "invalid SQLite table name: '{}'",
                identifier
            )));
        }
        let stmt = format!(
            "CREATE TABLE IF NOT EXISTS {} (prefix TEXT NOT NULL, sn TEXT NOT NULL, value \
            BLOB NOT NULL, PRIMARY KEY (prefix, sn))",
            identifier
        );

        {
            let conn = lock(&self.conn)
                .map_err(|e| Error::CreateStore(e.to_string()))?;
            conn.execute(stmt.as_str(), ()).map_err(|e| {
                Error::CreateStore(format!("fail SQLite create table: {}", e))
            })?;
        }
        debug!("SQLite collection {}/{} ready.", identifier, prefix);

        Ok(SqliteCollection::new(self.conn.clone(), identifier, prefix))
    }
}

/// Rows of one table sharing a prefix.
pub struct SqliteCollection {
    conn: Arc<Mutex<Connection>>,
    table: String,
    prefix: String,
}

impl SqliteCollection {
    fn new(conn: Arc<Mutex<Connection>>, table: &str, prefix: &str) -> Self {
        Self {
            conn,
            table: table.to_owned(),
            prefix: prefix.to_owned(),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        lock(&self.conn)
    }

    /// Runs a `SELECT sn, value` query and collects its rows.
    fn rows<P: Params>(
        &self,
        query: &str,
        params: P,
    ) -> Result<Vec<(String, Vec<u8>)>, Error> {
        let conn = self.conn()?;
        let read = || -> SQLiteResult<Vec<(String, Vec<u8>)>> {
            let mut stmt = conn.prepare(query)?;
            let mut rows = stmt.query(params)?;
            let mut values = Vec::new();
            while let Some(row) = rows.next()? {
                values.push((row.get(0)?, row.get(1)?));
            }
            Ok(values)
        };
        read().map_err(|e| Error::Get(format!("sqlite query error: {}", e)))
    }
}

impl Collection for SqliteCollection {
    fn name(&self) -> &str {
        self.table.as_str()
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT value FROM {} WHERE prefix = ?1 AND sn = ?2",
            &self.table
        );
        conn.query_row(&query, params![self.prefix, key], |row| row.get(0))
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    Error::EntryNotFound(key.to_owned())
                }
                e => Error::Get(format!("sqlite query error: {}", e)),
            })
    }

    fn put(&mut self, key: &str, data: &[u8]) -> Result<(), Error> {
        let conn = self.conn()?;
        let stmt = format!(
            "INSERT OR REPLACE INTO {} (prefix, sn, value) VALUES (?1, ?2, ?3)",
            &self.table
        );
        conn.execute(&stmt, params![self.prefix, key, data])
            .map_err(|e| Error::Store(format!("sqlite insert error: {}", e)))?;
        Ok(())
    }

    fn del(&mut self, key: &str) -> Result<(), Error> {
        let conn = self.conn()?;
        let stmt = format!(
            "DELETE FROM {} WHERE prefix = ?1 AND sn = ?2",
            &self.table
        );
        let deleted = conn
            .execute(&stmt, params![self.prefix, key])
            .map_err(|e| Error::Store(format!("sqlite delete error: {}", e)))?;
        if deleted == 0 {
            return Err(Error::EntryNotFound(key.to_owned()));
        }
        Ok(())
    }

    fn purge(&mut self) -> Result<(), Error> {
        let conn = self.conn()?;
        let stmt = format!("DELETE FROM {} WHERE prefix = ?1", &self.table);
        conn.execute(&stmt, params![self.prefix])
            .map_err(|e| Error::Store(format!("sqlite purge error: {}", e)))?;
        Ok(())
    }

    fn iter<'a>(
        &'a self,
        reverse: bool,
    ) -> Result<Box<dyn Iterator<Item = (String, Vec<u8>)> + 'a>, Error> {
        let order = if reverse { "DESC" } else { "ASC" };
        let query = format!(
            "SELECT sn, value FROM {} WHERE prefix = ?1 ORDER BY sn {}",
            self.table, order,
        );
        let rows = self.rows(&query, params![self.prefix])?;
        Ok(Box::new(rows.into_iter()))
    }

    fn get_by_range(
        &self,
        from: Option<&str>,
        quantity: usize,
    ) -> Result<Vec<(String, Vec<u8>)>, Error> {
        let query = format!(
            "SELECT sn, value FROM {} WHERE prefix = ?1 AND (?2 IS NULL OR sn > ?2) \
            ORDER BY sn ASC LIMIT ?3",
            self.table,
        );
        let quantity = i64::try_from(quantity).unwrap_or(i64::MAX);
        self.rows(&query, params![self.prefix, from, quantity])
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, Error> {
    conn.lock()
        .map_err(|e| Error::Store(format!("sqlite open connection: {}", e)))
}

/// ASCII letters, digits and underscores, not starting with a digit.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Open a SQLite database connection.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection, Error> {
    let path = path.as_ref();
    let flags =
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let conn = Connection::open_with_flags(path, flags).map_err(|e| {
        Error::Store(format!("SQLite failed to open connection: {}", e))
    })?;

    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        ",
    )
    .map_err(|e| {
        Error::Store(format!("SQLite failed to execute batch: {}", e))
    })?;

    Ok(conn)
}
