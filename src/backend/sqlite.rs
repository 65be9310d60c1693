// Copyright 2021-2022 Farcaster Devs
//
// This library is free software; you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public
// License as published by the Free Software Foundation; either
// version 3 of the License, or (at your option) any later version.
//
// This library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this library; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301, USA

//! Durable backend on SQLite. Every write runs in its own transaction, making it crash-atomic,
//! and scans read all the rows of a bucket within a single transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::backend::{visit_snapshot, Backend, ScanError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS kv (
        bucket TEXT NOT NULL,
        key BLOB NOT NULL,
        value BLOB NOT NULL,
        PRIMARY KEY (bucket, key)
    ) WITHOUT ROWID;
";

/// Errors of the SQLite backend.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite reported an error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A thread panicked while holding the connection.
    #[error("SQLite connection lock poisoned")]
    Poisoned,
}

/// Backend storing all buckets in one SQLite table keyed by `(bucket, key)`.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open, or create, the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database, lost when the backend is dropped.
    pub fn open_in_memory() -> Result<Self, Error> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, Error> {
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn.lock().map_err(|_| Error::Poisoned)
    }

    fn snapshot(&self, bucket: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut rows: Vec<(Vec<u8>, Vec<u8>)> = vec![];
        {
            let mut stmt = tx.prepare("SELECT key, value FROM kv WHERE bucket = ?1 ORDER BY key")?;
            let mut query = stmt.query(params![bucket])?;
            while let Some(row) = query.next()? {
                rows.push((row.get(0)?, row.get(1)?));
            }
        }
        tx.commit()?;
        Ok(rows)
    }
}

impl Backend for SqliteBackend {
    type Error = Error;

    fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO kv (bucket, key, value) VALUES (?1, ?2, ?3)",
            params![bucket, key, value],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<(), Error> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM kv WHERE bucket = ?1 AND key = ?2",
            params![bucket, key],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE bucket = ?1 AND key = ?2",
                params![bucket, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn for_each<F, E>(&self, bucket: &str, visit: F) -> Result<(), ScanError<Error, E>>
    where
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
    {
        // The connection is released before visiting, the visitor may write.
        let snapshot = self.snapshot(bucket).map_err(ScanError::Backend)?;
        visit_snapshot(snapshot, visit)
    }
}
