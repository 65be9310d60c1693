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

//! Transactional key-value backends the retribution store is built on.
//!
//! A backend groups values in named buckets. Every write is atomic: after a crash the bucket
//! contains either the previous value or the new one, never a partial write. Scans visit a
//! consistent snapshot of a bucket and stop at the first visitor error.

use std::error;

use thiserror::Error;

pub mod memory;
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite;

pub use memory::MemoryBackend;
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub use sqlite::SqliteBackend;

/// Failure of a bucket scan, either from the backend itself or from the visitor.
#[derive(Error, Debug)]
pub enum ScanError<B, V> {
    /// The backend failed to read the bucket.
    #[error("Backend error: {0}")]
    Backend(B),
    /// The visitor returned an error, the scan stopped.
    #[error("Visitor error")]
    Visit(V),
}

/// Capability contract of a transactional key-value store. Buckets are created on first write
/// and a missing bucket reads as empty.
pub trait Backend {
    /// Error returned by the storage layer, e.g. on I/O failures or lock contention.
    type Error: error::Error + Send + Sync + 'static;

    /// Atomically insert or overwrite the value stored under `key`.
    fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), Self::Error>;

    /// Atomically delete the value stored under `key`, succeed if there is none.
    fn delete(&self, bucket: &str, key: &[u8]) -> Result<(), Self::Error>;

    /// Return the value stored under `key`, if any.
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Visit every key-value pair of a point-in-time snapshot of the bucket. The snapshot is taken
    /// before the first visit, the visitor may thus write to the backend. The scan stops at the
    /// first visitor error and returns it in [`ScanError::Visit`].
    fn for_each<F, E>(&self, bucket: &str, visit: F) -> Result<(), ScanError<Self::Error, E>>
    where
        F: FnMut(&[u8], &[u8]) -> Result<(), E>;
}

/// Visit an already collected snapshot, short-circuiting on the first visitor error.
pub(crate) fn visit_snapshot<I, F, B, E>(snapshot: I, mut visit: F) -> Result<(), ScanError<B, E>>
where
    I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    F: FnMut(&[u8], &[u8]) -> Result<(), E>,
{
    for (key, value) in snapshot {
        visit(&key, &value).map_err(ScanError::Visit)?;
    }
    Ok(())
}
