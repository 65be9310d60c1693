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

//! Process-local backend. Writes are atomic and linearizable but nothing survives the process.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::backend::{visit_snapshot, Backend, ScanError};

type Bucket = BTreeMap<Vec<u8>, Vec<u8>>;

/// Errors of the in-memory backend.
#[derive(Error, Debug)]
pub enum Error {
    /// A writer panicked while holding the lock.
    #[error("Memory backend lock poisoned")]
    Poisoned,
}

/// In-memory backend, buckets are scanned in key order.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    buckets: RwLock<HashMap<String, Bucket>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Bucket>>, Error> {
        self.buckets.read().map_err(|_| Error::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Bucket>>, Error> {
        self.buckets.write().map_err(|_| Error::Poisoned)
    }
}

impl Backend for MemoryBackend {
    type Error = Error;

    fn put(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.write()?
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<(), Error> {
        if let Some(b) = self.write()?.get_mut(bucket) {
            b.remove(key);
        }
        Ok(())
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.read()?.get(bucket).and_then(|b| b.get(key).cloned()))
    }

    fn for_each<F, E>(&self, bucket: &str, visit: F) -> Result<(), ScanError<Error, E>>
    where
        F: FnMut(&[u8], &[u8]) -> Result<(), E>,
    {
        // Clone the bucket so the lock is released before visiting.
        let snapshot = self
            .read()
            .map_err(ScanError::Backend)?
            .get(bucket)
            .cloned()
            .unwrap_or_default();
        visit_snapshot(snapshot, visit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_bucket_is_empty() {
        let db = MemoryBackend::new();
        assert_eq!(db.get("none", b"key").unwrap(), None);
        db.delete("none", b"key").unwrap();
        let mut count = 0;
        db.for_each::<_, ()>("none", |_, _| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn put_overwrites_and_buckets_are_isolated() {
        let db = MemoryBackend::new();
        db.put("a", b"key", b"one").unwrap();
        db.put("a", b"key", b"two").unwrap();
        db.put("b", b"key", b"three").unwrap();
        assert_eq!(db.get("a", b"key").unwrap(), Some(b"two".to_vec()));
        assert_eq!(db.get("b", b"key").unwrap(), Some(b"three".to_vec()));
        db.delete("a", b"key").unwrap();
        assert_eq!(db.get("a", b"key").unwrap(), None);
        assert_eq!(db.get("b", b"key").unwrap(), Some(b"three".to_vec()));
    }

    #[test]
    fn scan_is_ordered_and_short_circuits() {
        let db = MemoryBackend::new();
        for key in [b"c", b"a", b"b"] {
            db.put("bucket", key, key).unwrap();
        }
        let mut seen = vec![];
        let res = db.for_each("bucket", |key, _| {
            seen.push(key.to_vec());
            if key == b"b" {
                return Err("stop");
            }
            Ok(())
        });
        assert!(matches!(res, Err(ScanError::Visit("stop"))));
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn visitor_can_write_during_scan() {
        let db = MemoryBackend::new();
        db.put("bucket", b"a", b"1").unwrap();
        db.put("bucket", b"b", b"2").unwrap();
        let mut seen = 0;
        db.for_each::<_, Error>("bucket", |key, _| {
            seen += 1;
            db.delete("bucket", key)?;
            db.put("bucket", b"z", b"3")
        })
        .unwrap();
        // the snapshot does not see writes made during the scan
        assert_eq!(seen, 2);
        assert_eq!(db.get("bucket", b"a").unwrap(), None);
        assert_eq!(db.get("bucket", b"z").unwrap(), Some(b"3".to_vec()));
    }
}
